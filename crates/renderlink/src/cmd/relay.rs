use std::time::Duration;

use renderlink_relay::{LinkOutcome, Relay, RelayConfig, RelayPair};
use tracing::info;

use crate::cmd::RelayArgs;
use crate::exit::{
    io_error, relay_error, CliError, CliResult, DATA_INVALID, SUCCESS, TRANSPORT_ERROR, USAGE,
};

pub fn run(args: RelayArgs) -> CliResult<i32> {
    let pairs = load_pairs(&args)?;
    if pairs.is_empty() {
        return Err(CliError::new(USAGE, "no links configured"));
    }

    let config = RelayConfig {
        idle_timeout: Duration::from_millis(args.idle_timeout_ms),
    };
    let outcomes = Relay::new(pairs)
        .with_config(config)
        .run()
        .map_err(|err| relay_error("relay failed", err))?;

    let mut failed = 0usize;
    for (index, outcome) in outcomes.iter().enumerate() {
        info!(link = index, outcome = outcome_label(outcome), "link result");
        if !outcome.is_clean() {
            failed += 1;
        }
    }
    info!(links = outcomes.len(), failed, "relay finished");

    Ok(if failed == 0 { SUCCESS } else { TRANSPORT_ERROR })
}

fn load_pairs(args: &RelayArgs) -> CliResult<Vec<RelayPair>> {
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .map_err(|err| io_error("reading relay config failed", err))?;
        let pairs: Vec<RelayPair> = serde_json::from_str(&text).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("parsing relay config {}: {err}", path.display()),
            )
        })?;
        return Ok(pairs);
    }

    args.links
        .iter()
        .map(|spec| RelayPair::parse(spec).map_err(|err| CliError::new(USAGE, err.to_string())))
        .collect()
}

fn outcome_label(outcome: &LinkOutcome) -> &'static str {
    match outcome {
        LinkOutcome::PeerClosed => "peer-closed",
        LinkOutcome::IdleTimeout => "idle-timeout",
        LinkOutcome::Stalled => "stalled",
        LinkOutcome::Failed(_) => "failed",
    }
}
