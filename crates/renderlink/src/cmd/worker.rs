use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use renderlink_net::TcpEndpoint;
use renderlink_session::{
    Activation, FixedViewport, HostBackend, Session, Viewport, WorkerLoop,
};
use tracing::info;

use crate::cmd::WorkerArgs;
use crate::exit::{dispatch_error, net_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};

pub fn run(args: WorkerArgs) -> CliResult<i32> {
    let viewport = parse_viewport(&args.viewport)?;
    let tick = Duration::from_millis(args.tick_ms);

    let endpoint =
        TcpEndpoint::bind(&args.listen).map_err(|err| net_error("bind failed", err))?;
    info!(addr = %endpoint.local_addr(), ?viewport, "worker awaiting control connection");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let stream = endpoint
        .accept()
        .map_err(|err| net_error("accept failed", err))?;
    info!("control node connected; session open");

    let mut worker = WorkerLoop::new(
        stream,
        Session::new(HostBackend::new()),
        FixedViewport(viewport),
    );

    while running.load(Ordering::SeqCst) {
        match worker.tick() {
            Ok(Activation::Idle) => std::thread::sleep(tick),
            Ok(Activation::Applied(_)) => {}
            Ok(Activation::Shutdown) => {
                info!("shutdown requested by control node");
                return Ok(SUCCESS);
            }
            Ok(Activation::Disconnected) => {
                info!("control node disconnected");
                return Ok(SUCCESS);
            }
            Err(err) => return Err(dispatch_error("session terminated", err)),
        }
    }

    info!("interrupted; closing session");
    Ok(SUCCESS)
}

/// Parse the `X,Y,WxH` viewport form, e.g. `1920,0,1920x1080`.
fn parse_viewport(spec: &str) -> CliResult<Viewport> {
    let bad = || CliError::new(USAGE, format!("invalid viewport {spec:?} (expected X,Y,WxH)"));

    let mut parts = spec.split(',');
    let x = parts.next().and_then(|p| p.trim().parse().ok()).ok_or_else(bad)?;
    let y = parts.next().and_then(|p| p.trim().parse().ok()).ok_or_else(bad)?;
    let size = parts.next().ok_or_else(bad)?;
    if parts.next().is_some() {
        return Err(bad());
    }

    let (width, height) = size.trim().split_once('x').ok_or_else(bad)?;
    let width = width.parse().map_err(|_| bad())?;
    let height = height.parse().map_err(|_| bad())?;
    if width <= 0 || height <= 0 {
        return Err(bad());
    }
    Ok(Viewport::new(x, y, width, height))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
