use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;

pub mod relay;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a worker: accept one control connection and execute its session.
    Worker(WorkerArgs),
    /// Run the relay: fan a control node out to workers.
    Relay(RelayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Worker(args) => worker::run(args),
        Command::Relay(args) => relay::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Listen spec for the control connection (host:port, :port, or port).
    pub listen: String,
    /// Screen region assigned to this worker, as X,Y,WxH.
    #[arg(long, default_value = "0,0,1920x1080")]
    pub viewport: String,
    /// Frame tick interval in milliseconds while idle.
    #[arg(long, default_value_t = 16)]
    pub tick_ms: u64,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Link pairs as LISTEN=DEST, forwarded in order.
    pub links: Vec<String>,
    /// JSON file with [{"listen": ..., "dest": ...}] entries.
    #[arg(long, value_name = "FILE", conflicts_with = "links")]
    pub config: Option<PathBuf>,
    /// Idle window in milliseconds before a silent link is torn down.
    #[arg(long, default_value_t = 10_000)]
    pub idle_timeout_ms: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
