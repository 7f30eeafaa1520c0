use std::fmt;
use std::io;

use renderlink_net::NetError;
use renderlink_relay::RelayError;
use renderlink_session::DispatchError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn net_error(context: &str, err: NetError) -> CliError {
    match err {
        NetError::Bind { source, .. }
        | NetError::Connect { source, .. }
        | NetError::Accept(source)
        | NetError::Io(source) => io_error(context, source),
        NetError::BadSpec { .. } => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn dispatch_error(context: &str, err: DispatchError) -> CliError {
    match &err {
        DispatchError::Wire(wire) if wire.is_transport() => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        DispatchError::Wire(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        DispatchError::Session(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        DispatchError::Poll(_) | DispatchError::Faulted => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}

pub fn relay_error(context: &str, err: RelayError) -> CliError {
    match err {
        RelayError::Net(err) => net_error(context, err),
        RelayError::BadPair { .. } | RelayError::Empty => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        RelayError::Spawn(source) => io_error(context, source),
    }
}
