use renderlink_net::NetError;

/// Errors that can occur while setting up the relay.
///
/// Once links are forwarding, failures stay inside their link and are
/// reported as a [`LinkOutcome`](crate::link::LinkOutcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Transport-level setup failure (bind, accept, connect).
    #[error(transparent)]
    Net(#[from] NetError),

    /// A link pair argument could not be parsed.
    #[error("invalid link spec {spec:?} (expected LISTEN=DEST)")]
    BadPair { spec: String },

    /// The relay was started with no links configured.
    #[error("no links configured")]
    Empty,

    /// Spawning a forwarding thread failed.
    #[error("failed to spawn link thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
