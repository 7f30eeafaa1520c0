/// Errors that can occur while setting up cluster connections.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to bind the listening endpoint.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The listen specification could not be parsed.
    #[error("invalid listen spec {spec:?}: {reason}")]
    BadSpec { spec: String, reason: String },

    /// An I/O error occurred on an established stream.
    #[error("net I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
