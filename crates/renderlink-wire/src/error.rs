/// Errors that can occur while encoding or decoding control messages.
///
/// `Disconnected` and `Truncated` describe the transport ending; the
/// remaining variants describe a stream that is flowing but carries
/// garbage. Callers use the split to tell "peer went away" apart from
/// "peer sent something unintelligible".
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The peer closed the stream at a message boundary.
    #[error("peer disconnected")]
    Disconnected,

    /// The stream ended in the middle of a message.
    #[error("stream truncated mid-message")]
    Truncated,

    /// The message tag is not one this protocol defines.
    #[error("unknown message tag {0}")]
    UnknownTag(u32),

    /// An argument length field was neither a sentinel nor positive.
    #[error("invalid argument length {0}")]
    InvalidArgLength(i32),

    /// A length field exceeds the sanity bound.
    #[error("payload too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// A string field is not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    BadString(#[from] std::string::FromUtf8Error),

    /// An I/O error occurred while reading or writing.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// True for errors that mean the transport itself ended or broke,
    /// as opposed to a well-formed stream carrying an invalid message.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WireError::Disconnected | WireError::Truncated | WireError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
