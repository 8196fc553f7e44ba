//! Error types shared by the event codec and the dispatch channel.

/// Errors raised while encoding, decoding, or moving events over the channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A frame arrived whose body is not a valid event (unknown kind or a
    /// payload that does not match the kind's schema).
    #[error("malformed event")]
    MalformedEvent(#[source] serde_json::Error),

    #[error("failed to encode event")]
    Encode(#[source] serde_json::Error),

    /// The peer went away, or the connection was closed locally.
    #[error("channel closed")]
    ChannelClosed,

    /// Nothing is listening at the address (refused or timed out).
    #[error("no listener reachable at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("frame of {len} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("channel I/O error")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Classify a write-side I/O error: a dead peer becomes
    /// [`ChannelError::ChannelClosed`], anything else stays an I/O error.
    pub(crate) fn from_write(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::WriteZero => ChannelError::ChannelClosed,
            _ => ChannelError::Io(err),
        }
    }
}
