/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared or supplied body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection between messages.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer closed the connection part-way through a message.
    #[error("connection closed mid-message ({buffered} of {expected} bytes received)")]
    UnexpectedEof { buffered: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
