/// Errors surfaced by the video ingest channel.
///
/// Only start-up can fail from the caller's point of view; per-datagram and
/// per-frame problems are counted and dropped inside the receive loop.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    /// The UDP socket could not be bound or configured.
    #[error("transport error: {0}")]
    Transport(#[from] rigwire_transport::TransportError),

    /// The receive thread could not be started.
    #[error("failed to spawn receive thread: {0}")]
    Spawn(std::io::Error),

    /// A previous receive thread died and took the decoder with it.
    #[error("frame decoder was lost when the receive thread exited abnormally")]
    DecoderLost,
}

pub type Result<T> = std::result::Result<T, VideoError>;
