/// Errors returned by control channel operations.
///
/// Problems on an established connection are not errors here: they end that
/// connection and show up as [`crate::ControlEvent::Disconnected`].
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Socket bind, connect or accept failed.
    #[error("transport error: {0}")]
    Transport(#[from] rigwire_transport::TransportError),

    /// A message could not be framed or written.
    #[error("frame error: {0}")]
    Frame(#[from] rigwire_codec::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The accept thread could not be started.
    #[error("failed to spawn accept thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;
