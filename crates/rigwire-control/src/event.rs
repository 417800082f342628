use std::net::SocketAddr;

use serde::Serialize;

/// Status and message notifications from a [`crate::ControlChannel`].
///
/// Only `Message` carries protocol data; the rest are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// The listener is bound.
    Listening { addr: SocketAddr },
    /// A peer connected and is now the active one.
    Connected { peer: SocketAddr },
    /// A complete message body arrived from the active peer.
    Message { peer: SocketAddr, json: String },
    /// No peer is connected; waiting for the next one.
    Waiting,
    /// A peer connection ended.
    Disconnected {
        peer: SocketAddr,
        reason: DisconnectReason,
    },
    /// The channel stopped. No further events follow until the next `start`.
    Stopped,
}

/// Why a peer connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The peer closed its end between messages.
    Closed,
    /// A newer connection took over.
    Superseded,
    /// The peer declared a body larger than the limit.
    ProtocolViolation { declared: usize, max: usize },
    /// Reading failed, including a close in the middle of a message.
    ReadError { message: String },
    /// Writing an outbound message failed.
    SendFailed { message: String },
    /// The channel was stopped.
    Stopped,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed by peer"),
            Self::Superseded => f.write_str("superseded by a newer connection"),
            Self::ProtocolViolation { declared, max } => {
                write!(f, "declared message length {declared} exceeds {max}")
            }
            Self::ReadError { message } => write!(f, "read error: {message}"),
            Self::SendFailed { message } => write!(f, "send failed: {message}"),
            Self::Stopped => f.write_str("channel stopped"),
        }
    }
}
