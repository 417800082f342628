//! Control channel between the console and the rig.
//!
//! The console listens; the rig connects. Exactly one connection is live at a
//! time and a newer connection replaces the older one. Messages in both
//! directions are 4-byte big-endian length-prefixed UTF-8 JSON, normally a
//! [`ControlEnvelope`].
//!
//! [`send_oneshot`] covers the other direction: pushing a single command to a
//! device that is itself listening.

pub mod channel;
pub mod config;
pub mod connector;
pub mod envelope;
pub mod error;
pub mod event;
pub mod peer;

pub use channel::ControlChannel;
pub use config::{ControlConfig, DEFAULT_CONTROL_PORT};
pub use connector::{send_oneshot, ConnectConfig, Framing, DEFAULT_CONNECT_TIMEOUT};
pub use envelope::{
    ControlEnvelope, VideoFormat, CMD_CHANGE_FORMAT, CMD_SHUTDOWN, ENVELOPE_TYPE_CMD,
};
pub use error::{ControlError, Result};
pub use event::{ControlEvent, DisconnectReason};
pub use peer::Delivery;
