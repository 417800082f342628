use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rigwire_codec::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Port the console listens on for the rig.
pub const DEFAULT_CONTROL_PORT: u16 = 55555;

/// Controls the control channel listener.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Local address to bind. The port comes from `start`.
    pub bind_addr: IpAddr,
    /// Largest message body accepted or sent. A peer declaring more is
    /// disconnected before its body is read.
    pub max_message_size: usize,
    /// Bound on a single outbound write. `None` blocks until the peer reads.
    pub write_timeout: Option<Duration>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_message_size: DEFAULT_MAX_PAYLOAD,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl ControlConfig {
    pub(crate) fn reader_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_message_size,
            read_timeout: None,
            write_timeout: None,
        }
    }

    pub(crate) fn writer_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_message_size,
            read_timeout: None,
            write_timeout: self.write_timeout,
        }
    }
}
