use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use rigwire_codec::{FrameConfig, FrameError, FrameWriter, DEFAULT_MAX_PAYLOAD};
use rigwire_transport::TcpTransport;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// How long [`send_oneshot`] waits for the device to accept.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// How a one-shot message is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// 4-byte big-endian length, then the JSON body.
    #[default]
    LengthPrefixed,
    /// Bare JSON text; the connection close marks the end. Older device
    /// firmware only understands this form.
    Raw,
}

/// Settings for [`send_oneshot`].
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub connect_timeout: Duration,
    pub write_timeout: Option<Duration>,
    pub framing: Framing,
    pub max_message_size: usize,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: Some(Duration::from_secs(2)),
            framing: Framing::default(),
            max_message_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Connect to `addr`, write one JSON message and close.
///
/// Returns the number of bytes written, prefix included.
pub fn send_oneshot<T: Serialize + ?Sized>(
    addr: SocketAddr,
    message: &T,
    config: &ConnectConfig,
) -> Result<usize> {
    let body = serde_json::to_vec(message)?;
    let stream = TcpTransport::connect(addr, config.connect_timeout)?;

    let written = match config.framing {
        Framing::LengthPrefixed => {
            let frame_config = FrameConfig {
                max_payload_size: config.max_message_size,
                read_timeout: None,
                write_timeout: config.write_timeout,
            };
            FrameWriter::with_config_tcp(stream, frame_config)?.send(&body)?
        }
        Framing::Raw => {
            let mut stream = stream;
            stream
                .set_write_timeout(config.write_timeout)
                .map_err(FrameError::from)?;
            stream.write_all(&body).map_err(FrameError::from)?;
            stream.flush().map_err(FrameError::from)?;
            body.len()
        }
    };

    debug!(%addr, written, framing = ?config.framing, "one-shot command sent");
    Ok(written)
}
