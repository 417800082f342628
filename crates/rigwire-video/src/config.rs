use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rigwire_transport::DEFAULT_RECV_BUFFER_SIZE;

/// Port the rig streams video to.
pub const DEFAULT_VIDEO_PORT: u16 = 50000;

/// Reassembly buffer size: 4 MiB, enough for one full-resolution MJPEG frame.
pub const DEFAULT_REASSEMBLY_CAPACITY: usize = 4 * 1024 * 1024;

/// Minimum spacing between frames handed to the consumer (~30 fps).
pub const DEFAULT_MIN_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Largest UDP payload over IPv4.
const MAX_UDP_DATAGRAM: usize = 65_507;

/// Controls the video ingest channel.
#[derive(Debug, Clone)]
pub struct VideoConfig {
    /// Local address to bind. The port comes from `start`.
    pub bind_addr: IpAddr,
    /// Capacity of the reassembly buffer in bytes.
    pub reassembly_capacity: usize,
    /// Requested kernel receive buffer (`SO_RCVBUF`), `None` keeps the OS default.
    pub recv_buffer_size: Option<usize>,
    /// Minimum interval between admitted frames. Zero disables throttling.
    pub min_frame_interval: Duration,
    /// Size of the per-datagram receive buffer.
    pub max_datagram_size: usize,
    /// How long a blocked receive waits before re-checking the stop flag.
    pub poll_interval: Duration,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            reassembly_capacity: DEFAULT_REASSEMBLY_CAPACITY,
            recv_buffer_size: Some(DEFAULT_RECV_BUFFER_SIZE),
            min_frame_interval: DEFAULT_MIN_FRAME_INTERVAL,
            max_datagram_size: MAX_UDP_DATAGRAM,
            poll_interval: Duration::from_millis(250),
        }
    }
}
