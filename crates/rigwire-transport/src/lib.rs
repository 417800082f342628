//! Socket setup shared by the rigwire channels.
//!
//! This is the lowest layer of rigwire. It knows how to:
//! - bind a UDP socket with an enlarged kernel receive buffer (video ingest)
//! - bind a TCP listener and accept peers (control channel)
//! - wake a thread blocked in `recv_from` / `accept` so it can observe a stop
//!
//! Everything else builds on the plain `std::net` sockets handed out here.

pub mod error;
pub mod tcp;
pub mod udp;

pub use error::{is_fatal_socket_error, Result, TransportError};
pub use tcp::{wake_listener, TcpTransport};
pub use udp::{bind_udp, receive_buffer_size, wake_udp, UdpOptions, DEFAULT_RECV_BUFFER_SIZE};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Address a local thread can use to reach a socket bound to `bound`.
///
/// Wildcard binds are reached through loopback.
pub fn loopback_for(bound: SocketAddr) -> SocketAddr {
    let ip = match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, bound.port())
}
