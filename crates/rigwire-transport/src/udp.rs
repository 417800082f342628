use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::loopback_for;

/// Default kernel receive buffer requested for video sockets: 8 MiB.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Options applied when binding a UDP socket.
#[derive(Debug, Clone)]
pub struct UdpOptions {
    /// Requested `SO_RCVBUF`. The kernel may clamp it (see `net.core.rmem_max`).
    pub recv_buffer_size: Option<usize>,
    /// Upper bound on how long a blocked receive waits before re-checking state.
    pub read_timeout: Option<Duration>,
}

impl Default for UdpOptions {
    fn default() -> Self {
        Self {
            recv_buffer_size: Some(DEFAULT_RECV_BUFFER_SIZE),
            read_timeout: None,
        }
    }
}

/// Bind a UDP socket and apply `options`.
///
/// Only the bind itself is fatal. A receive buffer the kernel refuses to
/// enlarge is logged and the socket is returned with its default size.
pub fn bind_udp(addr: SocketAddr, options: &UdpOptions) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;

    if let Some(requested) = options.recv_buffer_size {
        match set_receive_buffer_size(&socket, requested) {
            Ok(()) => debug!(
                requested,
                effective = receive_buffer_size(&socket),
                "udp receive buffer configured"
            ),
            Err(err) => warn!(requested, error = %err, "could not enlarge udp receive buffer"),
        }
    }

    socket
        .set_read_timeout(options.read_timeout)
        .map_err(|source| TransportError::SocketOption {
            option: "SO_RCVTIMEO",
            source,
        })?;

    let local = socket.local_addr()?;
    info!(%local, "udp socket bound");
    Ok(socket)
}

/// Effective kernel receive buffer size, if the platform reports it.
#[cfg(unix)]
pub fn receive_buffer_size(socket: &UdpSocket) -> Option<usize> {
    use std::os::fd::AsRawFd;

    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

    // SAFETY: `value` and `len` are valid writable pointers for the provided sizes,
    // and the descriptor is an open socket owned by `socket`.
    let rc = unsafe {
        libc::getsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&mut value as *mut libc::c_int).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if rc == 0 && value > 0 {
        Some(value as usize)
    } else {
        None
    }
}

/// Effective kernel receive buffer size, if the platform reports it.
#[cfg(not(unix))]
pub fn receive_buffer_size(_socket: &UdpSocket) -> Option<usize> {
    None
}

#[cfg(unix)]
fn set_receive_buffer_size(socket: &UdpSocket, size: usize) -> Result<()> {
    use std::os::fd::AsRawFd;

    let value = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);

    // SAFETY: `value` lives for the duration of the call and its size is passed
    // alongside; the descriptor is an open socket owned by `socket`.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&value as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(TransportError::SocketOption {
            option: "SO_RCVBUF",
            source: std::io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
fn set_receive_buffer_size(_socket: &UdpSocket, _size: usize) -> Result<()> {
    Err(TransportError::SocketOption {
        option: "SO_RCVBUF",
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "receive buffer sizing is only implemented for unix targets",
        ),
    })
}

/// Send an empty datagram to `socket`'s own address so a thread blocked in
/// `recv_from` on it returns.
pub fn wake_udp(socket: &UdpSocket) -> Result<()> {
    let target = loopback_for(socket.local_addr()?);
    socket.send_to(&[], target)?;
    debug!(%target, "sent udp wake datagram");
    Ok(())
}
