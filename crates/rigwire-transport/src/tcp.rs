use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::loopback_for;

/// How long a wake-up connection may take before it is abandoned.
const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// TCP listener transport.
///
/// Provides bind/accept/connect for the control channel. Accepted streams have
/// Nagle's algorithm disabled so small command messages go out immediately.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr`. Port 0 picks an ephemeral port.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// Connect to a listening peer, giving up after `timeout`.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");
        Ok(stream)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Open and immediately drop a connection to a listener bound at `bound`, so
/// a thread blocked in [`TcpTransport::accept`] returns.
pub fn wake_listener(bound: SocketAddr) {
    let target = loopback_for(bound);
    match TcpStream::connect_timeout(&target, WAKE_CONNECT_TIMEOUT) {
        Ok(_) => debug!(%target, "woke tcp listener"),
        Err(err) => debug!(%target, error = %err, "tcp wake connection failed"),
    }
}
