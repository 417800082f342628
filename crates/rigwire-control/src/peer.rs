use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rigwire_codec::{FrameConfig, FrameError, FrameWriter};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::event::{ControlEvent, DisconnectReason};

/// Closes a peer connection without going through its writer.
///
/// Must wake a write blocked on another handle to the same socket, so that a
/// stalled send never holds up replacing or stopping the connection.
pub trait PeerCloser: Send + Sync {
    fn close(&self);
}

impl PeerCloser for TcpStream {
    fn close(&self) {
        if let Err(err) = self.shutdown(Shutdown::Both) {
            debug!(error = %err, "peer shutdown failed");
        }
    }
}

/// Outcome of a send on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The whole message was written.
    Sent,
    /// No peer was connected; nothing was written.
    NoPeer,
    /// The write failed and the peer was dropped.
    PeerLost,
}

/// Result of [`PeerSlot::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SendOutcome {
    pub(crate) delivery: Delivery,
    /// This send removed the peer from the slot.
    pub(crate) removed: bool,
}

impl SendOutcome {
    fn kept(delivery: Delivery) -> Self {
        Self {
            delivery,
            removed: false,
        }
    }
}

type PeerWriter = FrameWriter<Box<dyn Write + Send>>;

pub(crate) struct PeerConnection {
    id: u64,
    addr: SocketAddr,
    closer: Box<dyn PeerCloser>,
    writer: Mutex<PeerWriter>,
}

impl PeerConnection {
    pub(crate) fn new(
        id: u64,
        addr: SocketAddr,
        writer: Box<dyn Write + Send>,
        closer: Box<dyn PeerCloser>,
        config: FrameConfig,
    ) -> Self {
        Self {
            id,
            addr,
            closer,
            writer: Mutex::new(FrameWriter::with_config(writer, config)),
        }
    }

    /// Wrap an accepted stream, keeping a second handle for closing.
    pub(crate) fn tcp(
        id: u64,
        addr: SocketAddr,
        stream: TcpStream,
        config: FrameConfig,
    ) -> io::Result<Self> {
        let closer = stream.try_clone()?;
        Ok(Self::new(id, addr, Box::new(stream), Box::new(closer), config))
    }

    fn write(&self, body: &[u8]) -> Result<usize, FrameError> {
        // One writer per connection keeps concurrent sends from interleaving.
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(body)
    }
}

/// Holder of the single active peer.
///
/// Every removal goes through this type, and whichever call removes a
/// connection closes it and emits its `Disconnected` event. A connection is
/// therefore reported exactly once. The slot lock is never held across a
/// blocking write.
pub(crate) struct PeerSlot {
    current: Mutex<Option<Arc<PeerConnection>>>,
    events: Sender<ControlEvent>,
}

impl PeerSlot {
    pub(crate) fn new(events: Sender<ControlEvent>) -> Self {
        Self {
            current: Mutex::new(None),
            events,
        }
    }

    /// Make `conn` the active peer, closing whichever one it replaces.
    pub(crate) fn install(&self, conn: PeerConnection) {
        let mut current = self.lock();
        if let Some(previous) = current.take() {
            info!(old = %previous.addr, new = %conn.addr, "control peer superseded");
            self.retire(&previous, DisconnectReason::Superseded);
        }
        info!(peer = %conn.addr, id = conn.id, "control peer connected");
        self.emit(ControlEvent::Connected { peer: conn.addr });
        *current = Some(Arc::new(conn));
    }

    /// Remove the active peer if it is still connection `id`.
    pub(crate) fn remove(&self, id: u64, reason: DisconnectReason) -> bool {
        let mut current = self.lock();
        if !current.as_ref().is_some_and(|conn| conn.id == id) {
            return false;
        }
        match current.take() {
            Some(conn) => {
                self.retire(&conn, reason);
                true
            }
            None => false,
        }
    }

    /// Remove whichever peer is active.
    pub(crate) fn clear(&self, reason: DisconnectReason) -> bool {
        match self.lock().take() {
            Some(conn) => {
                self.retire(&conn, reason);
                true
            }
            None => false,
        }
    }

    /// Write one message body to the active peer.
    ///
    /// The peer is kept when the body is rejected for size, since nothing
    /// reached the wire. A write cut short because the peer was replaced or
    /// cleared meanwhile reports `PeerLost` without removing anything.
    pub(crate) fn send(&self, body: &[u8]) -> Result<SendOutcome, FrameError> {
        let Some(conn) = self.lock().as_ref().map(Arc::clone) else {
            debug!(len = body.len(), "no control peer, message not sent");
            return Ok(SendOutcome::kept(Delivery::NoPeer));
        };

        match conn.write(body) {
            Ok(written) => {
                debug!(peer = %conn.addr, written, "control message sent");
                Ok(SendOutcome::kept(Delivery::Sent))
            }
            Err(err @ FrameError::PayloadTooLarge { .. }) => Err(err),
            Err(err) => {
                let reason = DisconnectReason::SendFailed {
                    message: err.to_string(),
                };
                let removed = self.remove(conn.id, reason);
                if removed {
                    warn!(peer = %conn.addr, error = %err, "control send failed, dropping peer");
                } else {
                    debug!(peer = %conn.addr, error = %err, "send to a peer that was already removed");
                }
                Ok(SendOutcome {
                    delivery: Delivery::PeerLost,
                    removed,
                })
            }
        }
    }

    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|conn| conn.addr)
    }

    fn retire(&self, conn: &PeerConnection, reason: DisconnectReason) {
        conn.closer.close();
        debug!(peer = %conn.addr, id = conn.id, %reason, "control peer removed");
        self.emit(ControlEvent::Disconnected {
            peer: conn.addr,
            reason,
        });
    }

    fn emit(&self, event: ControlEvent) {
        // A dropped receiver only means nobody is listening for events.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<PeerConnection>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
