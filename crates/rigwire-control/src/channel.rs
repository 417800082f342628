use std::borrow::Cow;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rigwire_codec::{FrameError, FrameReader};
use rigwire_transport::{is_fatal_socket_error, wake_listener, TcpTransport, TransportError};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::ControlConfig;
use crate::envelope::ControlEnvelope;
use crate::error::{ControlError, Result};
use crate::event::{ControlEvent, DisconnectReason};
use crate::peer::{Delivery, PeerConnection, PeerSlot};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

struct Shared {
    config: ControlConfig,
    running: AtomicBool,
    next_peer_id: AtomicU64,
    slot: PeerSlot,
    events: Sender<ControlEvent>,
}

impl Shared {
    fn emit(&self, event: ControlEvent) {
        let _ = self.events.send(event);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn after_removal(&self) {
        if self.is_running() {
            self.emit(ControlEvent::Waiting);
        }
    }
}

struct Worker {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

/// TCP listener holding at most one active peer.
///
/// Incoming messages and status changes arrive on the `Receiver` returned by
/// [`ControlChannel::new`]. Outbound messages go to whichever peer is current.
pub struct ControlChannel {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl ControlChannel {
    /// Create a stopped channel and the receiver its events arrive on.
    pub fn new(config: ControlConfig) -> (Self, Receiver<ControlEvent>) {
        let (events, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            config,
            running: AtomicBool::new(false),
            next_peer_id: AtomicU64::new(1),
            slot: PeerSlot::new(events.clone()),
            events,
        });
        let channel = Self {
            shared,
            worker: Mutex::new(None),
        };
        (channel, rx)
    }

    /// Bind `config.bind_addr:port` and start accepting peers.
    ///
    /// Returns the bound address. Calling it while already running returns
    /// the existing address without rebinding.
    pub fn start(&self, port: u16) -> Result<SocketAddr> {
        let mut worker = lock(&self.worker);
        if let Some(existing) = worker.as_ref() {
            return Ok(existing.local_addr);
        }

        let transport = TcpTransport::bind(SocketAddr::new(self.shared.config.bind_addr, port))?;
        let local_addr = transport.local_addr();

        self.shared.running.store(true, Ordering::Release);
        info!(%local_addr, "control channel listening");
        self.shared.emit(ControlEvent::Listening { addr: local_addr });
        self.shared.emit(ControlEvent::Waiting);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("rigwire-control-accept".to_string())
            .spawn(move || accept_loop(transport, shared))
            .map_err(|err| {
                self.shared.running.store(false, Ordering::Release);
                self.shared.emit(ControlEvent::Stopped);
                ControlError::Spawn(err)
            })?;

        *worker = Some(Worker { local_addr, handle });
        Ok(local_addr)
    }

    /// Stop accepting, close the active peer and wait for the accept thread.
    /// No-op when not started.
    pub fn stop(&self) {
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };

        self.shared.running.store(false, Ordering::Release);
        wake_listener(worker.local_addr);
        if worker.handle.join().is_err() {
            warn!("control accept thread panicked");
        }
        // After the join no accept can install a new peer behind our back.
        self.shared.slot.clear(DisconnectReason::Stopped);

        info!(local_addr = %worker.local_addr, "control channel stopped");
        self.shared.emit(ControlEvent::Stopped);
    }

    /// Send an envelope to the active peer.
    pub fn send(&self, envelope: &ControlEnvelope) -> Result<Delivery> {
        let body = serde_json::to_vec(envelope)?;
        self.send_bytes(&body)
    }

    /// Send any JSON-serializable value to the active peer.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<Delivery> {
        let body = serde_json::to_vec(value)?;
        self.send_bytes(&body)
    }

    /// Send a pre-encoded message body to the active peer.
    pub fn send_bytes(&self, body: &[u8]) -> Result<Delivery> {
        let outcome = self.shared.slot.send(body)?;
        if outcome.removed {
            self.shared.after_removal();
        }
        Ok(outcome.delivery)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.slot.peer_addr().is_some()
    }

    /// Address of the active peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.slot.peer_addr()
    }

    /// Bound listener address while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.worker).as_ref().map(|worker| worker.local_addr)
    }

    pub fn config(&self) -> &ControlConfig {
        &self.shared.config
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(transport: TcpTransport, shared: Arc<Shared>) {
    loop {
        let accepted = transport.accept();
        if !shared.is_running() {
            // The wake connection, or a peer that lost the race with stop.
            break;
        }

        match accepted {
            Ok((stream, peer)) => admit(&shared, stream, peer),
            Err(TransportError::Accept(err)) if is_fatal_socket_error(&err) => {
                warn!(error = %err, "control listener unusable, accept loop ending");
                break;
            }
            Err(err) => {
                warn!(error = %err, "control accept failed");
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    debug!("control accept loop exited");
}

fn admit(shared: &Arc<Shared>, stream: TcpStream, peer: SocketAddr) {
    let id = shared.next_peer_id.fetch_add(1, Ordering::Relaxed);
    let read_half = match stream.try_clone() {
        Ok(read_half) => read_half,
        Err(err) => {
            warn!(%peer, error = %err, "could not split control connection, dropping it");
            return;
        }
    };
    if let Err(err) = stream.set_write_timeout(shared.config.write_timeout) {
        warn!(%peer, error = %err, "could not set control write timeout");
    }

    let conn = match PeerConnection::tcp(id, peer, stream, shared.config.writer_config()) {
        Ok(conn) => conn,
        Err(err) => {
            warn!(%peer, error = %err, "could not keep a close handle, dropping connection");
            return;
        }
    };
    shared.slot.install(conn);

    let reader_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("rigwire-control-peer-{id}"))
        .spawn(move || read_loop(&reader_shared, id, peer, read_half));
    if let Err(err) = spawned {
        warn!(%peer, error = %err, "could not start control reader");
        let message = format!("reader thread not started: {err}");
        if shared
            .slot
            .remove(id, DisconnectReason::ReadError { message })
        {
            shared.after_removal();
        }
    }
}

fn read_loop(shared: &Shared, id: u64, peer: SocketAddr, stream: TcpStream) {
    let mut reader = match FrameReader::with_config_tcp(stream, shared.config.reader_config()) {
        Ok(reader) => reader,
        Err(err) => {
            let reason = DisconnectReason::ReadError {
                message: err.to_string(),
            };
            if shared.slot.remove(id, reason) {
                shared.after_removal();
            }
            return;
        }
    };

    let reason = loop {
        match reader.read_frame() {
            Ok(body) if body.is_empty() => trace!(%peer, "empty control message ignored"),
            Ok(body) => {
                let json = match String::from_utf8_lossy(&body) {
                    Cow::Borrowed(json) => json.to_owned(),
                    Cow::Owned(json) => {
                        warn!(
                            %peer,
                            len = body.len(),
                            "control message is not valid UTF-8, bad sequences replaced"
                        );
                        json
                    }
                };
                debug!(%peer, len = body.len(), "control message received");
                shared.emit(ControlEvent::Message { peer, json });
            }
            Err(FrameError::ConnectionClosed) => break DisconnectReason::Closed,
            Err(FrameError::PayloadTooLarge { size, max }) => {
                warn!(%peer, declared = size, max, "control peer declared oversized message");
                break DisconnectReason::ProtocolViolation {
                    declared: size,
                    max,
                };
            }
            Err(err) => {
                break DisconnectReason::ReadError {
                    message: err.to_string(),
                }
            }
        }
    };

    if shared.slot.remove(id, reason) {
        shared.after_removal();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{IpAddr, Ipv4Addr, TcpListener};
    use std::time::Instant;

    use rigwire_codec::{encode_frame_header, FrameWriter, DEFAULT_MAX_PAYLOAD};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn local_config() -> ControlConfig {
        ControlConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..ControlConfig::default()
        }
    }

    fn started() -> (ControlChannel, Receiver<ControlEvent>, SocketAddr) {
        let (channel, events) = ControlChannel::new(local_config());
        let addr = channel.start(0).expect("channel should start");
        (channel, events, addr)
    }

    /// Skip events until one matches.
    fn expect_event(
        events: &Receiver<ControlEvent>,
        mut matches: impl FnMut(&ControlEvent) -> bool,
    ) -> ControlEvent {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let event = events
                .recv_timeout(left)
                .expect("expected event did not arrive");
            if matches(&event) {
                return event;
            }
        }
    }

    fn connect_raw(addr: SocketAddr) -> TcpStream {
        let client = TcpStream::connect(addr).expect("client should connect");
        client
            .set_read_timeout(Some(WAIT))
            .expect("read timeout should apply");
        client
    }

    fn connect(addr: SocketAddr, events: &Receiver<ControlEvent>) -> TcpStream {
        let client = connect_raw(addr);
        let local = client.local_addr().expect("client addr");
        expect_event(
            events,
            |event| matches!(event, ControlEvent::Connected { peer } if *peer == local),
        );
        client
    }

    fn assert_closed(client: &mut TcpStream) {
        let mut buf = [0u8; 16];
        match client.read(&mut buf) {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("expected closed connection, read {n} bytes"),
        }
    }

    #[test]
    fn shutdown_envelope_round_trips_unchanged() {
        let (_channel, events, addr) = started();
        let client = connect(addr, &events);

        let json = r#"{"type":"cmd","command":"shutdown","args":{}}"#;
        FrameWriter::new(client)
            .send(json.as_bytes())
            .expect("client send should succeed");

        let event = expect_event(&events, |event| matches!(event, ControlEvent::Message { .. }));
        let ControlEvent::Message { json: received, .. } = event else {
            unreachable!()
        };
        assert_eq!(received, json);
        let envelope = ControlEnvelope::from_json(&received).expect("should parse");
        assert_eq!(envelope, ControlEnvelope::shutdown());
    }

    #[test]
    fn oversized_declaration_disconnects_peer() {
        let (channel, events, addr) = started();
        let mut client = connect(addr, &events);

        let declared = 11 * 1024 * 1024;
        client
            .write_all(&encode_frame_header(declared as u32))
            .expect("header write should succeed");
        client.write_all(b"{}").expect("partial body write");

        let event = expect_event(&events, |event| {
            matches!(event, ControlEvent::Disconnected { .. })
        });
        assert!(matches!(
            event,
            ControlEvent::Disconnected {
                reason: DisconnectReason::ProtocolViolation { declared: d, max },
                ..
            } if d == declared && max == DEFAULT_MAX_PAYLOAD
        ));
        expect_event(&events, |event| *event == ControlEvent::Waiting);
        assert!(!channel.is_connected());
        assert_closed(&mut client);
    }

    #[test]
    fn newer_connection_wins() {
        let (channel, events, addr) = started();
        let mut first = connect(addr, &events);
        let first_addr = first.local_addr().expect("first addr");
        let second = connect_raw(addr);
        let second_addr = second.local_addr().expect("second addr");

        expect_event(&events, |event| {
            *event
                == ControlEvent::Disconnected {
                    peer: first_addr,
                    reason: DisconnectReason::Superseded,
                }
        });
        expect_event(&events, |event| {
            *event == ControlEvent::Connected { peer: second_addr }
        });
        assert_closed(&mut first);
        assert_eq!(channel.peer_addr(), Some(second_addr));

        let delivery = channel
            .send(&ControlEnvelope::shutdown())
            .expect("send should succeed");
        assert_eq!(delivery, Delivery::Sent);
        let body = FrameReader::new(second)
            .read_frame()
            .expect("second client should receive");
        assert_eq!(&body[..], br#"{"type":"cmd","command":"shutdown","args":{}}"#);
    }

    #[test]
    fn send_without_peer_is_noop() {
        let (channel, _events, _addr) = started();
        let delivery = channel
            .send(&ControlEnvelope::shutdown())
            .expect("send should succeed");
        assert_eq!(delivery, Delivery::NoPeer);
    }

    #[test]
    fn peer_close_is_reported_and_sends_become_noops() {
        let (channel, events, addr) = started();
        let client = connect(addr, &events);
        drop(client);

        expect_event(&events, |event| {
            matches!(
                event,
                ControlEvent::Disconnected {
                    reason: DisconnectReason::Closed,
                    ..
                }
            )
        });
        expect_event(&events, |event| *event == ControlEvent::Waiting);
        assert_eq!(
            channel.send_json(&serde_json::json!({})).expect("send"),
            Delivery::NoPeer
        );
    }

    #[test]
    fn empty_bodies_are_skipped_and_bad_utf8_is_replaced() {
        let (channel, events, addr) = started();
        let client = connect(addr, &events);
        let mut writer = FrameWriter::new(client);

        writer.send(b"").expect("empty send");
        writer.send(&[0xC3, 0x28]).expect("invalid utf-8 send");
        writer.send(br#"{"ok":true}"#).expect("json send");

        let mut next_message = || {
            let event = expect_event(&events, |event| {
                matches!(event, ControlEvent::Message { .. } | ControlEvent::Disconnected { .. })
            });
            match event {
                ControlEvent::Message { json, .. } => json,
                other => panic!("expected a message, got {other:?}"),
            }
        };
        assert_eq!(next_message(), "\u{FFFD}(");
        assert_eq!(next_message(), r#"{"ok":true}"#);
        assert!(channel.is_connected());
    }

    /// A body large enough to fill both socket buffers of a peer that never
    /// reads.
    fn stall_send(channel: &ControlChannel) -> Result<Delivery> {
        channel.send_bytes(&vec![b' '; 9 * 1024 * 1024])
    }

    fn unbounded_writes() -> ControlConfig {
        ControlConfig {
            write_timeout: None,
            ..local_config()
        }
    }

    #[test]
    fn newer_connection_wins_while_a_send_is_stalled() {
        let (channel, events) = ControlChannel::new(unbounded_writes());
        let addr = channel.start(0).expect("channel should start");
        let stuck = connect(addr, &events);
        let stuck_addr = stuck.local_addr().expect("stuck addr");

        thread::scope(|scope| {
            let sender = scope.spawn(|| stall_send(&channel));
            thread::sleep(Duration::from_millis(200));

            let newer = connect_raw(addr);
            let newer_addr = newer.local_addr().expect("newer addr");
            expect_event(&events, |event| {
                *event
                    == ControlEvent::Disconnected {
                        peer: stuck_addr,
                        reason: DisconnectReason::Superseded,
                    }
            });
            expect_event(&events, |event| {
                *event == ControlEvent::Connected { peer: newer_addr }
            });
            assert_eq!(channel.peer_addr(), Some(newer_addr));

            let delivery = sender
                .join()
                .expect("sender thread")
                .expect("send should not error");
            assert_ne!(delivery, Delivery::NoPeer);
        });
        assert!(channel.is_connected());
    }

    #[test]
    fn stop_returns_while_a_send_is_stalled() {
        let (channel, events) = ControlChannel::new(unbounded_writes());
        let addr = channel.start(0).expect("channel should start");
        let _stuck = connect(addr, &events);

        thread::scope(|scope| {
            let sender = scope.spawn(|| stall_send(&channel));
            thread::sleep(Duration::from_millis(200));

            let started = Instant::now();
            channel.stop();
            assert!(started.elapsed() < WAIT, "stop waited on the stalled send");

            let delivery = sender
                .join()
                .expect("sender thread")
                .expect("send should not error");
            assert_ne!(delivery, Delivery::NoPeer);
        });
        expect_event(&events, |event| *event == ControlEvent::Stopped);
        assert!(!channel.is_running());
    }

    #[test]
    fn stop_closes_peer_and_restart_works() {
        let (channel, events, addr) = started();
        let mut client = connect(addr, &events);

        channel.stop();
        expect_event(&events, |event| {
            matches!(
                event,
                ControlEvent::Disconnected {
                    reason: DisconnectReason::Stopped,
                    ..
                }
            )
        });
        expect_event(&events, |event| *event == ControlEvent::Stopped);
        assert!(!channel.is_running());
        assert_eq!(channel.local_addr(), None);
        assert_closed(&mut client);

        let addr = channel.start(0).expect("restart should succeed");
        expect_event(&events, |event| {
            *event == ControlEvent::Listening { addr }
        });
        let _client = connect(addr, &events);
        assert!(channel.is_connected());
    }

    #[test]
    fn start_is_idempotent() {
        let (channel, _events, addr) = started();
        assert_eq!(channel.start(0).expect("second start"), addr);
    }

    #[test]
    fn bind_conflict_is_returned() {
        let taken = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = taken.local_addr().expect("addr").port();

        let (channel, _events) = ControlChannel::new(local_config());
        let err = channel.start(port).expect_err("bind should fail");
        assert!(matches!(
            err,
            ControlError::Transport(TransportError::Bind { .. })
        ));
        assert!(!channel.is_running());
    }
}
