use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use rigwire_transport::{bind_udp, is_fatal_socket_error, wake_udp, TransportError, UdpOptions};
use tracing::{debug, info, trace, warn};

use crate::config::VideoConfig;
use crate::decoder::FrameDecoder;
use crate::error::{Result, VideoError};
use crate::gate::{AdmissionGate, AdmissionPermit};
use crate::reassembler::{FrameEvent, FrameReassembler};
use crate::stats::{IngestSnapshot, IngestStats};

/// A decoded frame waiting for the consumer.
///
/// Holds the admission slot: no further frame is admitted until this value
/// is finished or dropped.
#[derive(Debug)]
pub struct ReadyFrame<T> {
    /// Decoder output.
    pub image: T,
    /// Size of the encoded frame in bytes.
    pub len: usize,
    /// Position among frames delivered since the last `start`, from 1.
    pub sequence: u64,
    permit: AdmissionPermit,
}

impl<T> ReadyFrame<T> {
    /// Take the image and release the admission slot.
    pub fn finish(self) -> T {
        let (image, permit) = self.into_parts();
        permit.release();
        image
    }

    /// Split into the image and the permit, for consumers that finish
    /// rendering somewhere else. The slot stays taken until the permit goes.
    pub fn into_parts(self) -> (T, AdmissionPermit) {
        (self.image, self.permit)
    }
}

struct Shared {
    running: AtomicBool,
    paused: AtomicBool,
    gate: Arc<AdmissionGate>,
    stats: IngestStats,
}

struct Worker<D> {
    local_addr: SocketAddr,
    waker: UdpSocket,
    handle: JoinHandle<D>,
}

/// Receives fragmented video over UDP and delivers admitted frames.
///
/// One receive thread per started channel. The consumer side is the
/// `Receiver` returned by [`VideoIngestChannel::new`].
pub struct VideoIngestChannel<D: FrameDecoder> {
    config: VideoConfig,
    shared: Arc<Shared>,
    decoder: Mutex<Option<D>>,
    frames: Sender<ReadyFrame<D::Image>>,
    worker: Mutex<Option<Worker<D>>>,
}

impl<D: FrameDecoder> VideoIngestChannel<D> {
    /// Create a stopped channel and the receiver its frames arrive on.
    pub fn new(config: VideoConfig, decoder: D) -> (Self, Receiver<ReadyFrame<D::Image>>) {
        let (frames, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            gate: Arc::new(AdmissionGate::new(config.min_frame_interval)),
            stats: IngestStats::default(),
        });
        let channel = Self {
            config,
            shared,
            decoder: Mutex::new(Some(decoder)),
            frames,
            worker: Mutex::new(None),
        };
        (channel, rx)
    }

    /// Bind `config.bind_addr:port` and start receiving.
    ///
    /// Returns the bound address. Calling it while already running returns
    /// the existing address without rebinding.
    pub fn start(&self, port: u16) -> Result<SocketAddr> {
        let mut worker = lock(&self.worker);
        if let Some(existing) = worker.as_ref() {
            if !existing.handle.is_finished() {
                return Ok(existing.local_addr);
            }
        }
        // A receive thread that ended on its own leaves its worker behind.
        if let Some(finished) = worker.take() {
            self.retire(finished);
        }

        let addr = SocketAddr::new(self.config.bind_addr, port);
        let options = UdpOptions {
            recv_buffer_size: self.config.recv_buffer_size,
            read_timeout: Some(self.config.poll_interval).filter(|timeout| !timeout.is_zero()),
        };
        let socket = bind_udp(addr, &options)?;
        let local_addr = socket.local_addr().map_err(TransportError::from)?;
        let waker = socket.try_clone().map_err(TransportError::from)?;

        let decoder = lock(&self.decoder).take().ok_or(VideoError::DecoderLost)?;

        self.shared.running.store(true, Ordering::Release);
        let receiver = ReceiveLoop {
            socket,
            decoder,
            shared: Arc::clone(&self.shared),
            frames: self.frames.clone(),
            reassembler: FrameReassembler::with_capacity(self.config.reassembly_capacity),
            datagram: vec![0u8; self.config.max_datagram_size.max(1)],
            sequence: 0,
        };
        let handle = thread::Builder::new()
            .name("rigwire-video-rx".to_string())
            .spawn(move || receiver.run())
            .map_err(|err| {
                self.shared.running.store(false, Ordering::Release);
                VideoError::Spawn(err)
            })?;

        info!(%local_addr, "video ingest started");
        *worker = Some(Worker {
            local_addr,
            waker,
            handle,
        });
        Ok(local_addr)
    }

    /// Stop receiving and close the socket. No-op when not started.
    pub fn stop(&self) {
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        self.retire(worker);
    }

    /// Stop and join the receive thread, taking its decoder back.
    fn retire(&self, worker: Worker<D>) {
        self.shared.running.store(false, Ordering::Release);
        // The read timeout bounds the join if the wake datagram is lost.
        if let Err(err) = wake_udp(&worker.waker) {
            debug!(error = %err, "video wake datagram failed");
        }

        match worker.handle.join() {
            Ok(decoder) => *lock(&self.decoder) = Some(decoder),
            Err(_) => warn!("video receive thread panicked"),
        }
        info!(local_addr = %worker.local_addr, "video ingest stopped");
    }

    /// Drop completed frames before admission while `paused` is true.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
        debug!(paused, "video ingest pause changed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// True while the receive thread is alive.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
            && lock(&self.worker)
                .as_ref()
                .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Bound address while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.worker).as_ref().map(|worker| worker.local_addr)
    }

    pub fn stats(&self) -> IngestSnapshot {
        self.shared.stats.snapshot()
    }

    /// The gate shared with delivered frames.
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.shared.gate
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }
}

impl<D: FrameDecoder> Drop for VideoIngestChannel<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the receive thread.
struct ReceiveLoop<D: FrameDecoder> {
    socket: UdpSocket,
    decoder: D,
    shared: Arc<Shared>,
    frames: Sender<ReadyFrame<D::Image>>,
    reassembler: FrameReassembler,
    datagram: Vec<u8>,
    sequence: u64,
}

impl<D: FrameDecoder> ReceiveLoop<D> {
    fn run(mut self) -> D {
        while self.shared.running.load(Ordering::Acquire) {
            let len = match self.socket.recv_from(&mut self.datagram) {
                Ok((len, _from)) => len,
                Err(err) if is_poll_timeout(&err) => continue,
                Err(err) if is_fatal_socket_error(&err) => {
                    warn!(error = %err, "video socket unusable, receive loop ending");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "video receive failed");
                    continue;
                }
            };
            if !self.shared.running.load(Ordering::Acquire) {
                break;
            }
            self.on_datagram(len);
        }

        self.shared.running.store(false, Ordering::Release);
        debug!("video receive loop exited");
        self.decoder
    }

    fn on_datagram(&mut self, len: usize) {
        let stats = &self.shared.stats;
        let capacity = self.reassembler.capacity();
        stats.datagram();

        let frame = match self.reassembler.accept_datagram(&self.datagram[..len]) {
            FrameEvent::Continuing => return,
            FrameEvent::Invalid => {
                stats.invalid();
                trace!(len, "short datagram dropped");
                return;
            }
            FrameEvent::Overflowed => {
                stats.overflowed();
                debug!(capacity, "frame exceeded reassembly buffer, discarded");
                return;
            }
            FrameEvent::Completed(frame) => frame,
        };
        stats.completed();

        if self.shared.paused.load(Ordering::Acquire) {
            stats.dropped_paused();
            return;
        }

        let permit = match self.shared.gate.try_acquire(Instant::now()) {
            Ok(permit) => permit,
            Err(reason) => {
                stats.rejected(reason);
                trace!(?reason, "frame not admitted");
                return;
            }
        };
        stats.admitted();

        let frame_len = frame.len();
        match self.decoder.decode(frame.as_bytes()) {
            Ok(image) => {
                self.sequence += 1;
                let ready = ReadyFrame {
                    image,
                    len: frame_len,
                    sequence: self.sequence,
                    permit,
                };
                if self.frames.send(ready).is_err() {
                    trace!("frame receiver gone, frame dropped");
                }
            }
            Err(err) => {
                stats.decode_failure();
                debug!(len = frame_len, error = %err, "frame decode failed");
                drop(permit);
            }
        }
    }
}

fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
