//! Live video ingest for the inspection console.
//!
//! Datagrams flow through three stages:
//!
//! 1. [`FrameReassembler`] concatenates fragments into one fixed-capacity
//!    buffer until an end-of-frame flag arrives.
//! 2. [`AdmissionGate`] decides whether the completed frame goes to the
//!    consumer: at most one frame is in flight, and frames closer together
//!    than the configured interval are dropped.
//! 3. [`VideoIngestChannel`] runs the receive loop on its own thread, decodes
//!    admitted frames through a [`FrameDecoder`] and hands them to a single
//!    consumer as [`ReadyFrame`]s.
//!
//! Nothing is queued: under load, frames are dropped rather than delayed.

pub mod config;
pub mod decoder;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod reassembler;
pub mod stats;

pub use config::{
    VideoConfig, DEFAULT_MIN_FRAME_INTERVAL, DEFAULT_REASSEMBLY_CAPACITY, DEFAULT_VIDEO_PORT,
};
pub use decoder::{FnDecoder, FrameDecoder, JpegCheckError, JpegFrameCheck, PassthroughDecoder};
pub use error::{Result, VideoError};
pub use gate::{Admission, AdmissionGate, AdmissionPermit, Rejection};
pub use ingest::{ReadyFrame, VideoIngestChannel};
pub use reassembler::{CompletedFrame, FrameEvent, FrameReassembler};
pub use stats::{IngestSnapshot, IngestStats};
