//! Wire formats spoken by the inspection rig.
//!
//! Two formats live here:
//! - UDP video fragments: a 1-byte flag (`0` continuation, `1` end-of-frame)
//!   followed by an opaque slice of an encoded image. Datagram boundaries are
//!   fragment boundaries; there is no length field.
//! - TCP control messages: a 4-byte big-endian body length followed by a
//!   UTF-8 JSON body.
//!
//! [`FrameReader`] and [`FrameWriter`] handle partial reads and writes so
//! callers always see complete message bodies.

pub mod codec;
pub mod error;
pub mod fragment;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_frame_header, encode_frame, encode_frame_header, FrameConfig,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use fragment::{
    decode_fragment, encode_fragment, fragment_frame, Fragment, FragmentFlag, Fragments,
    FRAGMENT_HEADER_SIZE, MIN_DATAGRAM_SIZE,
};
pub use reader::FrameReader;
pub use writer::FrameWriter;
