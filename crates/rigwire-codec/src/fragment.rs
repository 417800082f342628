//! UDP video fragment header.
//!
//! ```text
//! ┌────────────┬──────────────────────────────────────┐
//! │ Flag (1B)  │ Payload (rest of the datagram)       │
//! │ 0 = more   │ opaque slice of an encoded image     │
//! │ 1 = end    │                                      │
//! └────────────┴──────────────────────────────────────┘
//! ```

use std::iter::Peekable;
use std::slice::Chunks;

use bytes::{BufMut, Bytes, BytesMut};

/// Fragment header: one flag byte.
pub const FRAGMENT_HEADER_SIZE: usize = 1;

/// Smallest datagram that carries any payload. Shorter ones are dropped.
pub const MIN_DATAGRAM_SIZE: usize = FRAGMENT_HEADER_SIZE + 1;

/// Position of a fragment within its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentFlag {
    /// More fragments of the same frame follow.
    Continuation,
    /// Last fragment of the frame.
    EndOfFrame,
}

impl FragmentFlag {
    /// Wire value of [`FragmentFlag::Continuation`].
    pub const CONTINUATION: u8 = 0;
    /// Wire value of [`FragmentFlag::EndOfFrame`].
    pub const END_OF_FRAME: u8 = 1;

    /// Interpret a header byte. Only `1` ends a frame; anything else continues it.
    pub fn from_byte(byte: u8) -> Self {
        if byte == Self::END_OF_FRAME {
            Self::EndOfFrame
        } else {
            Self::Continuation
        }
    }

    /// Header byte for this flag.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Continuation => Self::CONTINUATION,
            Self::EndOfFrame => Self::END_OF_FRAME,
        }
    }
}

/// One datagram's payload plus its continuation/end flag.
///
/// Borrows the receive buffer; it lives for a single receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub flag: FragmentFlag,
    pub payload: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Create a fragment.
    pub fn new(flag: FragmentFlag, payload: &'a [u8]) -> Self {
        Self { flag, payload }
    }

    /// True for the last fragment of a frame.
    pub fn is_end_of_frame(&self) -> bool {
        self.flag == FragmentFlag::EndOfFrame
    }
}

/// Split a datagram into flag and payload.
///
/// Returns `None` for datagrams shorter than [`MIN_DATAGRAM_SIZE`].
pub fn decode_fragment(datagram: &[u8]) -> Option<Fragment<'_>> {
    if datagram.len() < MIN_DATAGRAM_SIZE {
        return None;
    }
    Some(Fragment {
        flag: FragmentFlag::from_byte(datagram[0]),
        payload: &datagram[FRAGMENT_HEADER_SIZE..],
    })
}

/// Append one datagram (header + payload) to `dst`.
pub fn encode_fragment(flag: FragmentFlag, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(FRAGMENT_HEADER_SIZE + payload.len());
    dst.put_u8(flag.to_byte());
    dst.put_slice(payload);
}

/// Split an encoded frame into datagrams carrying at most `max_payload`
/// payload bytes each. The last datagram is flagged end-of-frame.
///
/// An empty frame yields no datagrams.
pub fn fragment_frame(frame: &[u8], max_payload: usize) -> Fragments<'_> {
    Fragments {
        chunks: frame.chunks(max_payload.max(1)).peekable(),
    }
}

/// Iterator returned by [`fragment_frame`].
pub struct Fragments<'a> {
    chunks: Peekable<Chunks<'a, u8>>,
}

impl Iterator for Fragments<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        let flag = if self.chunks.peek().is_some() {
            FragmentFlag::Continuation
        } else {
            FragmentFlag::EndOfFrame
        };

        let mut datagram = BytesMut::with_capacity(FRAGMENT_HEADER_SIZE + chunk.len());
        encode_fragment(flag, chunk, &mut datagram);
        Some(datagram.freeze())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}
