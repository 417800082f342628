use bytes::Bytes;
use rigwire_codec::{decode_fragment, Fragment};

use crate::config::DEFAULT_REASSEMBLY_CAPACITY;

/// Outcome of feeding one fragment to a [`FrameReassembler`].
#[derive(Debug, PartialEq, Eq)]
pub enum FrameEvent<'a> {
    /// The fragment was appended; the frame is still open.
    Continuing,
    /// The fragment closed the frame.
    Completed(CompletedFrame<'a>),
    /// The fragment did not fit. The open frame was discarded.
    Overflowed,
    /// The datagram was too short to carry a fragment.
    Invalid,
}

/// A complete frame, borrowed from the reassembly buffer.
///
/// The reassembler cannot accept another fragment while this borrow is alive,
/// so the bytes can't be overwritten underneath a reader. Use
/// [`CompletedFrame::to_bytes`] to keep them past that point.
#[derive(Debug, PartialEq, Eq)]
pub struct CompletedFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> CompletedFrame<'a> {
    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the frame carried no payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The encoded frame.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Owned copy of the encoded frame.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.bytes)
    }
}

/// Rebuilds frames from in-order fragments.
///
/// Owns one buffer allocated up front and reused for every frame. Fragments
/// are appended in arrival order; there is no reordering or duplicate
/// detection, so fragments of one frame must not interleave with another's.
pub struct FrameReassembler {
    buffer: Box<[u8]>,
    len: usize,
}

impl FrameReassembler {
    /// Create a reassembler with the default 4 MiB buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REASSEMBLY_CAPACITY)
    }

    /// Create a reassembler whose frames may hold up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Decode a raw datagram and feed it in.
    pub fn accept_datagram(&mut self, datagram: &[u8]) -> FrameEvent<'_> {
        match decode_fragment(datagram) {
            Some(fragment) => self.accept(fragment),
            None => FrameEvent::Invalid,
        }
    }

    /// Append one fragment.
    ///
    /// A fragment that would push the frame past capacity discards the whole
    /// open frame and is itself ignored. After `Completed` the cursor is back
    /// at zero; the returned frame borrows the buffer until it is dropped.
    pub fn accept(&mut self, fragment: Fragment<'_>) -> FrameEvent<'_> {
        let payload = fragment.payload;
        let end = match self.len.checked_add(payload.len()) {
            Some(end) if end <= self.buffer.len() => end,
            _ => {
                self.len = 0;
                return FrameEvent::Overflowed;
            }
        };

        self.buffer[self.len..end].copy_from_slice(payload);
        self.len = end;

        if !fragment.is_end_of_frame() {
            return FrameEvent::Continuing;
        }

        let frame_len = self.len;
        self.len = 0;
        FrameEvent::Completed(CompletedFrame {
            bytes: &self.buffer[..frame_len],
        })
    }

    /// Bytes buffered for the frame currently being assembled.
    pub fn pending_len(&self) -> usize {
        self.len
    }

    /// Maximum frame size.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially assembled frame.
    pub fn reset(&mut self) {
        self.len = 0;
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameReassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReassembler")
            .field("capacity", &self.buffer.len())
            .field("pending", &self.len)
            .finish()
    }
}
