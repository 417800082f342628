//! Seam between the ingest loop and whatever turns encoded bytes into an
//! image the UI can show.

use std::convert::Infallible;
use std::fmt;

use bytes::Bytes;

/// Turns one complete encoded frame into a displayable image.
///
/// Runs on the receive thread, only for admitted frames. A decode error drops
/// that frame and nothing else.
pub trait FrameDecoder: Send + 'static {
    /// What the consumer receives.
    type Image: Send + 'static;
    /// Why a frame could not be decoded.
    type Error: fmt::Display;

    fn decode(&mut self, encoded: &[u8]) -> Result<Self::Image, Self::Error>;
}

/// Hands the encoded bytes through unchanged, as an owned copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughDecoder;

impl FrameDecoder for PassthroughDecoder {
    type Image = Bytes;
    type Error = Infallible;

    fn decode(&mut self, encoded: &[u8]) -> Result<Bytes, Infallible> {
        Ok(Bytes::copy_from_slice(encoded))
    }
}

/// Rejects frames that are not a whole JPEG image.
///
/// Checks only the SOI marker at the start and the EOI marker at the end.
/// Torn MJPEG frames (a lost or interleaved fragment) usually fail one of the
/// two, which keeps them away from the real decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegFrameCheck;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Why [`JpegFrameCheck`] refused a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JpegCheckError {
    #[error("frame does not start with a JPEG SOI marker")]
    MissingStart,
    #[error("frame does not end with a JPEG EOI marker")]
    MissingEnd,
}

impl FrameDecoder for JpegFrameCheck {
    type Image = Bytes;
    type Error = JpegCheckError;

    fn decode(&mut self, encoded: &[u8]) -> Result<Bytes, JpegCheckError> {
        if !encoded.starts_with(&JPEG_SOI) {
            return Err(JpegCheckError::MissingStart);
        }
        if encoded.len() < JPEG_SOI.len() + JPEG_EOI.len() || !encoded.ends_with(&JPEG_EOI) {
            return Err(JpegCheckError::MissingEnd);
        }
        Ok(Bytes::copy_from_slice(encoded))
    }
}

/// Adapts a closure into a [`FrameDecoder`].
pub struct FnDecoder<F>(pub F);

impl<F, T, E> FrameDecoder for FnDecoder<F>
where
    F: FnMut(&[u8]) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display,
{
    type Image = T;
    type Error = E;

    fn decode(&mut self, encoded: &[u8]) -> Result<T, E> {
        (self.0)(encoded)
    }
}

impl<F> fmt::Debug for FnDecoder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDecoder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_copies_bytes() {
        let image = PassthroughDecoder.decode(b"\x01\x02\x03").unwrap();
        assert_eq!(image.as_ref(), b"\x01\x02\x03");
    }

    #[test]
    fn jpeg_check_accepts_whole_image() {
        let frame = [0xFF, 0xD8, 0x00, 0x11, 0xFF, 0xD9];
        assert_eq!(JpegFrameCheck.decode(&frame).unwrap().as_ref(), &frame);
    }

    #[test]
    fn jpeg_check_rejects_torn_frames() {
        assert_eq!(
            JpegFrameCheck.decode(&[0x00, 0xD8, 0xFF, 0xD9]).unwrap_err(),
            JpegCheckError::MissingStart
        );
        assert_eq!(
            JpegFrameCheck.decode(&[0xFF, 0xD8, 0x12, 0x34]).unwrap_err(),
            JpegCheckError::MissingEnd
        );
        assert_eq!(
            JpegFrameCheck.decode(&[0xFF, 0xD8, 0xD9]).unwrap_err(),
            JpegCheckError::MissingEnd
        );
    }

    #[test]
    fn fn_decoder_forwards_to_closure() {
        let mut decoder = FnDecoder(|bytes: &[u8]| -> Result<usize, String> {
            if bytes.is_empty() {
                Err("empty".to_string())
            } else {
                Ok(bytes.len())
            }
        });

        assert_eq!(decoder.decode(b"abc").unwrap(), 3);
        assert_eq!(decoder.decode(b"").unwrap_err(), "empty");
    }
}
