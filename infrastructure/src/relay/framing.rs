//! Length-prefixed framing codec
//!
//! Wire format: `u32` little-endian payload length, then exactly that many
//! UTF-8 payload bytes. No payload may be interpreted before its full
//! length has been buffered, and a single read may complete zero, one, or
//! many frames — [`extract_frames`] drains everything that is complete and
//! leaves the remainder in the buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the length header.
pub const HEADER_LEN: usize = 4;

/// Sanity bound on a single frame; a larger announced length means the
/// stream has desynchronized.
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

/// Error type for frame extraction
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    FrameTooLarge(usize),
}

/// Wrap a payload with a freshly computed length header.
pub fn encode_frame(payload: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(payload);
    frame
}

/// Drain every complete frame from the front of `buffer`.
///
/// Incomplete trailing data (a partial header, or a header whose payload
/// has not fully arrived) stays in the buffer for the next read.
pub fn extract_frames(buffer: &mut BytesMut) -> Result<Vec<Bytes>, FramingError> {
    let mut frames = Vec::new();
    loop {
        if buffer.len() < HEADER_LEN {
            break;
        }
        let len = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FramingError::FrameTooLarge(len));
        }
        if buffer.len() < HEADER_LEN + len {
            break;
        }
        buffer.advance(HEADER_LEN);
        frames.push(buffer.split_to(len).freeze());
    }
    Ok(frames)
}
