//! The `/connect` binary frame format.
//!
//! ```text
//!  offset  size  field
//!  0       4     ack (int32, big-endian, two's complement)
//!  4       *     payload (opaque bytes; forwarded verbatim)
//! ```
//!
//! The ack is a cumulative absolute offset in the peer's outbound stream.
//! A payload of length zero is a pure ack ("friendly" keepalive). An ack
//! of `-1` is the sentinel the relay sends to evict a frontend and
//! terminate the protocol for a session; the underlying WebSocket is
//! closed immediately after.

use bytes::Bytes;

/// Sentinel ack value meaning "session closed by sender".
pub const CLOSE_ACK: i32 = -1;

const HEADER_LEN: usize = 4;

/// A decoded `/connect` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Cumulative absolute offset in the peer's outbound stream, or
    /// [`CLOSE_ACK`].
    pub ack: i32,
    /// Opaque payload, forwarded verbatim.
    pub payload: Bytes,
}

impl Frame {
    /// True if this frame is the relay's protocol-close sentinel.
    pub fn is_close(&self) -> bool {
        self.ack == CLOSE_ACK
    }
}

/// Errors that can occur while decoding a `/connect` binary frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// The frame was shorter than the 4-byte ack header.
    #[error("frame shorter than the 4-byte ack header (got {0} bytes)")]
    TooShort(usize),
}

/// Decode a binary WebSocket message into a [`Frame`].
///
/// `bytes` must be at least [`HEADER_LEN`] long; shorter frames are a
/// protocol error the caller should turn into a protocol-close.
pub fn decode_frame(bytes: Bytes) -> Result<Frame, FrameError> {
    if bytes.len() < HEADER_LEN {
        return Err(FrameError::TooShort(bytes.len()));
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    let ack = i32::from_be_bytes(header);
    let payload = bytes.slice(HEADER_LEN..);
    Ok(Frame { ack, payload })
}

/// Encode an ack plus payload into the binary wire format.
pub fn encode_frame(ack: i32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&ack.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Truncate an absolute 64-bit stream offset to the wire's signed 32-bit
/// ack field.
///
/// Internal counters are conceptually unbounded; only the wire
/// representation is a signed `i32`. This is a plain reinterpreting
/// cast, not a saturating or checked conversion.
pub fn truncate_ack(value: u64) -> i32 {
    value as i32
}
