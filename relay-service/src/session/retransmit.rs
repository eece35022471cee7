//! The backend→frontend retransmission buffer.
//!
//! Logically a sliding window over the backend→frontend stream: it holds
//! exactly the suffix `[right_edge - len, right_edge)`, where `right_edge`
//! is the caller's `backend_bytes_read`. The buffer itself does not track
//! `right_edge` — callers pass it into every operation that needs it,
//! since it lives alongside the buffer in [`super::SessionState`].

use thiserror::Error;

/// An ack value that cannot be honored against the current buffer state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkError {
    /// The peer claims to have received bytes the relay never sent.
    #[error("ack {ack} is ahead of backend_bytes_read {backend_bytes_read}")]
    AckAheadOfStream {
        /// The peer-supplied ack value.
        ack: i64,
        /// The relay's current backend_bytes_read position.
        backend_bytes_read: u64,
    },
    /// The peer acks something already discarded (below the buffer's left edge).
    #[error("ack {ack} is below the buffer's left edge {left_edge}")]
    AckBelowLeftEdge {
        /// The peer-supplied ack value.
        ack: i64,
        /// The buffer's current left edge.
        left_edge: u64,
    },
}

/// Bounded, append-only byte buffer trimmed from the front by peer acks.
#[derive(Debug, Default, Clone)]
pub struct RetransmitBuffer {
    buf: Vec<u8>,
}

impl RetransmitBuffer {
    /// A new, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if no bytes are currently held.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Absolute offset of the first byte still held.
    pub fn left_edge(&self, backend_bytes_read: u64) -> u64 {
        backend_bytes_read - self.buf.len() as u64
    }

    /// The full contents, in stream order.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Extend the buffer with freshly-read backend bytes. The caller
    /// separately advances `backend_bytes_read` to match.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Retain only the suffix covering `[ack, backend_bytes_read)`.
    ///
    /// `ack` is signed because it is taken directly from the wire's
    /// signed ack field; any negative value is necessarily below the
    /// buffer's (non-negative) left edge and is rejected as such.
    pub fn trim_to_ack(&mut self, ack: i64, backend_bytes_read: u64) -> Result<(), ShrinkError> {
        if ack > backend_bytes_read as i64 {
            return Err(ShrinkError::AckAheadOfStream {
                ack,
                backend_bytes_read,
            });
        }
        let left_edge = self.left_edge(backend_bytes_read);
        if ack < left_edge as i64 {
            return Err(ShrinkError::AckBelowLeftEdge { ack, left_edge });
        }
        // ack == backend_bytes_read yields an empty buffer: keep == 0 here
        // drains the whole buffer rather than degenerating into "keep
        // everything", which a naive take-last-N-where-N=0 could do.
        let keep = (backend_bytes_read as i64 - ack) as usize;
        let drop = self.buf.len() - keep;
        self.buf.drain(..drop);
        Ok(())
    }

    /// Returns the suffix starting at the absolute `offset`.
    ///
    /// Precondition: `offset >= backend_bytes_read - len()`. Callers in
    /// this crate only ever call this right after a successful
    /// [`Self::trim_to_ack`] to the same offset, so the precondition
    /// always holds by construction.
    pub fn tail_from_offset(&self, offset: u64, backend_bytes_read: u64) -> &[u8] {
        let left_edge = self.left_edge(backend_bytes_read);
        let skip = (offset - left_edge) as usize;
        &self.buf[skip..]
    }
}
