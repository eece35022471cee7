//! The session layer: owns one backend TCP socket, the two directional
//! stream offsets, the backend→frontend retransmission buffer, and at
//! most one attached frontend WebSocket connection.
//!
//! This module is deliberately transport-agnostic — it knows nothing
//! about axum or `WebSocketUpgrade`. The HTTP/WS-facing layer in
//! [`crate::frontend`] and [`crate::api::connect`] drives it by calling
//! [`Session::begin_adopt`], [`Session::on_frontend_frame`], and
//! [`Session::detach`], and owns the actual socket I/O.

pub mod registry;
pub mod retransmit;

use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(test)]
use bytes::Bytes;
use parking_lot::Mutex;
use relay_protocol::{CLOSE_ACK, encode_frame, truncate_ack};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub use registry::Registry;
use retransmit::RetransmitBuffer;

/// Above this many bytes of apparent frontend lag, the relay ships an
/// empty-payload frame so the peer learns of the relay's progress
/// without waiting for backend data. Kept verbatim from the reference:
/// the comparison is signed and is simply false when the frontend's
/// `pos` is ahead of `backend_bytes_written`.
const FRIENDLY_RELEASE_THRESHOLD: i64 = 1024 * 1024;

/// A message queued for delivery to the currently attached frontend.
pub enum OutboundMessage {
    /// An already wire-encoded frame (ack header + payload).
    Frame(Vec<u8>),
    /// Evict this frontend: send the `-1` ack sentinel, then close.
    Close,
}

struct FrontendHandle {
    /// Absolute offset in the frontend→backend stream of the next byte
    /// this frontend will send.
    pos: u64,
    /// Identifies this particular attachment so a stale close event for
    /// an already-evicted frontend cannot clear a newer one.
    attachment_id: u64,
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

struct SessionState {
    backend_bytes_written: u64,
    backend_bytes_read: u64,
    b2f_unacked: RetransmitBuffer,
    frontend: Option<FrontendHandle>,
    next_attachment_id: u64,
    ever_attached: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            backend_bytes_written: 0,
            backend_bytes_read: 0,
            b2f_unacked: RetransmitBuffer::new(),
            frontend: None,
            next_attachment_id: 0,
            ever_attached: false,
        }
    }
}

/// Outcome of [`Session::begin_adopt`].
pub enum AdoptOutcome {
    /// `pos` skipped bytes the relay never received, or `ack` failed the
    /// shrink rules. The caller must protocol-close the new connection
    /// and must not attach it.
    Rejected,
    /// The new frontend is installed. The caller owns `rx` for the
    /// lifetime of this attachment and must tag every subsequent call
    /// into the session with `attachment_id`.
    Attached {
        /// Receiver for outbound messages the caller must forward to the new frontend connection.
        rx: mpsc::UnboundedReceiver<OutboundMessage>,
        /// Identifier the caller must tag every subsequent call into the session with.
        attachment_id: u64,
    },
}

/// Result of processing one inbound frontend→relay frame.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep the connection open.
    Continue,
    /// The frame violated the protocol (bad ack). Caller must
    /// protocol-close this frontend and detach it.
    Reject,
}

/// One logical session: a backend TCP socket plus a sequence of frontend
/// WebSocket attachments sharing the same id.
pub struct Session {
    /// Random session identifier, handed out by `/proxy`.
    pub id: Uuid,
    backend_write: AsyncMutex<OwnedWriteHalf>,
    state: Mutex<SessionState>,
    registry: Registry,
    created_at: Instant,
    cancel: CancellationToken,
}

impl Session {
    /// Construct a new session around an already-connected backend
    /// socket. Does not insert into `registry` or start the backend
    /// pump — callers do that once they decide the connection is usable
    /// (see `api::proxy`).
    pub fn new(id: Uuid, backend_write: OwnedWriteHalf, registry: Registry) -> Arc<Self> {
        Arc::new(Self {
            id,
            backend_write: AsyncMutex::new(backend_write),
            state: Mutex::new(SessionState::new()),
            registry,
            created_at: Instant::now(),
            cancel: CancellationToken::new(),
        })
    }

    /// How long ago this session was created.
    pub fn idle_for(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether a frontend has ever successfully attached.
    pub fn ever_attached(&self) -> bool {
        self.state.lock().ever_attached
    }

    /// Forcibly tear the session down, as if the backend socket had
    /// closed. Used by the idle-session reaper.
    pub fn force_close(&self) {
        self.cancel.cancel();
    }

    /// Spawn the task that pumps bytes from the backend socket into the
    /// session (component C's "on any data received from backend" and
    /// "on backend close" behavior).
    pub fn spawn_backend_pump(self: &Arc<Self>, mut backend_read: OwnedReadHalf) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                tokio::select! {
                    () = session.cancel.cancelled() => break,
                    result = backend_read.read(&mut buf) => {
                        match result {
                            Ok(0) => break,
                            Ok(n) => session.on_backend_data(&buf[..n]),
                            Err(err) => {
                                debug!(session_id = %session.id, error = %err, "backend read error");
                                break;
                            }
                        }
                    }
                }
            }
            session.on_backend_close().await;
        });
    }

    /// Bytes arrived from the backend: append to the unacked buffer,
    /// advance `backend_bytes_read`, and if a frontend is attached, ship
    /// a frame.
    fn on_backend_data(&self, data: &[u8]) {
        metrics::counter!(crate::metrics::BYTES_BACKEND_TO_FRONTEND).increment(data.len() as u64);
        let mut state = self.state.lock();
        state.b2f_unacked.append(data);
        state.backend_bytes_read += data.len() as u64;
        if let Some(frontend) = &state.frontend {
            let ack = truncate_ack(state.backend_bytes_written.min(frontend.pos));
            let _ = frontend.tx.send(OutboundMessage::Frame(encode_frame(ack, data)));
        }
    }

    /// The backend socket closed, cleanly or with an error: remove the
    /// session from the registry and evict any attached frontend.
    /// Idempotent — safe to call more than once for the same session.
    #[instrument(level = "debug", skip(self), fields(session_id = %self.id))]
    pub async fn on_backend_close(self: &Arc<Self>) {
        self.registry.remove(&self.id);
        let evicted = {
            let mut state = self.state.lock();
            state.frontend.take()
        };
        if let Some(frontend) = evicted {
            metrics::counter!(crate::metrics::FRONTEND_EVICTIONS).increment(1);
            let _ = frontend.tx.send(OutboundMessage::Close);
        }
    }

    /// Run the adoption protocol for a `/connect` attempt with the given
    /// `ack`/`pos`.
    #[instrument(level = "debug", skip(self), fields(session_id = %self.id, ack, pos))]
    pub fn begin_adopt(self: &Arc<Self>, ack: u64, pos: u64) -> AdoptOutcome {
        let mut state = self.state.lock();

        // 1. Evict any prior frontend unconditionally. We don't clear
        //    the reference here — only after a new one is installed, so
        //    that a close event racing in for the prior attachment
        //    cannot nil out whatever we install below.
        if let Some(prior) = &state.frontend {
            metrics::counter!(crate::metrics::FRONTEND_EVICTIONS).increment(1);
            let _ = prior.tx.send(OutboundMessage::Close);
        }

        // 2. `pos` ahead of what the relay ever received is fatal.
        if pos > state.backend_bytes_written {
            warn!(session_id = %self.id, pos, backend_bytes_written = state.backend_bytes_written, "adopt rejected: pos ahead of backend_bytes_written");
            return AdoptOutcome::Rejected;
        }

        // 3. Shrink the buffer to the peer's ack.
        let backend_bytes_read = state.backend_bytes_read;
        if let Err(err) = state.b2f_unacked.trim_to_ack(ack as i64, backend_bytes_read) {
            warn!(session_id = %self.id, %err, "adopt rejected: ack failed shrink rules");
            return AdoptOutcome::Rejected;
        }

        // 4 + 5. Install the new frontend and enqueue the resume
        // transmission before releasing the lock, so no backend data
        // arriving concurrently can be shipped ahead of it.
        let attachment_id = state.next_attachment_id;
        state.next_attachment_id += 1;
        state.ever_attached = true;

        let (tx, rx) = mpsc::unbounded_channel();
        let resume_ack = truncate_ack(state.backend_bytes_written.min(pos));
        let resume = encode_frame(resume_ack, state.b2f_unacked.as_slice());
        let _ = tx.send(OutboundMessage::Frame(resume));

        state.frontend = Some(FrontendHandle {
            pos,
            attachment_id,
            tx,
        });

        AdoptOutcome::Attached { rx, attachment_id }
    }

    /// Process one inbound binary frame from the currently attached
    /// frontend: advance the stream position, forward newly-seen bytes
    /// to the backend, and apply the ack's shrink rules to the
    /// retransmit buffer.
    pub async fn on_frontend_frame(self: &Arc<Self>, attachment_id: u64, frame: relay_protocol::Frame) -> FrameOutcome {
        let (unseen, ack_ok) = {
            let mut state = self.state.lock();
            let Some(frontend) = state.frontend.as_mut() else {
                return FrameOutcome::Reject;
            };
            if frontend.attachment_id != attachment_id {
                // A stale frame from an already-evicted attachment; the
                // eviction message is already queued for it.
                return FrameOutcome::Continue;
            }

            frontend.pos += frame.payload.len() as u64;
            let overlap = frontend.pos as i64 - state.backend_bytes_written as i64;
            let unseen_len = overlap.max(0) as usize;
            let start = frame.payload.len() - unseen_len;
            let unseen = frame.payload.slice(start..);
            state.backend_bytes_written += unseen.len() as u64;

            // The ack only governs how much of `b2f_unacked` can be
            // dropped; it is independent of forwarding `unseen` to the
            // backend below, so a bad ack must not skip that write —
            // those bytes would otherwise be lost with no way for any
            // later reattachment to recover them.
            let backend_bytes_read = state.backend_bytes_read;
            let ack_ok = state
                .b2f_unacked
                .trim_to_ack(frame.ack as i64, backend_bytes_read)
                .is_ok();

            if ack_ok {
                let frontend = state.frontend.as_ref().expect("checked above");
                if state.backend_bytes_written as i64 - frontend.pos as i64 > FRIENDLY_RELEASE_THRESHOLD {
                    let ack = truncate_ack(state.backend_bytes_written.min(frontend.pos));
                    let _ = frontend.tx.send(OutboundMessage::Frame(encode_frame(ack, &[])));
                }
            }

            (unseen, ack_ok)
        };

        if !unseen.is_empty() {
            metrics::counter!(crate::metrics::BYTES_FRONTEND_TO_BACKEND).increment(unseen.len() as u64);
            let mut write_half = self.backend_write.lock().await;
            if write_half.write_all(&unseen).await.is_err() {
                drop(write_half);
                // Backend I/O error is terminal for the whole session,
                // not just this frontend.
                self.on_backend_close().await;
                return FrameOutcome::Continue;
            }
        }

        // A bad ack is a frontend-side protocol error: it evicts this
        // attachment, but the backend connection and its data stay
        // intact.
        if ack_ok { FrameOutcome::Continue } else { FrameOutcome::Reject }
    }

    /// Clear the attached frontend if, and only if, `attachment_id`
    /// still identifies the currently attached one. Guards against a
    /// close event for an evicted frontend clobbering a newer
    /// attachment.
    pub fn detach(&self, attachment_id: u64) {
        let mut state = self.state.lock();
        if matches!(&state.frontend, Some(fh) if fh.attachment_id == attachment_id) {
            state.frontend = None;
        }
    }
}

/// Encode the relay's protocol-close sentinel: ack = -1, empty payload.
pub fn encode_protocol_close() -> Vec<u8> {
    encode_frame(CLOSE_ACK, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ack: i32, payload: &[u8]) -> relay_protocol::Frame {
        relay_protocol::Frame {
            ack,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[tokio::test]
    async fn adopt_pos_ahead_of_backend_bytes_written_is_rejected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let _server_side = accept.await.unwrap();
        let (_read, write) = client.into_split();
        let registry = Registry::new();
        let session = Session::new(Uuid::new_v4(), write, registry);

        match session.begin_adopt(0, 100) {
            AdoptOutcome::Rejected => {}
            AdoptOutcome::Attached { .. } => panic!("expected rejection"),
        }
        assert!(!session.ever_attached());
    }

    #[tokio::test]
    async fn happy_path_resume_then_forward_to_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let server_side = accept.await.unwrap();
        let (_client_read, client_write) = client.into_split();
        let registry = Registry::new();
        let session = Session::new(Uuid::new_v4(), client_write, registry);

        // Simulate "backend produced 5 bytes" directly.
        session.on_backend_data(b"hello");

        let (mut rx, attachment_id) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("expected attach"),
        };

        match rx.try_recv().unwrap() {
            OutboundMessage::Frame(bytes) => {
                let decoded = relay_protocol::decode_frame(Bytes::from(bytes)).unwrap();
                assert_eq!(decoded.ack, 0);
                assert_eq!(&decoded.payload[..], b"hello");
            }
            OutboundMessage::Close => panic!("expected frame"),
        }

        // Frontend sends "ls\n" acking all 5 bytes.
        let outcome = session
            .on_frontend_frame(attachment_id, frame(5, b"ls\n"))
            .await;
        assert_eq!(outcome, FrameOutcome::Continue);

        drop(server_side);
    }

    #[tokio::test]
    async fn resume_skipping_acked_sends_only_unacked_suffix() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let _server_side = accept.await.unwrap();
        let (_r, w) = client.into_split();
        let session = Session::new(Uuid::new_v4(), w, Registry::new());

        session.on_backend_data(b"abcdef");
        match session.begin_adopt(4, 0) {
            AdoptOutcome::Attached { mut rx, .. } => match rx.try_recv().unwrap() {
                OutboundMessage::Frame(bytes) => {
                    let decoded = relay_protocol::decode_frame(Bytes::from(bytes)).unwrap();
                    assert_eq!(decoded.ack, 0);
                    assert_eq!(&decoded.payload[..], b"ef");
                }
                OutboundMessage::Close => panic!("expected frame"),
            },
            AdoptOutcome::Rejected => panic!("expected attach"),
        }
    }

    #[tokio::test]
    async fn frontend_overlap_on_resume_writes_only_new_bytes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut server_side = accept.await.unwrap();
        let (_r, w) = client.into_split();
        let session = Session::new(Uuid::new_v4(), w, Registry::new());

        let (_rx, attachment_id) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("expected attach"),
        };
        // The frontend sends "abcd"; the relay records backend_bytes_written = 4.
        session
            .on_frontend_frame(attachment_id, frame(0, b"abcd"))
            .await;

        // The frontend roams to a new connection and resends "abcdXY"
        // from pos=0 (it never heard back after sending "abcd").
        let (mut _rx2, attachment_id2) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("second adopt should attach"),
        };
        session
            .on_frontend_frame(attachment_id2, frame(0, b"abcdXY"))
            .await;

        let mut buf = [0u8; 2];
        use tokio::io::AsyncReadExt as _;
        server_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"XY");
    }

    /// The friendly-release condition is `backend_bytes_written -
    /// frontend.pos > 1 MiB`, and `backend_bytes_written` only ever
    /// advances by the *unseen* part of a frontend frame, so it can
    /// only exceed `frontend.pos` right after a frontend reattaches at
    /// an old `pos` and resends a short, entirely-overlapped frame
    /// against a stream the relay had already advanced far past.
    #[tokio::test]
    async fn friendly_release_fires_when_written_outpaces_a_stale_resend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let _server_side = accept.await.unwrap();
        let (_r, w) = client.into_split();
        let session = Session::new(Uuid::new_v4(), w, Registry::new());

        let (_rx1, attachment_id1) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("expected attach"),
        };
        let big = vec![0u8; 2 * FRIENDLY_RELEASE_THRESHOLD as usize];
        session
            .on_frontend_frame(attachment_id1, frame(0, &big))
            .await;

        // Reattach claiming pos=0 again and resend a short frame that's
        // entirely within the already-written window.
        let (mut rx2, attachment_id2) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("expected attach"),
        };
        session
            .on_frontend_frame(attachment_id2, frame(0, b"0123456789"))
            .await;

        let mut saw_friendly_frame = false;
        while let Ok(outbound) = rx2.try_recv() {
            if let OutboundMessage::Frame(bytes) = outbound {
                let decoded = relay_protocol::decode_frame(Bytes::from(bytes)).unwrap();
                if decoded.payload.is_empty() && decoded.ack == 10 {
                    saw_friendly_frame = true;
                }
            }
        }
        assert!(saw_friendly_frame, "expected a friendly-release frame with ack=10");
    }

    #[tokio::test]
    async fn ack_above_backend_bytes_read_is_rejected_and_session_survives() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut server_side = accept.await.unwrap();
        let (_r, w) = client.into_split();
        let session = Session::new(Uuid::new_v4(), w, Registry::new());

        let (_rx, attachment_id) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("expected attach"),
        };

        let outcome = session
            .on_frontend_frame(attachment_id, frame(999, b"x"))
            .await;
        assert_eq!(outcome, FrameOutcome::Reject);

        // The bad ack evicts the frontend, but the payload must still
        // reach the backend — a frontend-side protocol error is not
        // license to drop data the frontend already sent.
        let mut buf = [0u8; 1];
        server_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"x");

        // A fresh attachment can still recover the session.
        match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { .. } => {}
            AdoptOutcome::Rejected => panic!("backend-side state must survive a frontend protocol error"),
        }
    }

    #[tokio::test]
    async fn stale_attachment_frame_is_ignored_not_rejected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let _server_side = accept.await.unwrap();
        let (_r, w) = client.into_split();
        let session = Session::new(Uuid::new_v4(), w, Registry::new());

        let (_rx1, attachment_id1) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("expected attach"),
        };
        // A second adoption evicts the first.
        let (_rx2, _attachment_id2) = match session.begin_adopt(0, 0) {
            AdoptOutcome::Attached { rx, attachment_id } => (rx, attachment_id),
            AdoptOutcome::Rejected => panic!("expected attach"),
        };

        // A frame tagged with the now-stale first attachment id must not
        // be treated as a protocol error against the live attachment.
        let outcome = session
            .on_frontend_frame(attachment_id1, frame(0, b"late"))
            .await;
        assert_eq!(outcome, FrameOutcome::Continue);
    }
}
