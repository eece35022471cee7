//! Wire types shared between the relay's HTTP/WebSocket surface and the
//! session layer: the binary frame format carried on `/connect` and the
//! ack sentinel used to signal a relay-initiated protocol close.
//!
//! Kept as its own crate, separate from `relay-service`, so the framing
//! logic can be unit tested without pulling in axum or tokio.

pub mod frame;

pub use frame::{CLOSE_ACK, Frame, FrameError, decode_frame, encode_frame, truncate_ack};
