//! The axum-facing half of a frontend attachment: owns the actual
//! `WebSocket`, translates inbound messages into calls on
//! [`crate::session::Session`], and drains outbound
//! [`crate::session::OutboundMessage`]s onto the wire.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::{FrameOutcome, OutboundMessage, Session, encode_protocol_close};

/// Drive one adopted WebSocket connection until it, or the session it is
/// attached to, closes. Returns once the socket is done with — the
/// caller has nothing further to do.
pub async fn run(
    ws: WebSocket,
    session: Arc<Session>,
    attachment_id: u64,
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(OutboundMessage::Frame(bytes)) => {
                        if sink.send(Message::Binary(Bytes::from(bytes))).await.is_err() {
                            session.detach(attachment_id);
                            break;
                        }
                    }
                    Some(OutboundMessage::Close) => {
                        let _ = sink.send(Message::Binary(Bytes::from(encode_protocol_close()))).await;
                        let _ = sink.close().await;
                        session.detach(attachment_id);
                        break;
                    }
                    None => {
                        // The session dropped its sender, which only happens
                        // once `detach` has already run for this attachment.
                        break;
                    }
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Binary(bytes))) => {
                        let frame = match relay_protocol::decode_frame(bytes) {
                            Ok(frame) => frame,
                            Err(err) => {
                                debug!(session_id = %session.id, %err, "dropping undecodable frontend frame");
                                send_protocol_close(&mut sink).await;
                                session.detach(attachment_id);
                                break;
                            }
                        };
                        if session.on_frontend_frame(attachment_id, frame).await == FrameOutcome::Reject {
                            send_protocol_close(&mut sink).await;
                            session.detach(attachment_id);
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_))) => {
                        warn!(session_id = %session.id, "rejecting text frame from frontend");
                        send_protocol_close(&mut sink).await;
                        session.detach(attachment_id);
                        break;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        session.detach(attachment_id);
                        break;
                    }
                    Some(Err(err)) => {
                        debug!(session_id = %session.id, %err, "frontend socket error");
                        session.detach(attachment_id);
                        break;
                    }
                }
            }
        }
    }
}

async fn send_protocol_close(sink: &mut SplitSink<WebSocket, Message>) {
    let _ = sink
        .send(Message::Binary(Bytes::from(encode_protocol_close())))
        .await;
    let _ = sink.close().await;
}
