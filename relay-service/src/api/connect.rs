//! `GET /connect?sid=&ack=&pos=` — WebSocket upgrade and adoption.
//!
//! The upgrade is always accepted: the frontend retries indefinitely on
//! a rejected upgrade, so invalid requests are instead handed a
//! protocol-close inside an accepted session.

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::session::{AdoptOutcome, Session, encode_protocol_close};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectParams {
    sid: Option<String>,
    ack: Option<String>,
    pos: Option<String>,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/connect", get(connect))
}

/// A resolved adoption target: the session to adopt into plus the
/// parsed `ack`/`pos` from the query string. `None` covers every
/// rejection case (missing/unknown sid, unparseable ack/pos).
fn resolve_target(state: &AppState, params: &ConnectParams) -> Option<(Arc<Session>, u64, u64)> {
    let sid = params.sid.as_deref()?;
    let sid = Uuid::parse_str(sid).ok()?;
    let ack: u64 = params.ack.as_deref()?.parse().ok()?;
    let pos: u64 = params.pos.as_deref()?.parse().ok()?;
    let session = state.registry.get(&sid)?;
    Some((session, ack, pos))
}

async fn connect(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let ws = ws.max_message_size(state.config.ws_max_message_size);
    let target = resolve_target(&state, &params);

    ws.on_upgrade(move |socket| async move {
        match target {
            Some((session, ack, pos)) => match session.begin_adopt(ack, pos) {
                AdoptOutcome::Attached { rx, attachment_id } => {
                    crate::frontend::run(socket, session, attachment_id, rx).await;
                }
                AdoptOutcome::Rejected => reject(socket).await,
            },
            None => reject(socket).await,
        }
    })
}

async fn reject(mut socket: WebSocket) {
    use futures::SinkExt as _;
    let _ = socket
        .send(Message::Binary(Bytes::from(encode_protocol_close())))
        .await;
    let _ = socket.close().await;
}
