//! `GET /proxy?host=<h>&port=<p>` — create a Session.
//!
//! Opens the backend TCP connection synchronously within the request;
//! on success, registers the Session and replies with its id. CORS
//! mirrors the request's `Origin` because the frontend is served from a
//! chrome-extension origin that isn't known ahead of time.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

use super::errors::ApiError;
use crate::AppState;
use crate::session::Session;

#[derive(Debug, Deserialize)]
pub(crate) struct ProxyParams {
    host: Option<String>,
    port: Option<u16>,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/proxy", get(proxy)).layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_credentials(true),
    )
}

async fn proxy(State(state): State<AppState>, Query(params): Query<ProxyParams>) -> Response {
    match handle(state, params).await {
        Ok(id) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], id.to_string()).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle(state: AppState, params: ProxyParams) -> Result<Uuid, ApiError> {
    let host = params.host.filter(|s| !s.is_empty()).ok_or(ApiError::MissingParam("host"))?;
    let port = params.port.ok_or(ApiError::MissingParam("port"))?;

    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(err) => {
            metrics::counter!(crate::metrics::BACKEND_CONNECT_FAILURES).increment(1);
            tracing::warn!(%host, port, error = %err, "backend connect failed");
            return Err(ApiError::BackendConnect(err));
        }
    };

    let (read_half, write_half) = stream.into_split();
    let id = Uuid::new_v4();
    let session = Session::new(id, write_half, state.registry.clone());
    session.spawn_backend_pump(read_half);
    state.registry.insert(session);

    tracing::info!(session_id = %id, %host, port, "session created");
    Ok(id)
}
