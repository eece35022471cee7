#![deny(missing_docs)]
//! A roaming-tolerant relay bridging a browser-based SSH frontend to a
//! TCP SSH backend it cannot reach directly.
//!
//! A frontend that would otherwise open a raw TCP connection instead
//! issues an HTTP request ([`api::proxy`]) to obtain a [`session::Session`],
//! then maintains that session over a WebSocket ([`api::connect`])
//! carrying a custom acknowledged byte-stream framing
//! ([`relay_protocol::frame`]). When the WebSocket drops, the frontend
//! reconnects and resumes the same logical stream without loss or
//! duplication; the backend TCP connection remains intact across such
//! reconnects.
//!
//! [`run`] wires the HTTP server, the idle-session reaper, and graceful
//! shutdown together; most of the interesting behavior lives in
//! [`session`].

pub(crate) mod api;
pub mod config;
pub mod frontend;
pub mod metrics;
pub mod observability;
pub(crate) mod reaper;
pub mod session;
pub mod shutdown;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use eyre::Context as _;
use tower_http::trace::TraceLayer;

use config::RelayConfig;
use session::Registry;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Registry,
    pub(crate) config: Arc<RelayConfig>,
}

/// Build the `axum` [`Router`] serving the relay's HTTP and WebSocket
/// surface, along with the [`Registry`] backing it (exposed so a caller
/// such as the reaper or a test harness can inspect session state).
pub fn build_router(config: RelayConfig) -> (Router, Registry) {
    let registry = Registry::new();
    let state = AppState {
        registry: registry.clone(),
        config: Arc::new(config),
    };
    let router = api::routes()
        .fallback(unknown_endpoint)
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    (router, registry)
}

async fn unknown_endpoint() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Unknown endpoint")
}

/// Run the relay to completion: bind `config.bind_port`, serve HTTP and
/// WebSocket traffic, run the idle-session reaper, and shut down
/// gracefully once `shutdown_signal` resolves.
pub async fn run(
    config: RelayConfig,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    metrics::describe_metrics();

    let idle_session_timeout = config.idle_session_timeout;
    let bind_port = config.bind_port;
    let (cancellation_token, is_graceful_shutdown) = shutdown::spawn_shutdown_task(shutdown_signal);

    let (router, registry) = build_router(config);
    reaper::spawn(registry, idle_session_timeout, cancellation_token.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", bind_port))
        .await
        .with_context(|| format!("binding to 0.0.0.0:{bind_port}"))?;
    tracing::info!(bind_port, "relay listening");

    let server_cancel = cancellation_token.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
        .context("axum server error")?;

    if is_graceful_shutdown.load(std::sync::atomic::Ordering::Relaxed) {
        Ok(())
    } else {
        eyre::bail!("relay shut down unexpectedly")
    }
}
