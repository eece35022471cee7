//! HTTP surface of the relay.
//!
//! Organizes the endpoints into one module each:
//!
//! - [`cookie`] – `/cookie`, the relay-selection redirect.
//! - [`proxy`] – `/proxy`, Session creation.
//! - [`connect`] – `/connect`, WebSocket upgrade and adoption.
//! - [`errors`] – shared HTTP error type.

pub(crate) mod connect;
pub(crate) mod cookie;
pub(crate) mod errors;
pub(crate) mod proxy;

use axum::Router;

use crate::AppState;

/// All HTTP routes the relay serves.
pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .merge(cookie::routes())
        .merge(proxy::routes())
        .merge(connect::routes())
}
