//! HTTP-facing errors for `/cookie` and `/proxy`.
//!
//! These never touch an attached WebSocket; they are turned directly
//! into HTTP responses via [`axum::response::IntoResponse`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors surfaced by the HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("missing required query parameter {0:?}")]
    MissingParam(&'static str),
    #[error("invalid value for query parameter {0:?}")]
    InvalidParam(&'static str),
    #[error("could not connect to backend: {0}")]
    BackendConnect(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::MissingParam(_) | ApiError::InvalidParam(_) => StatusCode::BAD_REQUEST,
            ApiError::BackendConnect(_) => StatusCode::BAD_GATEWAY,
        };
        tracing::debug!(error = %self, "rejecting request");
        (status, self.to_string()).into_response()
    }
}
