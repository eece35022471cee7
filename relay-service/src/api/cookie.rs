//! `GET /cookie?ext=<id>&path=<p>` — the relay-selection redirect.
//!
//! Unguarded by design: this endpoint exists purely to hand the
//! chrome-extension frontend back a deep link naming which relay host
//! it should now talk to.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use super::errors::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct CookieParams {
    ext: Option<String>,
    path: Option<String>,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/cookie", get(cookie))
}

async fn cookie(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CookieParams>,
) -> Response {
    match handle(state, &headers, params) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

fn handle(state: AppState, headers: &HeaderMap, params: CookieParams) -> Result<Response, ApiError> {
    let ext = params.ext.filter(|s| !s.is_empty()).ok_or(ApiError::MissingParam("ext"))?;
    let path = params.path.filter(|s| !s.is_empty()).ok_or(ApiError::MissingParam("path"))?;

    let host = match &state.config.external_redirect {
        Some(override_host) => override_host.clone(),
        None => headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or(ApiError::MissingParam("host"))?,
    };

    let location = format!("chrome-extension://{ext}/{path}#ignored@{host}");
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, location)],
    )
        .into_response())
}
