//! Metrics definitions for the relay service.
//!
//! This module defines all metrics keys used by the service and
//! provides a helper [`describe_metrics`] to set metadata for each
//! metric using the `metrics` crate.

/// Metrics key for the number of sessions currently tracked by the registry.
pub const SESSIONS_OPEN: &str = "relay.sessions.open";
/// Metrics key for sessions evicted by the idle-session reaper.
pub const SESSIONS_REAPED: &str = "relay.sessions.reaped";
/// Metrics key for bytes relayed from backend sockets to attached frontends.
pub const BYTES_BACKEND_TO_FRONTEND: &str = "relay.bytes.backend_to_frontend";
/// Metrics key for bytes relayed from frontends to backend sockets.
pub const BYTES_FRONTEND_TO_BACKEND: &str = "relay.bytes.frontend_to_backend";
/// Metrics key for frontend connections evicted via protocol-close.
pub const FRONTEND_EVICTIONS: &str = "relay.frontend.evictions";
/// Metrics key for `/proxy` requests that failed to connect to the backend.
pub const BACKEND_CONNECT_FAILURES: &str = "relay.backend.connect_failures";

/// Describe all metrics used by the service.
///
/// This calls the `describe_*` functions from the `metrics` crate to set
/// metadata on the different metrics.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        SESSIONS_OPEN,
        metrics::Unit::Count,
        "Number of sessions currently tracked by the registry"
    );

    metrics::describe_counter!(
        SESSIONS_REAPED,
        metrics::Unit::Count,
        "Number of sessions evicted by the idle-session reaper"
    );

    metrics::describe_counter!(
        BYTES_BACKEND_TO_FRONTEND,
        metrics::Unit::Bytes,
        "Bytes relayed from backend sockets to attached frontends"
    );

    metrics::describe_counter!(
        BYTES_FRONTEND_TO_BACKEND,
        metrics::Unit::Bytes,
        "Bytes relayed from frontends to backend sockets"
    );

    metrics::describe_counter!(
        FRONTEND_EVICTIONS,
        metrics::Unit::Count,
        "Number of frontend connections evicted via protocol-close"
    );

    metrics::describe_counter!(
        BACKEND_CONNECT_FAILURES,
        metrics::Unit::Count,
        "Number of /proxy requests that failed to connect to the backend"
    );
}
