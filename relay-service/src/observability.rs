//! Tracing setup built directly on `tracing-subscriber`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Installs a global `tracing` subscriber: an `EnvFilter` seeded from
/// `default_directives` and overridable via `RUST_LOG`, plus formatted
/// output to stdout.
pub fn install_tracing(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
