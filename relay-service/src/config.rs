//! Process configuration.
//!
//! The binary's invocation is positional (`<bin> <bind-port>
//! [external-redirect]`); the remaining tuning knobs are
//! environment-backed.

use std::time::Duration;

use clap::Parser;

fn parse_duration(raw: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(raw)
}

/// Configuration for the relay service.
#[derive(Debug, Clone, Parser)]
#[command(name = "relay-service", version, about = "Roaming-tolerant SSH relay")]
pub struct RelayConfig {
    /// Port to listen on for HTTP and WebSocket traffic.
    pub bind_port: u16,

    /// Host to substitute into `/cookie` redirects instead of the
    /// request's `Host` header. Absent by default.
    pub external_redirect: Option<String>,

    /// Maximum inbound WebSocket message size, in bytes.
    #[arg(long, env = "RELAY_WS_MAX_MESSAGE_SIZE", default_value_t = 16 * 1024 * 1024)]
    pub ws_max_message_size: usize,

    /// How long a session may go without ever being attached by
    /// `/connect` before the idle-session reaper evicts it. Does not
    /// apply to a session that attached once and later lost its
    /// frontend — only to one `/proxy` created that no `/connect` ever
    /// claimed.
    #[arg(
        long,
        env = "RELAY_IDLE_SESSION_TIMEOUT",
        default_value = "5min",
        value_parser = parse_duration
    )]
    pub idle_session_timeout: Duration,
}
