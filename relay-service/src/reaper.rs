//! Idle-session reaper.
//!
//! Evicts sessions that were created by `/proxy` but never attached by
//! `/connect` within `idle_session_timeout`, so a frontend that never
//! shows up doesn't leak a registry entry and a backend connection
//! forever.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::session::Registry;

/// Spawn the reaper's sweep loop. Runs until `cancel` fires.
pub(crate) fn spawn(registry: Registry, idle_session_timeout: Duration, cancel: CancellationToken) {
    let sweep_interval = (idle_session_timeout / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => sweep(&registry, idle_session_timeout),
            }
        }
    });
}

fn sweep(registry: &Registry, idle_session_timeout: Duration) {
    for session in registry.snapshot() {
        if !session.ever_attached() && session.idle_for() > idle_session_timeout {
            tracing::info!(session_id = %session.id, "reaping session never attached by /connect");
            metrics::counter!(crate::metrics::SESSIONS_REAPED).increment(1);
            session.force_close();
        }
    }
}
