//! Graceful shutdown plumbing: a future that resolves on Ctrl-C/SIGTERM,
//! and a task that turns that into a [`CancellationToken`] plus a flag
//! distinguishing a clean shutdown from an internal task failing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Resolves on Ctrl-C, or on Unix, SIGTERM.
pub async fn default_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Spawns a task that cancels the returned token once `shutdown_signal`
/// resolves, setting the returned flag to `true` to mark that this was
/// an expected shutdown rather than e.g. the server task dying.
pub fn spawn_shutdown_task(
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> (CancellationToken, Arc<AtomicBool>) {
    let token = CancellationToken::new();
    let is_graceful_shutdown = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let token = token.clone();
        let is_graceful_shutdown = Arc::clone(&is_graceful_shutdown);
        async move {
            shutdown_signal.await;
            is_graceful_shutdown.store(true, Ordering::Relaxed);
            token.cancel();
        }
    });
    (token, is_graceful_shutdown)
}
