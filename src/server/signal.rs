// Signal handling module
//
// - SIGTERM: graceful shutdown
// - SIGINT:  graceful shutdown (Ctrl+C)

use std::sync::Arc;
use tokio::sync::Notify;

use crate::logger;

/// Spawn a task that notifies `shutdown` on SIGTERM or SIGINT
#[cfg(unix)]
pub fn start_signal_handler(shutdown: Arc<Notify>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        // Ctrl+C still works when SIGTERM cannot be registered
        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                logger::log_error(&format!("Failed to register SIGTERM handler: {e}"));
                None
            }
        };

        tokio::select! {
            () = recv_sigterm(sigterm) => logger::log_info("[SIGNAL] SIGTERM received, shutting down"),
            _ = tokio::signal::ctrl_c() => logger::log_info("[SIGNAL] SIGINT received, shutting down"),
        }

        // notify_one keeps the permit if the loop is not waiting yet
        shutdown.notify_one();
    });
}

/// Resolve on the next SIGTERM, never when no handler is registered
#[cfg(unix)]
async fn recv_sigterm(sigterm: Option<tokio::signal::unix::Signal>) {
    match sigterm {
        Some(mut s) => {
            s.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Non-unix fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            logger::log_info("[SIGNAL] Ctrl+C received, shutting down");
            shutdown.notify_one();
        }
    });
}
