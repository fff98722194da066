//! Process shutdown plumbing
//!
//! One `watch::Sender<bool>` is owned by `main`; every long-running task holds
//! a receiver and races its suspension points against [`cancelled`].

use tokio::sync::watch;

pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// Resolves once shutdown has been requested or the sender is gone.
pub async fn cancelled(shutdown: &mut ShutdownReceiver) {
    // Err means the sender was dropped, which is treated as shutdown too
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub fn is_cancelled(shutdown: &ShutdownReceiver) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
