//! Signal handling for graceful shutdown.

use tracing::{info, warn};

/// Wait for SIGINT, SIGTERM or SIGQUIT.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm, mut sigquit) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    ) {
        (Ok(i), Ok(t), Ok(q)) => (i, t, q),
        (i, t, q) => {
            let err = [i.err(), t.err(), q.err()].into_iter().flatten().next();
            warn!(error = ?err, "Failed to install signal handlers, falling back to Ctrl-C");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!(signal = "SIGINT", "Signal received"),
        _ = sigterm.recv() => info!(signal = "SIGTERM", "Signal received"),
        _ = sigquit.recv() => info!(signal = "SIGQUIT", "Signal received"),
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(signal = "SIGINT", "Signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C; shutdown only via token");
            std::future::pending::<()>().await
        }
    }
}
