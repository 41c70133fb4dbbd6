//! Graceful shutdown and signal handling.

use std::time::Duration;

/// How long in-flight requests may drain before the process is forced down.
pub const FORCED_SHUTDOWN_AFTER: Duration = Duration::from_secs(10);

/// Resolves on SIGINT or SIGTERM.
///
/// Once a signal arrives the server stops accepting connections and drains
/// in-flight requests. A timer is armed at the same moment: if draining is
/// still going on after [`FORCED_SHUTDOWN_AFTER`], the process exits with
/// status 1.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    arm_forced_shutdown(FORCED_SHUTDOWN_AFTER);
}

fn arm_forced_shutdown(after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        tracing::error!(
            after_secs = after.as_secs(),
            "Could not close connections in time, forcefully shutting down"
        );
        std::process::exit(1);
    });
    tracing::info!(
        "Graceful shutdown initiated, waiting up to {} seconds for connections to close",
        after.as_secs()
    );
}
