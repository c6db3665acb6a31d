//! OS signal handling.
//!
//! SIGINT and SIGTERM both start the graceful shutdown sequence; a
//! programmatic [`Shutdown::trigger`] is treated the same way.

use crate::lifecycle::shutdown::Shutdown;

/// Resolves on SIGINT, SIGTERM, or a programmatic trigger.
pub async fn wait_for_shutdown(shutdown: &Shutdown) {
    tokio::select! {
        signal = termination() => {
            tracing::info!(signal, "Shutdown signal received");
        }
        _ = shutdown.requested() => {
            tracing::info!("Shutdown requested");
        }
    }
}

/// Resolves with the name of the first termination signal received.
pub async fn termination() -> &'static str {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGINT handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}
