//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind listeners before dependencies are initialized (probes answer early)
//! - Collect every fatal startup failure into one error type
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Readiness is set by the tier only after its dependencies succeed

use tokio::net::TcpListener;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors that abort a tier before or during startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialize counter store: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid downstream URL '{url}': {reason}")]
    DownstreamUrl { url: String, reason: String },

    #[error("Failed to build metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

/// Bind a TCP listener, logging the resolved address.
pub async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })?;

    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!(address = %local_addr, "Listening for connections");
    }
    Ok(listener)
}
