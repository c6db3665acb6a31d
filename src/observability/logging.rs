//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured log level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, ObservabilityConfig};

pub use tracing_subscriber::util::TryInitError;

/// Filter used when `RUST_LOG` is unset. Request traces from tower-http stay
/// at `info` whatever the crate's own level.
pub fn default_filter(config: &ObservabilityConfig) -> String {
    format!("counter_stack={},tower_http=info", config.log_level)
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let fmt_layer = match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
}
