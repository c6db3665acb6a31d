//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers, downstream calls and store operations produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for production)
//!     → GET /metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging via `tracing`; request IDs come from the HTTP layer
//! - Metrics are cheap (atomic handles) and never fail a request

pub mod logging;
pub mod metrics;

pub use metrics::{ApiCallFailure, ErrorType, GoldenSignals, InFlight, InFlightGuard, Observation};
