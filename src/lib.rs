//! Two-tier counter service.
//!
//! The API tier keeps a counter in a relational store; the web tier serves
//! static assets and proxies `/send` to the API tier. Both expose liveness,
//! readiness and Prometheus metrics, and shut down gracefully.

pub mod api;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod store;
pub mod web;

pub use api::ApiServer;
pub use config::StackConfig;
pub use lifecycle::Shutdown;
pub use observability::GoldenSignals;
pub use web::WebServer;
