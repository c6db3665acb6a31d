//! Web tier: static assets plus a proxy to the API tier.
//!
//! # Data Flow
//! ```text
//! GET /send → instrument("/send") → handlers::send → downstream GET → relay body
//! GET /*    → instrument("/")     → static files from web.static_dir
//! GET /liveness | /readiness | /metrics → probes (not instrumented)
//! ```
//!
//! The web tier has no dependency to initialize: it is ready as soon as it
//! listens.

pub mod downstream;
pub mod handlers;

use std::sync::Arc;

use axum::{extract::FromRef, http::Uri, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::StackConfig;
use crate::health::{probes, ReadinessGate};
use crate::http::{instrument, HttpServer, Instrumented};
use crate::lifecycle::{DrainOutcome, Shutdown, StartupError};
use crate::observability::GoldenSignals;

pub use downstream::{Downstream, DownstreamError};

/// Shared state for web tier handlers.
#[derive(Clone)]
pub struct WebState {
    pub downstream: Arc<Downstream>,
    pub signals: Arc<GoldenSignals>,
    pub readiness: Arc<ReadinessGate>,
}

impl FromRef<WebState> for Arc<Downstream> {
    fn from_ref(state: &WebState) -> Self {
        Arc::clone(&state.downstream)
    }
}

impl FromRef<WebState> for Arc<GoldenSignals> {
    fn from_ref(state: &WebState) -> Self {
        Arc::clone(&state.signals)
    }
}

impl FromRef<WebState> for Arc<ReadinessGate> {
    fn from_ref(state: &WebState) -> Self {
        Arc::clone(&state.readiness)
    }
}

/// Routes for the web tier. Everything unmatched falls through to the
/// static directory.
pub fn build_router(state: WebState, static_dir: &str) -> Router {
    let layer = |endpoint| {
        middleware::from_fn_with_state(Instrumented::new(Arc::clone(&state.signals), endpoint), instrument)
    };

    let assets = Router::new()
        .fallback_service(ServeDir::new(static_dir))
        .layer(layer("/"));

    Router::new()
        .route("/send", get(handlers::send).layer(layer("/send")))
        .merge(probes::routes())
        .with_state(state)
        .fallback_service(assets)
}

/// The web tier process.
pub struct WebServer {
    state: WebState,
    static_dir: String,
    shutdown: Arc<Shutdown>,
}

impl WebServer {
    pub fn new(config: &StackConfig, signals: Arc<GoldenSignals>) -> Result<Self, StartupError> {
        let url: Uri = config
            .web
            .api_url
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| StartupError::DownstreamUrl {
                url: config.web.api_url.clone(),
                reason: e.to_string(),
            })?;

        let readiness = Arc::new(ReadinessGate::new());
        let shutdown = Arc::new(Shutdown::new(
            Arc::clone(&readiness),
            config.shutdown.drain_timeout(),
        ));

        Ok(Self {
            state: WebState {
                downstream: Arc::new(Downstream::new(url, Arc::clone(&signals))),
                signals,
                readiness,
            },
            static_dir: config.web.static_dir.clone(),
            shutdown,
        })
    }

    pub fn shutdown(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shutdown)
    }

    pub fn readiness(&self) -> Arc<ReadinessGate> {
        Arc::clone(&self.state.readiness)
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.static_dir)
    }

    /// Serve on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener) -> Result<DrainOutcome, StartupError> {
        tracing::info!(
            api_url = %self.state.downstream.url(),
            static_dir = %self.static_dir,
            "Web tier configured"
        );
        let server = HttpServer::new("web", self.router()).spawn(listener, self.shutdown.listener_token());
        self.state.readiness.set_ready(true);

        let outcome = self.shutdown.wait_and_drain(server).await;
        self.shutdown.finish();
        Ok(outcome)
    }
}
