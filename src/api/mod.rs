//! API tier: the counter service.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     bind → serve (GET / answers 503, readiness 503)
//!     → connect store → ensure schema → readiness = true
//!
//! GET / → instrument → handlers::counter → increment → read → "<n>"
//!
//! Shutdown:
//!     signal → readiness = false → stop listener → drain (bounded)
//!     → close store (bounded) → Stopped
//! ```

pub mod handlers;

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{extract::FromRef, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::StackConfig;
use crate::health::{probes, ReadinessGate};
use crate::http::{instrument, HttpServer, Instrumented};
use crate::lifecycle::{signals, DrainOutcome, Shutdown, StartupError};
use crate::observability::{GoldenSignals, Observation};
use crate::store::{CounterAccessor, CounterStore, StoreError};

/// Shared state for API tier handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Set once the store is connected and its schema is in place.
    pub counter: Arc<OnceLock<CounterAccessor>>,
    pub signals: Arc<GoldenSignals>,
    pub readiness: Arc<ReadinessGate>,
}

impl FromRef<ApiState> for Arc<OnceLock<CounterAccessor>> {
    fn from_ref(state: &ApiState) -> Self {
        Arc::clone(&state.counter)
    }
}

impl FromRef<ApiState> for Arc<GoldenSignals> {
    fn from_ref(state: &ApiState) -> Self {
        Arc::clone(&state.signals)
    }
}

impl FromRef<ApiState> for Arc<ReadinessGate> {
    fn from_ref(state: &ApiState) -> Self {
        Arc::clone(&state.readiness)
    }
}

/// Routes for the API tier. Only `/` is instrumented.
pub fn build_router(state: ApiState) -> Router {
    let instrumented = Instrumented::new(Arc::clone(&state.signals), "/");
    Router::new()
        .route(
            "/",
            get(handlers::counter).layer(middleware::from_fn_with_state(instrumented, instrument)),
        )
        .merge(probes::routes())
        .with_state(state)
}

/// The API tier process.
pub struct ApiServer {
    state: ApiState,
    shutdown: Arc<Shutdown>,
    /// Bound on releasing the store once the listener is down.
    close_timeout: Duration,
}

impl ApiServer {
    pub fn new(config: &StackConfig, signals: Arc<GoldenSignals>) -> Self {
        let readiness = Arc::new(ReadinessGate::new());
        let shutdown = Arc::new(Shutdown::new(
            Arc::clone(&readiness),
            config.shutdown.drain_timeout(),
        ));
        Self {
            state: ApiState {
                counter: Arc::new(OnceLock::new()),
                signals,
                readiness,
            },
            shutdown,
            close_timeout: config.shutdown.drain_timeout(),
        }
    }

    /// Shutdown coordinator, for triggering a stop without a signal.
    pub fn shutdown(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shutdown)
    }

    pub fn readiness(&self) -> Arc<ReadinessGate> {
        Arc::clone(&self.state.readiness)
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve on `listener` until shutdown.
    ///
    /// Probes answer while `connect` is pending. A store failure drains the
    /// listener and is returned; a shutdown request during startup is a clean
    /// stop.
    pub async fn run<F>(self, listener: TcpListener, connect: F) -> Result<DrainOutcome, StartupError>
    where
        F: Future<Output = Result<Arc<dyn CounterStore>, StoreError>>,
    {
        let server = HttpServer::new("api", self.router()).spawn(listener, self.shutdown.listener_token());

        let initialized = tokio::select! {
            result = self.initialize(connect) => Some(result),
            _ = signals::wait_for_shutdown(&self.shutdown) => None,
        };

        let accessor = match initialized {
            Some(Ok(accessor)) => accessor,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Failed to initialize counter store");
                self.stop(server).await;
                return Err(e.into());
            }
            None => return Ok(self.stop(server).await),
        };

        if self.state.counter.set(accessor.clone()).is_err() {
            tracing::warn!("Counter store was already initialized");
        }
        self.state.readiness.set_ready(true);
        tracing::info!(backend = accessor.backend(), "Counter store ready");

        let outcome = self.shutdown.wait_and_drain(server).await;
        match tokio::time::timeout(self.close_timeout, accessor.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Error while closing counter store"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.close_timeout.as_secs_f64(),
                    "Counter store did not close in time, abandoning it"
                );
                self.state.signals.observe(Observation::DbConnection { connected: false });
            }
        }
        self.shutdown.finish();
        Ok(outcome)
    }

    async fn initialize<F>(&self, connect: F) -> Result<CounterAccessor, StoreError>
    where
        F: Future<Output = Result<Arc<dyn CounterStore>, StoreError>>,
    {
        let store = match connect.await {
            Ok(store) => store,
            Err(e) => {
                self.state.signals.observe(Observation::DbConnection { connected: false });
                return Err(e);
            }
        };
        self.state.signals.observe(Observation::DbConnection { connected: true });

        let accessor = CounterAccessor::new(store, Arc::clone(&self.state.signals));
        if let Err(e) = accessor.ensure_schema().await {
            if let Err(close) = accessor.close().await {
                tracing::warn!(error = %close, "Error while closing counter store");
            }
            return Err(e);
        }
        Ok(accessor)
    }

    async fn stop(&self, server: JoinHandle<std::io::Result<()>>) -> DrainOutcome {
        self.shutdown.begin_drain();
        let outcome = self.shutdown.drain(server).await;
        self.shutdown.finish();
        outcome
    }
}
