//! Operational HTTP endpoints shared by both tiers.
//!
//! - `/liveness`  : always 200 while the process can schedule a handler
//! - `/readiness` : 200 while the readiness gate is set, 503 otherwise
//! - `/metrics`   : Prometheus text format

use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::health::state::ReadinessGate;
use crate::observability::GoldenSignals;

/// Routes for the probe and scrape endpoints, for any state that can hand
/// out the readiness gate and the metrics collector.
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<ReadinessGate>: FromRef<S>,
    Arc<GoldenSignals>: FromRef<S>,
{
    Router::new()
        .route("/liveness", get(liveness))
        .route("/readiness", get(readiness))
        .route("/metrics", get(metrics))
}

pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK\n")
}

pub async fn readiness(State(gate): State<Arc<ReadinessGate>>) -> impl IntoResponse {
    if gate.is_ready() {
        (StatusCode::OK, "OK\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable\n")
    }
}

pub async fn metrics(State(signals): State<Arc<GoldenSignals>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        signals.render(),
    )
        .into_response()
}
