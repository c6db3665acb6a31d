//! API tier request handlers.

use std::sync::{Arc, OnceLock};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::http::HandlerError;
use crate::observability::ErrorType;
use crate::store::CounterAccessor;

const INTERNAL_ERROR: &str = "Internal Server Error";

/// `GET /`: increment the counter, then return its new value as plain text.
///
/// The increment stays applied when the follow-up read fails.
pub async fn counter(State(counter): State<Arc<OnceLock<CounterAccessor>>>) -> Response {
    let Some(counter) = counter.get() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response();
    };

    match increment_and_read(counter).await {
        Ok(value) => value.to_string().into_response(),
        Err(e) => e.into_response(),
    }
}

async fn increment_and_read(counter: &CounterAccessor) -> Result<i64, HandlerError> {
    counter.increment().await.map_err(|e| {
        tracing::error!(error = %e, "Error while updating counter");
        HandlerError::internal(ErrorType::DbUpdateFailed, INTERNAL_ERROR)
    })?;

    counter.read().await.map_err(|e| {
        tracing::error!(error = %e, "Error while getting counter");
        HandlerError::internal(ErrorType::DbSelectFailed, INTERNAL_ERROR)
    })
}
