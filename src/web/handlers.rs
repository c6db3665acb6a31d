//! Web tier request handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};

use crate::http::{request_id, HandlerError};
use crate::observability::ErrorType;
use crate::web::downstream::{Downstream, DownstreamError};

/// `GET /send`: fetch the counter from the API tier and relay its body.
pub async fn send(State(downstream): State<Arc<Downstream>>, headers: HeaderMap) -> Response {
    match downstream.fetch("/send", request_id(&headers)).await {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain")], body).into_response(),
        Err(e) => failure(&e).into_response(),
    }
}

fn failure(error: &DownstreamError) -> HandlerError {
    match error {
        DownstreamError::Connection(_) => {
            HandlerError::internal(ErrorType::ApiCallFailed, "Failed to fetch counter")
        }
        DownstreamError::Status(_) => HandlerError::internal(ErrorType::ApiNonOkStatus, "API error"),
        DownstreamError::BodyRead(_) => {
            HandlerError::internal(ErrorType::ResponseReadFailed, "Failed to read counter")
        }
    }
}
