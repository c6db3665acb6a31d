//! Handler failure responses.
//!
//! # Design Decisions
//! - Clients get a definite status and a short generic body; causes stay in
//!   logs and the `error_type` metric label
//! - The failure class travels to the instrumentation layer as a response
//!   extension, so counting happens in exactly one place

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::observability::ErrorType;

/// A request that failed inside its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerError {
    pub error_type: ErrorType,
    pub status: StatusCode,
    pub message: &'static str,
}

impl HandlerError {
    /// A `500 Internal Server Error` with the given client-facing body.
    pub fn internal(error_type: ErrorType, message: &'static str) -> Self {
        Self {
            error_type,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message).into_response();
        response.extensions_mut().insert(self.error_type);
        response
    }
}
