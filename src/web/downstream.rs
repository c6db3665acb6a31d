//! Downstream calls from the web tier to the API tier.
//!
//! # Responsibilities
//! - Issue one GET per call to a fixed URL, no retry, no timeout
//! - Hold `api_calls_in_flight` for the duration of the call
//! - Record call latency by resolved status (`0` without a response)
//! - Classify failures: connection first, then non-2xx status
//! - Release the response body on every path that obtained one

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    http::{header::HeaderName, HeaderValue, Request, StatusCode, Uri},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::http::X_REQUEST_ID;
use crate::observability::{ApiCallFailure, GoldenSignals, InFlight, Observation};

/// Why a downstream call did not yield a usable body.
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("error calling API: {0}")]
    Connection(String),

    #[error("API returned non-OK status: {0}")]
    Status(StatusCode),

    #[error("error reading API response: {0}")]
    BodyRead(String),
}

/// Client for the API tier.
#[derive(Debug, Clone)]
pub struct Downstream {
    client: Client<HttpConnector, Body>,
    url: Uri,
    signals: Arc<GoldenSignals>,
}

impl Downstream {
    pub fn new(url: Uri, signals: Arc<GoldenSignals>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, url, signals }
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// GET the configured URL and return its body.
    ///
    /// `endpoint` labels the relayed response size.
    pub async fn fetch(
        &self,
        endpoint: &'static str,
        request_id: Option<HeaderValue>,
    ) -> Result<Bytes, DownstreamError> {
        let mut request = Request::new(Body::empty());
        *request.uri_mut() = self.url.clone();
        if let Some(id) = request_id {
            request.headers_mut().insert(HeaderName::from_static(X_REQUEST_ID), id);
        }

        let response = {
            let _in_flight = self.signals.track(InFlight::ApiCalls);
            let start = Instant::now();
            let result = self.client.request(request).await;
            let status = result.as_ref().map_or(0, |r| r.status().as_u16());
            self.signals.observe(Observation::ApiCallCompleted {
                status,
                elapsed: start.elapsed(),
            });
            result
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Error calling API");
                self.signals.observe(Observation::ApiCallError(ApiCallFailure::Connection));
                return Err(DownstreamError::Connection(e.to_string()));
            }
        };

        let status = response.status();
        self.signals.observe(Observation::ApiResponseStatus {
            status: status.as_u16(),
        });
        if !status.is_success() {
            tracing::error!(url = %self.url, %status, "API returned non-OK status");
            self.signals.observe(Observation::ApiCallError(ApiCallFailure::Status(status.as_u16())));
            return Err(DownstreamError::Status(status));
        }

        let body = axum::body::to_bytes(Body::new(response.into_body()), usize::MAX)
            .await
            .map_err(|e| {
                tracing::error!(url = %self.url, error = %e, "Error reading API response");
                DownstreamError::BodyRead(e.to_string())
            })?;

        self.signals.observe(Observation::ResponseSize {
            endpoint,
            bytes: body.len(),
        });
        Ok(body)
    }
}
