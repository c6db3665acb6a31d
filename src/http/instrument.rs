//! Request instrumentation.
//!
//! # Responsibilities
//! - Count every received request and hold the in-flight gauge for its lifetime
//! - Time the request up to the point its status is final
//! - Capture the status the handler actually produced
//! - Count handler failures by class, and write failures while streaming
//! - Count a request as processed only once its body is fully written
//!
//! # Per-request sequence
//! ```text
//! received++ → in_flight++ → handler → latency{endpoint,status}
//!     → [errors{error_type}] → body streamed → [processed++ | errors{response_write_failed}]
//!     → in_flight--
//! ```
//!
//! A request yields exactly one latency observation and at most one error
//! observation. A write failure on a request that already failed in its
//! handler is only logged.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use hyper::body::{Frame, SizeHint};

use crate::observability::{ErrorType, GoldenSignals, InFlight, InFlightGuard, Observation};

/// Middleware state: the collector plus the fixed endpoint label.
#[derive(Debug, Clone)]
pub struct Instrumented {
    signals: Arc<GoldenSignals>,
    endpoint: &'static str,
}

impl Instrumented {
    pub fn new(signals: Arc<GoldenSignals>, endpoint: &'static str) -> Self {
        Self { signals, endpoint }
    }
}

/// Wrap a handler with golden-signal instrumentation.
///
/// Use with `axum::middleware::from_fn_with_state(Instrumented::new(..), instrument)`.
pub async fn instrument(State(instrumented): State<Instrumented>, request: Request, next: Next) -> Response {
    let Instrumented { signals, endpoint } = instrumented;

    let start = Instant::now();
    let in_flight = signals.track(InFlight::Requests);
    signals.observe(Observation::RequestReceived);

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    tracing::debug!(endpoint, peer = ?peer, "Received call");
    let head = request.method() == Method::HEAD;

    let response = next.run(request).await;
    let status = response.status();

    signals.observe(Observation::RequestCompleted {
        endpoint,
        status,
        elapsed: start.elapsed(),
    });

    let failure = response.extensions().get::<ErrorType>().copied();
    if let Some(error_type) = failure {
        tracing::warn!(endpoint, %status, %error_type, "Request failed");
        signals.observe(Observation::RequestError { endpoint, error_type });
    }

    let completion = Completion {
        signals,
        endpoint,
        handler_failed: failure.is_some(),
        _in_flight: in_flight,
    };
    let bodyless = head || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED;
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(TrackedBody::new(body, completion, bodyless)))
}

/// What to record once the response body is done.
struct Completion {
    signals: Arc<GoldenSignals>,
    endpoint: &'static str,
    handler_failed: bool,
    _in_flight: InFlightGuard,
}

impl Completion {
    fn finish(self, written: bool) {
        match (written, self.handler_failed) {
            (true, false) => self.signals.observe(Observation::RequestProcessed),
            (true, true) => {}
            (false, false) => {
                tracing::warn!(endpoint = self.endpoint, "Error writing response");
                self.signals.observe(Observation::RequestError {
                    endpoint: self.endpoint,
                    error_type: ErrorType::ResponseWriteFailed,
                });
            }
            (false, true) => {
                tracing::warn!(endpoint = self.endpoint, "Error writing error response");
            }
        }
    }
}

/// Response body decorator reporting whether the body was fully written.
///
/// Finishes on end of stream, on a body error, or on drop; whichever comes
/// first. Dropping an unfinished body (client went away) counts as a write
/// failure, unless the response never carries a body on the wire (`HEAD`,
/// `204`, `304`).
pub struct TrackedBody {
    inner: Body,
    completion: Option<Completion>,
    bodyless: bool,
}

impl TrackedBody {
    fn new(inner: Body, completion: Completion, bodyless: bool) -> Self {
        Self {
            inner,
            completion: Some(completion),
            bodyless,
        }
    }

    fn finish(&mut self, written: bool) {
        if let Some(completion) = self.completion.take() {
            completion.finish(written);
        }
    }
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) => this.finish(true),
            Poll::Ready(Some(Err(_))) => this.finish(false),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        let written = self.bodyless || self.inner.is_end_stream();
        self.finish(written);
    }
}
