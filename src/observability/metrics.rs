//! Golden-signal metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the service metrics (traffic, errors, latency, saturation)
//! - Record observations from request handlers and downstream calls
//! - Render every registered series for the `/metrics` endpoint
//!
//! # Metrics
//! - `received_request_total` / `processed_request_total` (counter): traffic
//! - `http_requests_total{endpoint,status}` (counter): completed requests
//! - `request_errors_total{endpoint,error_type}` (counter): failures by class
//! - `http_request_duration_seconds{endpoint,status}` (histogram): latency
//! - `http_requests_in_flight` (gauge): saturation
//! - `db_operation_duration_seconds{operation}` (histogram), `db_connection_status` (gauge)
//! - `api_calls_in_flight` (gauge), `api_call_duration_seconds{status}` (histogram)
//! - `api_call_errors_total{error_type}`, `api_response_status_total{status_code}` (counter)
//! - `http_response_size_bytes{endpoint}` (histogram)
//!
//! # Design Decisions
//! - The Prometheus recorder is built, not installed globally: every
//!   `GoldenSignals` owns its registry and is passed around explicitly
//! - Labelled series are registered lazily on first observation
//! - Recording never fails and never blocks (atomic handles)

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Label, Level, Metadata, Recorder, SharedString, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

pub const RECEIVED_REQUESTS: &str = "received_request_total";
pub const PROCESSED_REQUESTS: &str = "processed_request_total";
pub const HTTP_REQUESTS: &str = "http_requests_total";
pub const REQUEST_ERRORS: &str = "request_errors_total";
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";
pub const DB_OPERATION_DURATION: &str = "db_operation_duration_seconds";
pub const DB_CONNECTION_STATUS: &str = "db_connection_status";
pub const API_CALLS_IN_FLIGHT: &str = "api_calls_in_flight";
pub const API_CALL_DURATION: &str = "api_call_duration_seconds";
pub const API_CALL_ERRORS: &str = "api_call_errors_total";
pub const API_RESPONSE_STATUS: &str = "api_response_status_total";
pub const RESPONSE_SIZE: &str = "http_response_size_bytes";

/// Prometheus default latency buckets, in seconds.
pub const LATENCY_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Response size buckets, in bytes.
pub const SIZE_BUCKETS: [f64; 9] = [
    100.0, 500.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0,
];

/// Closed set of request failure classes (`error_type` label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    DbUpdateFailed,
    DbSelectFailed,
    ResponseWriteFailed,
    ApiCallFailed,
    ApiNonOkStatus,
    ResponseReadFailed,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::DbUpdateFailed => "db_update_failed",
            ErrorType::DbSelectFailed => "db_select_failed",
            ErrorType::ResponseWriteFailed => "response_write_failed",
            ErrorType::ApiCallFailed => "api_call_failed",
            ErrorType::ApiNonOkStatus => "api_non_ok_status",
            ErrorType::ResponseReadFailed => "response_read_failed",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class of a failed downstream call (`api_call_errors_total` label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCallFailure {
    /// No response was received.
    Connection,
    /// A response arrived with a non-2xx status.
    Status(u16),
}

impl ApiCallFailure {
    pub fn label(&self) -> String {
        match self {
            ApiCallFailure::Connection => "connection_error".to_string(),
            ApiCallFailure::Status(code) => format!("status_{}", code),
        }
    }
}

/// Which saturation gauge an [`InFlightGuard`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFlight {
    Requests,
    ApiCalls,
}

/// A single measurement handed to [`GoldenSignals::observe`].
#[derive(Debug, Clone)]
pub enum Observation {
    RequestReceived,
    RequestProcessed,
    RequestCompleted {
        endpoint: &'static str,
        status: StatusCode,
        elapsed: Duration,
    },
    RequestError {
        endpoint: &'static str,
        error_type: ErrorType,
    },
    DbOperation {
        operation: &'static str,
        elapsed: Duration,
    },
    DbConnection {
        connected: bool,
    },
    InFlightDelta {
        gauge: InFlight,
        delta: i8,
    },
    ApiCallCompleted {
        /// Downstream status code, `0` when no response was received.
        status: u16,
        elapsed: Duration,
    },
    ApiResponseStatus {
        status: u16,
    },
    ApiCallError(ApiCallFailure),
    ResponseSize {
        endpoint: &'static str,
        bytes: usize,
    },
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

/// Process-wide golden-signal collector.
///
/// One instance per service, shared as `Arc<GoldenSignals>` through router
/// state. Dropping the last reference drops every series.
pub struct GoldenSignals {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    received: Counter,
    processed: Counter,
    requests_in_flight: Gauge,
    api_calls_in_flight: Gauge,
    db_connection_status: Gauge,
}

impl GoldenSignals {
    /// Build a recorder with fixed bucket layouts and describe every series.
    pub fn new() -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(&LATENCY_BUCKETS)?
            .set_buckets_for_metric(Matcher::Full(RESPONSE_SIZE.to_string()), &SIZE_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();

        describe(&recorder);

        let register_gauge = |name: &'static str| recorder.register_gauge(&Key::from_name(name), &metadata());
        let requests_in_flight = register_gauge(REQUESTS_IN_FLIGHT);
        let api_calls_in_flight = register_gauge(API_CALLS_IN_FLIGHT);
        let db_connection_status = register_gauge(DB_CONNECTION_STATUS);
        let received = recorder.register_counter(&Key::from_name(RECEIVED_REQUESTS), &metadata());
        let processed = recorder.register_counter(&Key::from_name(PROCESSED_REQUESTS), &metadata());

        Ok(Self {
            recorder,
            handle,
            received,
            processed,
            requests_in_flight,
            api_calls_in_flight,
            db_connection_status,
        })
    }

    /// Record one observation. Never fails.
    pub fn observe(&self, observation: Observation) {
        match observation {
            Observation::RequestReceived => self.received.increment(1),
            Observation::RequestProcessed => self.processed.increment(1),
            Observation::RequestCompleted { endpoint, status, elapsed } => {
                let labels = || {
                    vec![
                        Label::new("endpoint", endpoint),
                        Label::new("status", status.as_u16().to_string()),
                    ]
                };
                self.histogram(REQUEST_DURATION, labels()).record(elapsed.as_secs_f64());
                self.counter(HTTP_REQUESTS, labels()).increment(1);
            }
            Observation::RequestError { endpoint, error_type } => {
                self.counter(
                    REQUEST_ERRORS,
                    vec![
                        Label::new("endpoint", endpoint),
                        Label::new("error_type", error_type.as_str()),
                    ],
                )
                .increment(1);
            }
            Observation::DbOperation { operation, elapsed } => {
                self.histogram(DB_OPERATION_DURATION, vec![Label::new("operation", operation)])
                    .record(elapsed.as_secs_f64());
            }
            Observation::DbConnection { connected } => {
                self.db_connection_status.set(if connected { 1.0 } else { 0.0 });
            }
            Observation::InFlightDelta { gauge, delta } => {
                let gauge = match gauge {
                    InFlight::Requests => &self.requests_in_flight,
                    InFlight::ApiCalls => &self.api_calls_in_flight,
                };
                if delta >= 0 {
                    gauge.increment(f64::from(delta));
                } else {
                    gauge.decrement(f64::from(delta).abs());
                }
            }
            Observation::ApiCallCompleted { status, elapsed } => {
                self.histogram(API_CALL_DURATION, vec![Label::new("status", status.to_string())])
                    .record(elapsed.as_secs_f64());
            }
            Observation::ApiResponseStatus { status } => {
                self.counter(API_RESPONSE_STATUS, vec![Label::new("status_code", status.to_string())])
                    .increment(1);
            }
            Observation::ApiCallError(failure) => {
                self.counter(API_CALL_ERRORS, vec![Label::new("error_type", failure.label())])
                    .increment(1);
            }
            Observation::ResponseSize { endpoint, bytes } => {
                self.histogram(RESPONSE_SIZE, vec![Label::new("endpoint", endpoint)])
                    .record(bytes as f64);
            }
        }
    }

    /// Increment a saturation gauge until the returned guard is dropped.
    pub fn track(self: &Arc<Self>, gauge: InFlight) -> InFlightGuard {
        self.observe(Observation::InFlightDelta { gauge, delta: 1 });
        InFlightGuard {
            signals: Arc::clone(self),
            gauge,
        }
    }

    /// Render the current state of every registered series.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    fn counter(&self, name: &'static str, labels: Vec<Label>) -> Counter {
        self.recorder.register_counter(&Key::from_parts(name, labels), &metadata())
    }

    fn histogram(&self, name: &'static str, labels: Vec<Label>) -> Histogram {
        self.recorder.register_histogram(&Key::from_parts(name, labels), &metadata())
    }
}

impl fmt::Debug for GoldenSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoldenSignals").finish_non_exhaustive()
    }
}

fn describe(recorder: &PrometheusRecorder) {
    let counters = [
        (RECEIVED_REQUESTS, "The total number of received requests"),
        (PROCESSED_REQUESTS, "The total number of processed requests"),
        (HTTP_REQUESTS, "Total number of HTTP requests by endpoint and status"),
        (REQUEST_ERRORS, "The total number of failed requests by error type"),
        (API_CALL_ERRORS, "The total number of failed API calls by error type"),
        (API_RESPONSE_STATUS, "Total number of API responses by status code"),
    ];
    for (name, help) in counters {
        recorder.describe_counter(KeyName::from(name), None, SharedString::from(help));
    }

    let gauges = [
        (REQUESTS_IN_FLIGHT, "Current number of HTTP requests being processed"),
        (API_CALLS_IN_FLIGHT, "Current number of API calls being processed"),
        (DB_CONNECTION_STATUS, "Database connection status (1 = connected, 0 = disconnected)"),
    ];
    for (name, help) in gauges {
        recorder.describe_gauge(KeyName::from(name), None, SharedString::from(help));
    }

    let histograms = [
        (REQUEST_DURATION, Unit::Seconds, "Duration of HTTP requests in seconds"),
        (DB_OPERATION_DURATION, Unit::Seconds, "Duration of database operations in seconds"),
        (API_CALL_DURATION, Unit::Seconds, "Duration of API calls in seconds"),
        (RESPONSE_SIZE, Unit::Bytes, "Size of HTTP responses in bytes"),
    ];
    for (name, unit, help) in histograms {
        recorder.describe_histogram(KeyName::from(name), Some(unit), SharedString::from(help));
    }
}

/// Scoped saturation tracking: decrements its gauge on drop, on every path.
#[derive(Debug)]
pub struct InFlightGuard {
    signals: Arc<GoldenSignals>,
    gauge: InFlight,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.signals.observe(Observation::InFlightDelta {
            gauge: self.gauge,
            delta: -1,
        });
    }
}
