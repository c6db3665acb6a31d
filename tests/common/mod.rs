//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use counter_stack::config::{StackConfig, StoreBackend};
use counter_stack::store::{CounterStore, StoreError};

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` runs once per connection and yields the status code and body; it may
/// sleep to simulate a slow backend.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = Arc::clone(&f);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let (status, body) = f().await;
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    500 => "Internal Server Error",
                    502 => "Bad Gateway",
                    503 => "Service Unavailable",
                    _ => "Unknown",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config for tests: SQLite backend, short drain.
pub fn test_config() -> StackConfig {
    let mut config = StackConfig::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.sqlite.path = ":memory:".to_string();
    config.shutdown.drain_timeout_secs = 2;
    config
}

/// HTTP client that never routes through an ambient proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Value of one rendered series, e.g. `sample(&text, "http_requests_in_flight")`
/// or `sample(&text, "request_errors_total{endpoint=\"/\",error_type=\"db_update_failed\"}")`.
pub fn sample(rendered: &str, series: &str) -> Option<f64> {
    rendered
        .lines()
        .find_map(|line| line.strip_prefix(series)?.strip_prefix(' ')?.trim().parse().ok())
}

/// Store double whose statements can be forced to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub fail_increment: AtomicBool,
    pub fail_read: AtomicBool,
}

impl FailingStore {
    pub fn failing_increment() -> Self {
        let store = Self::default();
        store.fail_increment.store(true, Ordering::SeqCst);
        store
    }

    pub fn failing_read() -> Self {
        let store = Self::default();
        store.fail_read.store(true, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn increment(&self) -> Result<(), StoreError> {
        if self.fail_increment.load(Ordering::SeqCst) {
            return Err(StoreError::Update("forced failure".into()));
        }
        Ok(())
    }

    async fn read(&self) -> Result<i64, StoreError> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(StoreError::Select("forced failure".into()));
        }
        Ok(7)
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// Store double whose statements and close never complete, like a database
/// that stopped answering.
#[derive(Debug, Default)]
pub struct StuckStore;

#[async_trait]
impl CounterStore for StuckStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn increment(&self) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn read(&self) -> Result<i64, StoreError> {
        std::future::pending().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        std::future::pending().await
    }

    fn backend(&self) -> &'static str {
        "stuck"
    }
}
