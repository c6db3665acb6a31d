//! End-to-end tests for the API tier.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceExt;

use counter_stack::api::{build_router, ApiServer, ApiState};
use counter_stack::health::ReadinessGate;
use counter_stack::lifecycle::{DrainOutcome, ShutdownPhase, StartupError};
use counter_stack::store::{self, CounterAccessor, CounterStore, StoreError};
use counter_stack::GoldenSignals;

mod common;
use common::{sample, FailingStore};

fn failing_router(store: FailingStore) -> (Router, Arc<GoldenSignals>) {
    let signals = Arc::new(GoldenSignals::new().unwrap());
    let counter = Arc::new(OnceLock::new());
    counter
        .set(CounterAccessor::new(Arc::new(store), Arc::clone(&signals)))
        .unwrap();
    let state = ApiState {
        counter,
        signals: Arc::clone(&signals),
        readiness: Arc::new(ReadinessGate::new()),
    };
    (build_router(state), signals)
}

async fn get(router: Router, path: &str) -> (StatusCode, String) {
    let response = router
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn wait_until_ready(client: &reqwest::Client, base: &str) {
    for _ in 0..100 {
        if let Ok(res) = client.get(format!("{}/readiness", base)).send().await {
            if res.status() == 200 {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("API tier never became ready");
}

#[tokio::test]
async fn test_fresh_start_counts_from_one() {
    let config = common::test_config();
    let signals = Arc::new(GoldenSignals::new().unwrap());
    let server = ApiServer::new(&config, Arc::clone(&signals));
    let shutdown = server.shutdown();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let store_config = config.store.clone();
    let task = tokio::spawn(async move { server.run(listener, store::connect(&store_config)).await });

    let client = common::client();
    wait_until_ready(&client, &base).await;

    let first = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.text().await.unwrap(), "1");

    let second = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.text().await.unwrap(), "2");

    let metrics = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(sample(&metrics, "received_request_total"), Some(2.0));
    assert_eq!(sample(&metrics, "db_connection_status"), Some(1.0));
    assert_eq!(
        sample(&metrics, "http_requests_total{endpoint=\"/\",status=\"200\"}"),
        Some(2.0)
    );

    shutdown.trigger();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, DrainOutcome::Drained);
    assert_eq!(shutdown.phase(), ShutdownPhase::Stopped);
    assert_eq!(sample(&signals.render(), "db_connection_status"), Some(0.0));
}

#[tokio::test]
async fn test_update_failure_is_one_error() {
    let (router, signals) = failing_router(FailingStore::failing_increment());

    let (status, body) = get(router, "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Internal Server Error");

    let rendered = signals.render();
    assert_eq!(
        sample(&rendered, "request_errors_total{endpoint=\"/\",error_type=\"db_update_failed\"}"),
        Some(1.0)
    );
    assert_eq!(
        sample(&rendered, "request_errors_total{endpoint=\"/\",error_type=\"db_select_failed\"}"),
        None
    );
    assert_eq!(sample(&rendered, "processed_request_total").unwrap_or(0.0), 0.0);
    assert_eq!(sample(&rendered, "http_requests_in_flight"), Some(0.0));
    assert_eq!(
        sample(&rendered, "db_operation_duration_seconds_count{operation=\"get_counter\"}"),
        None
    );
}

#[tokio::test]
async fn test_read_failure_after_increment_is_an_error() {
    let (router, signals) = failing_router(FailingStore::failing_read());

    let (status, body) = get(router, "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Internal Server Error");

    let rendered = signals.render();
    assert_eq!(
        sample(&rendered, "request_errors_total{endpoint=\"/\",error_type=\"db_select_failed\"}"),
        Some(1.0)
    );
    assert_eq!(
        sample(&rendered, "db_operation_duration_seconds_count{operation=\"update_counter\"}"),
        Some(1.0)
    );
    assert_eq!(sample(&rendered, "http_requests_in_flight"), Some(0.0));
}

#[tokio::test]
async fn test_readiness_follows_store_initialization() {
    let config = common::test_config();
    let server = ApiServer::new(&config, Arc::new(GoldenSignals::new().unwrap()));
    let shutdown = server.shutdown();
    let readiness = server.readiness();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (store_tx, store_rx) = tokio::sync::oneshot::channel::<Arc<dyn CounterStore>>();
    let connect = async move { store_rx.await.map_err(|e| StoreError::Connect(e.to_string())) };
    let task = tokio::spawn(async move { server.run(listener, connect).await });

    let client = common::client();
    let res = client.get(format!("{}/readiness", base)).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "Service Unavailable\n");

    let res = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(res.status(), 503);

    let res = client.get(format!("{}/liveness", base)).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let sqlite = store::SqliteStore::open(":memory:").await.unwrap();
    store_tx.send(Arc::new(sqlite)).ok().unwrap();
    wait_until_ready(&client, &base).await;
    assert!(readiness.is_ready());

    let mut phases = shutdown.subscribe();
    shutdown.trigger();
    phases.changed().await.unwrap();
    assert_eq!(*phases.borrow(), ShutdownPhase::Draining);
    assert!(!readiness.is_ready());

    assert_eq!(task.await.unwrap().unwrap(), DrainOutcome::Drained);
    assert_eq!(shutdown.phase(), ShutdownPhase::Stopped);
}

#[tokio::test]
async fn test_connect_failure_aborts_startup() {
    let config = common::test_config();
    let signals = Arc::new(GoldenSignals::new().unwrap());
    let server = ApiServer::new(&config, Arc::clone(&signals));
    let shutdown = server.shutdown();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let connect = async { Err::<Arc<dyn CounterStore>, _>(StoreError::Connect("refused".into())) };

    let result = server.run(listener, connect).await;
    assert!(matches!(result, Err(StartupError::Store(StoreError::Connect(_)))));
    assert_eq!(shutdown.phase(), ShutdownPhase::Stopped);
    assert_eq!(sample(&signals.render(), "db_connection_status"), Some(0.0));
}

#[tokio::test]
async fn test_shutdown_with_stuck_store_reaches_stopped() {
    let mut config = common::test_config();
    config.shutdown.drain_timeout_secs = 1;
    let signals = Arc::new(GoldenSignals::new().unwrap());
    let server = ApiServer::new(&config, Arc::clone(&signals));
    let shutdown = server.shutdown();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let connect = async { Ok::<Arc<dyn CounterStore>, StoreError>(Arc::new(common::StuckStore)) };
    let task = tokio::spawn(async move { server.run(listener, connect).await });

    let client = common::client();
    wait_until_ready(&client, &base).await;

    let url = format!("{}/", base);
    let slow = tokio::spawn(async move { client.get(url).send().await });
    for _ in 0..100 {
        if sample(&signals.render(), "http_requests_in_flight") == Some(1.0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sample(&signals.render(), "http_requests_in_flight"), Some(1.0));

    let started = std::time::Instant::now();
    shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("API tier never stopped")
        .unwrap()
        .unwrap();

    assert_eq!(outcome, DrainOutcome::TimedOut);
    assert_eq!(shutdown.phase(), ShutdownPhase::Stopped);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(sample(&signals.render(), "db_connection_status"), Some(0.0));

    slow.abort();
}
