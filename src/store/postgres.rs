//! PostgreSQL counter store.
//!
//! # Responsibilities
//! - Connect once with the configured credentials (no pool, no retry)
//! - Negotiate TLS per `sslmode` (`require` by default)
//! - Drive the connection future on the runtime
//! - Close without waiting on statements that never complete
//!
//! # Design Decisions
//! - Each statement clones the shared `Arc<Client>` out of a short-lived lock,
//!   so `close` never queues behind a statement
//! - `close` on an idle client drops it and lets the driver finish; with
//!   statements still outstanding the driver is aborted and they fail

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::task::JoinHandle;
use tokio_postgres::Client;

use crate::config::{PostgresConfig, SslMode};
use crate::store::{
    CounterStore, StoreError, CREATE_TABLE, INCREMENT, INSERT_ROW, ROW_EXISTS, SELECT_COUNTER,
};

/// Counter store backed by a single PostgreSQL connection.
pub struct PostgresStore {
    client: Mutex<Option<Arc<Client>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresStore {
    /// Connect using the configured credentials.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        tracing::info!(
            username = %config.username,
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            sslmode = %config.sslmode,
            "Attempting to connect to database"
        );

        let mut pg = tokio_postgres::Config::new();
        pg.user(config.username.as_str())
            .password(config.password.as_str())
            .host(config.host.as_str())
            .port(config.port)
            .dbname(config.dbname.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .ssl_mode(match config.sslmode {
                SslMode::Disable => tokio_postgres::config::SslMode::Disable,
                SslMode::Require | SslMode::VerifyFull => tokio_postgres::config::SslMode::Require,
            });

        let (client, connection) = pg
            .connect(tls_connector(config.sslmode)?)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Database connection terminated");
            }
        });

        Ok(Self {
            client: Mutex::new(Some(Arc::new(client))),
            driver: Mutex::new(Some(driver)),
        })
    }

    fn client(&self) -> Result<Arc<Client>, StoreError> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::Closed)
    }
}

/// `require` encrypts without verifying the server, as libpq does.
fn tls_connector(mode: SslMode) -> Result<MakeTlsConnector, StoreError> {
    let mut builder = TlsConnector::builder();
    if mode != SslMode::VerifyFull {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    builder
        .build()
        .map(MakeTlsConnector::new)
        .map_err(|e| StoreError::Connect(e.to_string()))
}

#[async_trait]
impl CounterStore for PostgresStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.client()?;

        client
            .batch_execute(CREATE_TABLE)
            .await
            .map_err(|e| StoreError::CreateTable(e.to_string()))?;

        let exists: bool = client
            .query_one(ROW_EXISTS, &[])
            .await
            .and_then(|row| row.try_get(0))
            .map_err(|e| StoreError::RowCheck(e.to_string()))?;

        if !exists {
            client
                .execute(INSERT_ROW, &[])
                .await
                .map_err(|e| StoreError::InsertRow(e.to_string()))?;
        }
        Ok(())
    }

    async fn increment(&self) -> Result<(), StoreError> {
        let updated = self
            .client()?
            .execute(INCREMENT, &[])
            .await
            .map_err(|e| StoreError::Update(e.to_string()))?;
        if updated == 0 {
            return Err(StoreError::MissingRow);
        }
        Ok(())
    }

    async fn read(&self) -> Result<i64, StoreError> {
        let row = self
            .client()?
            .query_opt(SELECT_COUNTER, &[])
            .await
            .map_err(|e| StoreError::Select(e.to_string()))?
            .ok_or(StoreError::MissingRow)?;
        let value: i32 = row
            .try_get(0)
            .map_err(|e| StoreError::Select(e.to_string()))?;
        Ok(i64::from(value))
    }

    async fn close(&self) -> Result<(), StoreError> {
        let client = self.client.lock().unwrap_or_else(PoisonError::into_inner).take();
        let driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner).take();

        let outstanding = client.map_or(0, |client| Arc::strong_count(&client) - 1);

        if let Some(driver) = driver {
            if outstanding > 0 {
                tracing::warn!(outstanding, "Closing database connection with statements in flight");
                driver.abort();
            }
            match driver.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(StoreError::Close(e.to_string())),
            }
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// AuthenticationOk followed by ReadyForQuery(idle).
    const HANDSHAKE: &[u8] = b"R\0\0\0\x08\0\0\0\0Z\0\0\0\x05I";

    /// A server that completes the startup handshake, then never answers.
    async fn silent_server() -> PostgresConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(HANDSHAKE).await.unwrap();
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });

        PostgresConfig {
            username: "counter".into(),
            host: "127.0.0.1".into(),
            port,
            dbname: "counters".into(),
            sslmode: SslMode::Disable,
            ..PostgresConfig::default()
        }
    }

    #[tokio::test]
    async fn close_abandons_stuck_statements() {
        let store = Arc::new(PostgresStore::connect(&silent_server().await).await.unwrap());

        let stuck = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.increment().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stuck.is_finished());

        tokio::time::timeout(Duration::from_secs(3), store.close())
            .await
            .expect("close waited on an in-flight statement")
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(3), stuck)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(StoreError::Update(_))));
        assert!(matches!(store.read().await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn idle_close_is_clean() {
        let store = PostgresStore::connect(&silent_server().await).await.unwrap();

        tokio::time::timeout(Duration::from_secs(3), store.close())
            .await
            .unwrap()
            .unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.increment().await, Err(StoreError::Closed)));
    }

    #[test]
    fn every_sslmode_builds_a_connector() {
        for mode in [SslMode::Disable, SslMode::Require, SslMode::VerifyFull] {
            assert!(tls_connector(mode).is_ok());
        }
    }
}
