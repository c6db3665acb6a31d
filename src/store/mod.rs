//! Counter store subsystem.
//!
//! # Data Flow
//! ```text
//! GET / (api tier)
//!     → CounterAccessor::increment  (UPDATE ... SET counter = counter + 1)
//!     → CounterAccessor::read       (SELECT counter ...)
//!     → timings into db_operation_duration_seconds
//!     → backend: postgres.rs | sqlite.rs
//! ```
//!
//! # Design Decisions
//! - One table, one row keyed by `id = 0`
//! - Increment is a single atomic statement, never read-modify-write in memory
//! - Increment and read are separate statements without a transaction: a
//!   read failure after a successful increment still fails the request
//! - No retries; every failure surfaces immediately

pub mod postgres;
pub mod sqlite;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};
use crate::observability::{GoldenSignals, Observation};

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Key of the single counter row.
pub const COUNTER_ID: i32 = 0;

pub(crate) const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS counters (
    id integer PRIMARY KEY,
    counter integer NOT NULL DEFAULT 0
)";
pub(crate) const ROW_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM counters WHERE id = 0)";
pub(crate) const INSERT_ROW: &str =
    "INSERT INTO counters (id, counter) VALUES (0, 0) ON CONFLICT (id) DO NOTHING";
pub(crate) const INCREMENT: &str = "UPDATE counters SET counter = counter + 1 WHERE id = 0";
pub(crate) const SELECT_COUNTER: &str = "SELECT counter FROM counters WHERE id = 0";

/// Errors raised by counter store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to connect to database: {0}")]
    Connect(String),

    #[error("error while creating table: {0}")]
    CreateTable(String),

    #[error("error checking if row exists: {0}")]
    RowCheck(String),

    #[error("error while inserting first row: {0}")]
    InsertRow(String),

    #[error("error while updating counter: {0}")]
    Update(String),

    #[error("error while getting counter: {0}")]
    Select(String),

    #[error("counter row {} does not exist", COUNTER_ID)]
    MissingRow,

    #[error("error while closing store: {0}")]
    Close(String),

    #[error("store handle is closed")]
    Closed,

    #[error("store worker failed: {0}")]
    Worker(String),
}

/// A relational backend holding the counter row.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Create the table if absent and insert the counter row if missing. Idempotent.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Add one to the counter in a single statement.
    async fn increment(&self) -> Result<(), StoreError>;

    /// Current counter value.
    async fn read(&self) -> Result<i64, StoreError>;

    /// Release the handle. Later operations fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;

    /// Backend name, for logs.
    fn backend(&self) -> &'static str;
}

/// Connect to the configured backend.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    let store: Arc<dyn CounterStore> = match config.backend {
        StoreBackend::Postgres => Arc::new(PostgresStore::connect(&config.postgres).await?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.sqlite.path).await?),
    };
    tracing::info!(backend = store.backend(), "Successfully connected to database");
    Ok(store)
}

/// Store access with per-operation timing.
#[derive(Clone)]
pub struct CounterAccessor {
    store: Arc<dyn CounterStore>,
    signals: Arc<GoldenSignals>,
}

impl CounterAccessor {
    pub fn new(store: Arc<dyn CounterStore>, signals: Arc<GoldenSignals>) -> Self {
        Self { store, signals }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.timed("init_table", self.store.ensure_schema()).await
    }

    pub async fn increment(&self) -> Result<(), StoreError> {
        self.timed("update_counter", self.store.increment()).await
    }

    pub async fn read(&self) -> Result<i64, StoreError> {
        self.timed("get_counter", self.store.read()).await
    }

    /// Close the underlying handle and mark the connection down.
    pub async fn close(&self) -> Result<(), StoreError> {
        let result = self.store.close().await;
        self.signals.observe(Observation::DbConnection { connected: false });
        result
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.signals.observe(Observation::DbOperation {
            operation,
            elapsed: start.elapsed(),
        });
        result
    }
}

impl std::fmt::Debug for CounterAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterAccessor")
            .field("backend", &self.store.backend())
            .finish()
    }
}
