//! SQLite counter store.
//!
//! A single connection behind a mutex, driven from the blocking pool. The
//! mutex serializes statements; increments stay single `UPDATE`s.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use crate::store::{
    CounterStore, StoreError, CREATE_TABLE, INCREMENT, INSERT_ROW, ROW_EXISTS, SELECT_COUNTER,
};

type Handle = Arc<Mutex<Option<Connection>>>;

/// Counter store backed by a SQLite file or `:memory:`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Handle,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || Connection::open(&path))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let handle = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            let conn = guard.as_ref().ok_or(StoreError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(CREATE_TABLE)
                .map_err(|e| StoreError::CreateTable(e.to_string()))?;

            let exists: bool = conn
                .query_row(ROW_EXISTS, [], |row| row.get(0))
                .map_err(|e| StoreError::RowCheck(e.to_string()))?;

            if !exists {
                conn.execute(INSERT_ROW, [])
                    .map_err(|e| StoreError::InsertRow(e.to_string()))?;
            }
            Ok(())
        })
        .await
    }

    async fn increment(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(INCREMENT, [])
                .map_err(|e| StoreError::Update(e.to_string()))?;
            if updated == 0 {
                return Err(StoreError::MissingRow);
            }
            Ok(())
        })
        .await
    }

    async fn read(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(SELECT_COUNTER, [], |row| row.get::<_, i64>(0))
                .optional()
                .map_err(|e| StoreError::Select(e.to_string()))?
                .ok_or(StoreError::MissingRow)
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        let handle = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = handle.lock().unwrap_or_else(PoisonError::into_inner).take();
            match conn {
                Some(conn) => conn.close().map_err(|(_, e)| StoreError::Close(e.to_string())),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh() -> SqliteStore {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn schema_starts_at_zero_and_is_idempotent() {
        let store = fresh().await;
        store.increment().await.unwrap();
        store.ensure_schema().await.unwrap();
        assert_eq!(store.read().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_row_is_an_error() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store
            .with_conn(|conn| conn.execute_batch(CREATE_TABLE).map_err(|e| StoreError::CreateTable(e.to_string())))
            .await
            .unwrap();

        assert!(matches!(store.increment().await, Err(StoreError::MissingRow)));
        assert!(matches!(store.read().await, Err(StoreError::MissingRow)));
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = fresh().await;
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment().await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.read().await.unwrap(), 64);
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let store = fresh().await;
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.read().await, Err(StoreError::Closed)));
        assert!(matches!(store.ensure_schema().await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn file_database_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.db");
        let path = path.to_str().unwrap();

        let store = SqliteStore::open(path).await.unwrap();
        store.ensure_schema().await.unwrap();
        store.increment().await.unwrap();
        store.close().await.unwrap();

        let reopened = SqliteStore::open(path).await.unwrap();
        reopened.ensure_schema().await.unwrap();
        assert_eq!(reopened.read().await.unwrap(), 1);
    }
}
