//! Embedded SQLite key-value store — the default, always-available backend.
//!
//! A single `records` table keyed by (kind, id). Media blobs share the
//! table; everything is bytes at this layer. WAL journal mode keeps
//! concurrent readers cheap.

use async_trait::async_trait;
use boundless_core::error::StorageError;
use boundless_core::storage::{RecordKind, StorageBackend};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// An embedded SQLite storage backend.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Backend(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite storage backend initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                kind        TEXT NOT NULL,
                id          TEXT NOT NULL,
                data        BLOB NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("records table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(format!("kind index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT data FROM records WHERE kind = ?1 AND id = ?2")
            .bind(kind.namespace())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("SELECT failed: {e}")))?;

        match row {
            Some(row) => {
                let data: Vec<u8> = row
                    .try_get("data")
                    .map_err(|e| StorageError::Backend(format!("data column: {e}")))?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, kind: RecordKind, id: &str, data: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO records (kind, id, data, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(kind, id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.namespace())
        .bind(id)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("INSERT failed: {e}")))?;

        Ok(())
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM records WHERE kind = ?1 AND id = ?2")
            .bind(kind.namespace())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self, kind: RecordKind) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT id FROM records WHERE kind = ?1 ORDER BY updated_at DESC")
            .bind(kind.namespace())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("LIST failed: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get("id")
                    .map_err(|e| StorageError::Backend(format!("id column: {e}")))
            })
            .collect()
    }

    async fn size_bytes(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COALESCE(SUM(LENGTH(data)), 0) AS total FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("SIZE failed: {e}")))?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| StorageError::Backend(format!("total column: {e}")))?;

        Ok(total.max(0) as u64)
    }
}
