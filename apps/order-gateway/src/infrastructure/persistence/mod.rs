//! Durable Gateway State
//!
//! Crash-consistent storage of the session row and idempotency records,
//! safe for concurrent access from the dispatch coordinator and the
//! control-channel client. Backed by a single SQLite file opened in WAL
//! mode; every write is committed before the call returns.
//!
//! Idempotency records are append-mostly and never deleted by the
//! gateway. Retention is a deployment concern.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::domain::Session;

// =============================================================================
// Errors
// =============================================================================

/// Errors from state store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database open, query, or write failure.
    #[error("state store error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("corrupt state row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

// =============================================================================
// Port
// =============================================================================

/// Durable key/value store for session identity and idempotency results.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Look up the stored result id for an idempotency key.
    ///
    /// All reads for a given key return the same result id for the
    /// lifetime of the record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    async fn get_idempotent(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert an idempotency record. First writer wins: a second put for
    /// an existing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    async fn put_idempotent(&self, key: &str, result_id: &str) -> Result<(), StoreError>;

    /// Replace the single current session row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    async fn set_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Read the current session row, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure or a corrupt row.
    async fn get_session(&self) -> Result<Option<Session>, StoreError>;
}

// =============================================================================
// SQLite Store
// =============================================================================

/// SQLite-backed state store.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if missing) the database at `database_url` and
    /// initialize the schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the database cannot be opened or the
    /// schema cannot be created.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if let Some(path_part) = database_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!(url = %database_url, "State store opened");

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS idempotency (
                key TEXT PRIMARY KEY,
                result_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                session_id TEXT NOT NULL,
                accounts TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get_idempotent(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT result_id FROM idempotency WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_get::<String, _>("result_id"))
            .transpose()
            .map_err(Into::into)
    }

    async fn put_idempotent(&self, key: &str, result_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO idempotency (key, result_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(key)
        .bind(result_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(key, result_id, "Idempotency record persisted");
        Ok(())
    }

    async fn set_session(&self, session: &Session) -> Result<(), StoreError> {
        let accounts = serde_json::to_string(&session.accounts)?;
        sqlx::query(
            r"
            INSERT INTO session (id, session_id, accounts, updated_at)
            VALUES (0, ?1, ?2, ?3)
            ON CONFLICT (id) DO UPDATE SET
                session_id = excluded.session_id,
                accounts = excluded.accounts,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&session.session_id)
        .bind(accounts)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT session_id, accounts FROM session WHERE id = 0")
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let session_id: String = r.try_get("session_id")?;
            let accounts: String = r.try_get("accounts")?;
            let accounts: Vec<String> = serde_json::from_str(&accounts)?;
            Ok(Session {
                session_id,
                accounts,
            })
        })
        .transpose()
    }
}

// =============================================================================
// Tests
// =============================================================================
