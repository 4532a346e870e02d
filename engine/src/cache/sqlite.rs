//! SQLite persistence for the cache
//!
//! One table, `cache (key TEXT PRIMARY KEY, value TEXT)`, where `value` is
//! the JSON-serialized entry. Uses sqlx with WAL mode for better concurrency.
//! Upserts are idempotent, so re-persisting the same entries is harmless.

use crate::cache::entry::CacheEntry;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed cache store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a cache database at the given path.
    ///
    /// Enables WAL mode and runs the schema migration. SQLite recovers any
    /// uncommitted WAL automatically on reopen after an unclean shutdown.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Opening cache database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create cache directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to cache database")?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql("CREATE TABLE IF NOT EXISTS cache (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&self.pool)
            .await
            .context("Failed to create cache table")?;
        debug!("Cache schema ready");
        Ok(())
    }

    /// Load every entry in the store, keyed by cache key
    pub async fn load_all(&self) -> Result<HashMap<String, CacheEntry>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM cache")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read cache entries")?;

        let mut entries = HashMap::with_capacity(rows.len());
        for (key, value) in rows {
            let entry: CacheEntry = serde_json::from_str(&value)
                .with_context(|| format!("Corrupt cache entry under key {}", key))?;
            entries.insert(key, entry);
        }
        debug!("Loaded {} cache entries", entries.len());
        Ok(entries)
    }

    /// Upsert a single entry
    pub async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let value = serde_json::to_string(entry).context("Failed to serialize cache entry")?;
        sqlx::query("INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .context("Failed to write cache entry")?;
        Ok(())
    }

    /// Upsert a batch of entries in one transaction
    pub async fn put_many(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.context("Failed to begin tx")?;
        for (key, entry) in entries {
            let value = serde_json::to_string(entry).context("Failed to serialize cache entry")?;
            sqlx::query("INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .context("Failed to write cache entry")?;
        }
        tx.commit().await.context("Failed to commit cache batch")?;
        debug!("Persisted {} cache entries", entries.len());
        Ok(())
    }

    /// Number of entries in the store
    pub async fn len(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cache entries")?;
        Ok(count.0)
    }

    /// Checkpoint the WAL and close all connections.
    ///
    /// Should be called during graceful shutdown so everything lands in the
    /// main database file.
    pub async fn close(self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;
        self.pool.close().await;
        info!("Cache database closed");
        Ok(())
    }
}
