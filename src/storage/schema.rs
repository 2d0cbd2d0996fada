use secrecy::{ExposeSecret, SecretString};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StorageError;

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed [`ArticleStore`](super::ArticleStore).
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Connect to the database named by `url` and run migrations.
    ///
    /// Accepts any sqlx SQLite URL (`sqlite://articles.db`,
    /// `sqlite::memory:`). The file is created if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Locked` if another process holds the database
    /// lock, `StorageError::Migration` if the schema could not be applied.
    pub async fn connect(url: &SecretString) -> Result<Self, StorageError> {
        let url = url.expose_secret();

        // busy_timeout=5000: wait up to 5 seconds for a competing writer
        // (e.g. a CLI run overlapping a server-triggered one).
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::from_sqlx(e, None))?
            .create_if_missing(true)
            .pragma("busy_timeout", "5000");

        // Each in-memory connection is its own database, so the pool must
        // hold exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::from_sqlx(e, None))?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| match StorageError::from_sqlx(e, None) {
            StorageError::Locked => StorageError::Locked,
            other => StorageError::Migration(other.to_string()),
        })?;
        Ok(db)
    }

    /// Open an empty in-memory database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::connect(&SecretString::from("sqlite::memory:".to_string())).await
    }

    /// Apply the schema inside a single transaction. Every statement is
    /// idempotent, so re-running on an existing database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                published_at TEXT NOT NULL,
                summary TEXT NOT NULL,
                external_id TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // recent() orders by publish date
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_external_id ON articles(external_id)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!("Database schema up to date");
        Ok(())
    }
}
