use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another process holds a write lock on the database
    #[error("Database is locked by another process (is a sync already running?)")]
    Locked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("No article with id {0}")]
    NotFound(i64),

    /// Unique constraint on `url` rejected the write
    #[error("An article with url {0} already exists")]
    DuplicateUrl(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Classify a sqlx error, surfacing lock contention and unique violations
    pub(crate) fn from_sqlx(err: sqlx::Error, url: Option<&str>) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                if let Some(url) = url {
                    return StorageError::DuplicateUrl(url.to_string());
                }
            }
        }

        // SQLITE_BUSY (5) and SQLITE_LOCKED (6) only surface as messages
        let message = err.to_string().to_lowercase();
        if message.contains("database is locked") || message.contains("database table is locked")
        {
            return StorageError::Locked;
        }

        StorageError::Database(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A persisted article, keyed by its unique `url`.
///
/// `published_at` and `updated_at` are ISO-8601 UTC timestamps.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ArticleRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub url: String,
    pub published_at: String,
    pub summary: String,
    pub external_id: String,
    pub updated_at: String,
}

/// The write-side shape of an article: everything but the store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticlePayload {
    pub title: String,
    pub content: String,
    pub url: String,
    pub published_at: String,
    pub summary: String,
    pub external_id: String,
    pub updated_at: String,
}

impl ArticlePayload {
    pub(crate) fn into_record(self, id: i64) -> ArticleRecord {
        ArticleRecord {
            id,
            title: self.title,
            content: self.content,
            url: self.url,
            published_at: self.published_at,
            summary: self.summary,
            external_id: self.external_id,
            updated_at: self.updated_at,
        }
    }
}
