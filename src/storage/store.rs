use async_trait::async_trait;

use super::types::{ArticlePayload, ArticleRecord, StorageError};

/// Keyed article store the sync pipeline reads from and writes through.
///
/// Implementations enforce uniqueness on `url`. The pipeline never deletes.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Look up the article stored under `url`, if any.
    async fn find_by_url(&self, url: &str) -> Result<Option<ArticleRecord>, StorageError>;

    /// Insert a new article, returning its id.
    ///
    /// # Errors
    ///
    /// [`StorageError::DuplicateUrl`] if an article with the same url exists.
    async fn insert(&self, article: &ArticlePayload) -> Result<i64, StorageError>;

    /// Overwrite every field of article `id` with `article`.
    async fn update(&self, id: i64, article: &ArticlePayload) -> Result<(), StorageError>;

    /// Most recently published articles first, at most `limit` of them.
    async fn recent(&self, limit: i64) -> Result<Vec<ArticleRecord>, StorageError>;
}
