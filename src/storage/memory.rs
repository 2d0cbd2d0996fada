use async_trait::async_trait;
use std::sync::Mutex;

use super::store::ArticleStore;
use super::types::{ArticlePayload, ArticleRecord, StorageError};

/// Process-local [`ArticleStore`] backed by a `Vec`.
///
/// Enforces the same url uniqueness as the SQLite store. Useful for tests
/// and for embedding the pipeline without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ArticleRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored article in insertion order.
    pub fn all(&self) -> Vec<ArticleRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ArticleRecord>> {
        // A poisoned lock only means a panicking test; the data is still usable
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<ArticleRecord>, StorageError> {
        Ok(self.lock().iter().find(|r| r.url == url).cloned())
    }

    async fn insert(&self, article: &ArticlePayload) -> Result<i64, StorageError> {
        let mut records = self.lock();
        if records.iter().any(|r| r.url == article.url) {
            return Err(StorageError::DuplicateUrl(article.url.clone()));
        }
        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        records.push(article.clone().into_record(id));
        Ok(id)
    }

    async fn update(&self, id: i64, article: &ArticlePayload) -> Result<(), StorageError> {
        let mut records = self.lock();
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(StorageError::NotFound(id))?;
        if records.iter().any(|r| r.url == article.url && r.id != id) {
            return Err(StorageError::DuplicateUrl(article.url.clone()));
        }
        records[index] = article.clone().into_record(id);
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ArticleRecord>, StorageError> {
        let mut records = self.all();
        records.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        records.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(records)
    }
}
