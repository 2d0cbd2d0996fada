use async_trait::async_trait;

use super::schema::Database;
use super::store::ArticleStore;
use super::types::{ArticlePayload, ArticleRecord, StorageError};

/// Hard cap on rows returned by `recent` (OOM protection)
const MAX_RECENT: i64 = 1000;

const ARTICLE_COLUMNS: &str =
    "id, title, content, url, published_at, summary, external_id, updated_at";

#[async_trait]
impl ArticleStore for Database {
    async fn find_by_url(&self, url: &str) -> Result<Option<ArticleRecord>, StorageError> {
        let record = sqlx::query_as::<_, ArticleRecord>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx(e, None))?;

        Ok(record)
    }

    async fn insert(&self, article: &ArticlePayload) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (title, content, url, published_at, summary, external_id, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.url)
        .bind(&article.published_at)
        .bind(&article.summary)
        .bind(&article.external_id)
        .bind(&article.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx(e, Some(&article.url)))?;

        Ok(result.last_insert_rowid())
    }

    async fn update(&self, id: i64, article: &ArticlePayload) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE articles SET
                title = ?,
                content = ?,
                url = ?,
                published_at = ?,
                summary = ?,
                external_id = ?,
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.url)
        .bind(&article.published_at)
        .bind(&article.summary)
        .bind(&article.external_id)
        .bind(&article.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx(e, Some(&article.url)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ArticleRecord>, StorageError> {
        let limit = limit.clamp(0, MAX_RECENT);
        let records = sqlx::query_as::<_, ArticleRecord>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY published_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx(e, None))?;

        Ok(records)
    }
}
