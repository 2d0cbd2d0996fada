use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::content::{clean, PageSource};
use crate::feed::FeedItem;
use crate::storage::{ArticlePayload, ArticleStore, StorageError};
use crate::util::truncate_chars;

/// Summaries keep at most this many characters of the description.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// What reconciliation did with one feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Updated,
    /// Already stored with identical content; nothing written
    Skipped,
    /// A storage call failed or the item could not be converted
    Errored,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Lookup failed: {0}")]
    Lookup(#[source] StorageError),
    #[error("Insert failed: {0}")]
    Insert(#[source] StorageError),
    #[error("Update failed: {0}")]
    Update(#[source] StorageError),
    #[error("Unparseable publish date: {0:?}")]
    InvalidDate(String),
}

/// Reconciles one feed item against the store.
///
/// Failures are logged and reported as [`Outcome::Errored`]; they never
/// propagate, so one bad item cannot stop a run.
pub async fn reconcile(
    item: &FeedItem,
    full_sync: bool,
    store: &dyn ArticleStore,
    pages: &dyn PageSource,
) -> Outcome {
    match try_reconcile(item, full_sync, store, pages).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(url = %item.link, error = %e, "Failed to reconcile feed item");
            Outcome::Errored
        }
    }
}

/// Fallible core of [`reconcile`].
///
/// 1. parse the publication date; an unparsable one ends the item here,
///    before any storage or network work
/// 2. look up the stored article by link
/// 3. pick the longest of description, fetched page (full sync only) and
///    encoded content
/// 4. insert when new; update when forced or the content changed
pub async fn try_reconcile(
    item: &FeedItem,
    full_sync: bool,
    store: &dyn ArticleStore,
    pages: &dyn PageSource,
) -> Result<Outcome, ReconcileError> {
    let published_at = parse_published(&item.published_at)?;

    let existing = store
        .find_by_url(&item.link)
        .await
        .map_err(ReconcileError::Lookup)?;

    let fetched = if full_sync {
        Some(pages.fetch_body(&item.link).await)
    } else {
        None
    };
    let content = select_content(
        &item.description,
        fetched.as_deref(),
        item.encoded_content.as_deref(),
    );

    let payload = assemble_payload(item, content, published_at, Utc::now());

    match existing {
        None => {
            let id = store
                .insert(&payload)
                .await
                .map_err(ReconcileError::Insert)?;
            tracing::debug!(id = id, url = %item.link, "Inserted article");
            Ok(Outcome::Inserted)
        }
        Some(record) if full_sync || record.content != payload.content => {
            store
                .update(record.id, &payload)
                .await
                .map_err(ReconcileError::Update)?;
            tracing::debug!(id = record.id, url = %item.link, forced = full_sync, "Updated article");
            Ok(Outcome::Updated)
        }
        Some(record) => {
            tracing::trace!(id = record.id, url = %item.link, "Content unchanged");
            Ok(Outcome::Skipped)
        }
    }
}

/// Chooses the article body among competing sources.
///
/// Starts from the description; fetched page text replaces it when strictly
/// longer, then sanitized encoded content replaces the current pick when
/// strictly longer. Length alone decides, so encoded content can beat a
/// fetched page.
pub fn select_content(
    description: &str,
    fetched_page: Option<&str>,
    encoded_content: Option<&str>,
) -> String {
    let mut candidate = description.to_string();

    if let Some(page) = fetched_page {
        if page.chars().count() > candidate.chars().count() {
            candidate = page.to_string();
        }
    }

    if let Some(encoded) = encoded_content {
        let encoded = clean(encoded);
        if encoded.chars().count() > candidate.chars().count() {
            candidate = encoded;
        }
    }

    candidate
}

/// Builds the stored representation of `item` with the chosen `content`.
pub fn build_payload(
    item: &FeedItem,
    content: String,
    now: DateTime<Utc>,
) -> Result<ArticlePayload, ReconcileError> {
    let published_at = parse_published(&item.published_at)?;
    Ok(assemble_payload(item, content, published_at, now))
}

fn assemble_payload(
    item: &FeedItem,
    content: String,
    published_at: String,
    now: DateTime<Utc>,
) -> ArticlePayload {
    ArticlePayload {
        title: item.title.clone(),
        content,
        url: item.link.clone(),
        published_at,
        summary: truncate_chars(&item.description, SUMMARY_MAX_CHARS).into_owned(),
        external_id: item.external_id.clone(),
        updated_at: to_iso8601(now),
    }
}

/// Parses an RSS `pubDate` (RFC 2822, or RFC 3339 as some feeds emit) into
/// an ISO-8601 UTC timestamp with millisecond precision.
pub fn parse_published(raw: &str) -> Result<String, ReconcileError> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| to_iso8601(dt.with_timezone(&Utc)))
        .map_err(|_| ReconcileError::InvalidDate(raw.to_string()))
}

fn to_iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ArticleRecord, MemoryStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Page source returning fixed text and counting calls.
    struct StubPages {
        body: String,
        calls: AtomicUsize,
    }

    impl StubPages {
        fn new(body: &str) -> Self {
            Self {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSource for StubPages {
        async fn fetch_body(&self, _url: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body.clone()
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl ArticleStore for ReadOnlyStore {
        async fn find_by_url(&self, _url: &str) -> Result<Option<ArticleRecord>, StorageError> {
            Ok(None)
        }
        async fn insert(&self, _article: &ArticlePayload) -> Result<i64, StorageError> {
            Err(StorageError::Locked)
        }
        async fn update(&self, _id: i64, _article: &ArticlePayload) -> Result<(), StorageError> {
            Err(StorageError::Locked)
        }
        async fn recent(&self, _limit: i64) -> Result<Vec<ArticleRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn item(description: &str, encoded: Option<&str>) -> FeedItem {
        FeedItem {
            title: "A Post".to_string(),
            link: "https://example.substack.com/p/a-post".to_string(),
            published_at: "Mon, 01 Jan 2024 10:00:00 GMT".to_string(),
            description: description.to_string(),
            encoded_content: encoded.map(str::to_string),
            external_id: "guid-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_skip_when_unchanged() {
        let store = MemoryStore::new();
        let pages = StubPages::new("");
        let item = item("A description", None);

        assert_eq!(reconcile(&item, false, &store, &pages).await, Outcome::Inserted);
        let first = store.all();

        assert_eq!(reconcile(&item, false, &store, &pages).await, Outcome::Skipped);
        // No second write: updated_at untouched
        assert_eq!(store.all(), first);
        assert_eq!(pages.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_encoded_content_preferred_when_longer() {
        let store = MemoryStore::new();
        let pages = StubPages::new("");
        let item = item(
            "short",
            Some("<p>a longer body text exceeding the summary length significantly</p>"),
        );

        reconcile(&item, false, &store, &pages).await;
        let stored = store.find_by_url(&item.link).await.unwrap().unwrap();
        assert_eq!(
            stored.content,
            "a longer body text exceeding the summary length significantly"
        );
        assert_eq!(stored.summary, "short");
    }

    #[tokio::test]
    async fn test_full_sync_forces_update_of_unchanged_content() {
        let store = MemoryStore::new();
        let pages = StubPages::new("");
        let item = item("old", None);

        reconcile(&item, false, &store, &pages).await;
        assert_eq!(reconcile(&item, true, &store, &pages).await, Outcome::Updated);
        assert_eq!(pages.calls.load(Ordering::SeqCst), 1);

        let stored = store.find_by_url(&item.link).await.unwrap().unwrap();
        assert_eq!(stored.content, "old");
    }

    #[tokio::test]
    async fn test_changed_content_updates_without_full_sync() {
        let store = MemoryStore::new();
        let pages = StubPages::new("");

        reconcile(&item("first version", None), false, &store, &pages).await;
        let outcome = reconcile(&item("second, revised version", None), false, &store, &pages).await;
        assert_eq!(outcome, Outcome::Updated);

        let stored = store.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "second, revised version");
    }

    #[tokio::test]
    async fn test_full_sync_uses_fetched_page_when_longest() {
        let store = MemoryStore::new();
        let page = "The complete article as scraped from the live page. ".repeat(5);
        let pages = StubPages::new(&page);
        let item = item("teaser", Some("<p>encoded but shorter</p>"));

        reconcile(&item, true, &store, &pages).await;
        let stored = store.find_by_url(&item.link).await.unwrap().unwrap();
        assert_eq!(stored.content, page);
    }

    #[tokio::test]
    async fn test_failed_page_fetch_falls_back_to_description() {
        let store = MemoryStore::new();
        let pages = StubPages::new("");
        let item = item("the feed description", None);

        assert_eq!(reconcile(&item, true, &store, &pages).await, Outcome::Inserted);
        let stored = store.find_by_url(&item.link).await.unwrap().unwrap();
        assert_eq!(stored.content, "the feed description");
    }

    #[tokio::test]
    async fn test_storage_failure_is_errored() {
        let pages = StubPages::new("");
        let outcome = reconcile(&item("desc", None), false, &ReadOnlyStore, &pages).await;
        assert_eq!(outcome, Outcome::Errored);
    }

    #[tokio::test]
    async fn test_invalid_date_is_errored_without_write() {
        let store = MemoryStore::new();
        let pages = StubPages::new("");
        let mut bad = item("desc", None);
        bad.published_at = "sometime last week".to_string();

        assert_eq!(reconcile(&bad, false, &store, &pages).await, Outcome::Errored);
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_date_skips_page_fetch() {
        let store = MemoryStore::new();
        let pages = StubPages::new(&"page text ".repeat(30));
        let mut bad = item("desc", None);
        bad.published_at = "not a date".to_string();

        let result = try_reconcile(&bad, true, &store, &pages).await;
        assert!(matches!(result, Err(ReconcileError::InvalidDate(_))));
        assert_eq!(pages.calls.load(Ordering::SeqCst), 0);
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_select_content_ties_keep_current() {
        assert_eq!(select_content("abc", Some("xyz"), None), "abc");
        assert_eq!(select_content("abc", None, Some("<b>xyz</b>")), "abc");
    }

    #[test]
    fn test_select_content_encoded_beats_page_when_longer() {
        let chosen = select_content("d", Some("page text"), Some("<p>encoded body text</p>"));
        assert_eq!(chosen, "encoded body text");
    }

    #[test]
    fn test_select_content_counts_chars() {
        // Four chars, twelve bytes, versus five ASCII chars
        assert_eq!(select_content("你好世界", Some("abcde"), None), "abcde");
        assert_eq!(select_content("你好世界", Some("abc"), None), "你好世界");
    }

    #[test]
    fn test_summary_truncated_with_ellipsis() {
        let long = "y".repeat(600);
        let payload = build_payload(&item(&long, None), long.clone(), Utc::now()).unwrap();
        assert_eq!(payload.summary, format!("{}...", "y".repeat(500)));
        assert_eq!(payload.content, long);

        let exact = "z".repeat(500);
        let payload = build_payload(&item(&exact, None), exact.clone(), Utc::now()).unwrap();
        assert_eq!(payload.summary, exact);
    }

    #[test]
    fn test_payload_fields() {
        let now = DateTime::parse_from_rfc3339("2024-03-04T05:06:07.089Z")
            .unwrap()
            .with_timezone(&Utc);
        let payload = build_payload(&item("desc", None), "body".to_string(), now).unwrap();
        assert_eq!(
            payload,
            ArticlePayload {
                title: "A Post".to_string(),
                content: "body".to_string(),
                url: "https://example.substack.com/p/a-post".to_string(),
                published_at: "2024-01-01T10:00:00.000Z".to_string(),
                summary: "desc".to_string(),
                external_id: "guid-1".to_string(),
                updated_at: "2024-03-04T05:06:07.089Z".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_published_formats() {
        assert_eq!(
            parse_published("Tue, 02 Jan 2024 15:30:00 +0100").unwrap(),
            "2024-01-02T14:30:00.000Z"
        );
        assert_eq!(
            parse_published("2024-01-02T14:30:00Z").unwrap(),
            "2024-01-02T14:30:00.000Z"
        );
        assert!(matches!(
            parse_published("not a date"),
            Err(ReconcileError::InvalidDate(_))
        ));
    }
}
