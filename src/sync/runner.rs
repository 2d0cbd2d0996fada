use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::reconcile::{reconcile, Outcome};
use crate::config::Config;
use crate::content::{HttpPageSource, PageSource};
use crate::feed::{build_client, parse_feed, FeedSource, FetchError, FetchSettings, HttpFeedSource};
use crate::storage::ArticleStore;

/// Counters for one sync run.
///
/// Serialized in camelCase for the HTTP trigger
/// (`{"totalProcessed": 3, "newPosts": 1, ...}`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Valid feed items seen; malformed items are not counted
    pub total_processed: usize,
    pub new_posts: usize,
    pub updated_posts: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl SyncSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Inserted => self.new_posts += 1,
            Outcome::Updated => self.updated_posts += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Errored => self.errored += 1,
        }
    }
}

/// Progress events emitted while a run is underway.
#[derive(Debug, Clone)]
pub enum SyncProgress {
    /// Feed fetched and parsed; `dropped` items failed validation
    Started { total: usize, dropped: usize },
    /// One item reconciled (`index` is 1-based)
    Item {
        index: usize,
        total: usize,
        title: String,
        outcome: Outcome,
    },
    Finished(SyncSummary),
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// The feed could not be retrieved at all; nothing was processed
    #[error("Failed to fetch feed {url}: {source}")]
    Feed {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// The sync orchestrator: feed → parse → reconcile each item in order.
///
/// Collaborators are trait objects so the same pipeline serves the CLI, the
/// HTTP trigger and tests.
#[derive(Clone)]
pub struct SyncPipeline {
    feeds: Arc<dyn FeedSource>,
    pages: Arc<dyn PageSource>,
    store: Arc<dyn ArticleStore>,
    request_delay: Duration,
}

impl SyncPipeline {
    pub fn new(
        feeds: Arc<dyn FeedSource>,
        pages: Arc<dyn PageSource>,
        store: Arc<dyn ArticleStore>,
    ) -> Self {
        Self {
            feeds,
            pages,
            store,
            request_delay: Duration::from_secs(1),
        }
    }

    /// Wire the HTTP feed and page sources described by `config` to `store`.
    pub fn from_config(config: &Config, store: Arc<dyn ArticleStore>) -> reqwest::Result<Self> {
        let settings = FetchSettings::from_config(config);

        // The feed URL is operator-supplied; permalinks come from the feed
        // and are held to the private-host rule on every redirect hop.
        let feeds = HttpFeedSource::new(build_client(&config.user_agent, true)?, settings);
        let pages = HttpPageSource::new(
            build_client(&config.user_agent, config.allow_private_hosts)?,
            settings,
        )
        .with_min_content_chars(config.min_content_chars)
        .allow_private_hosts(config.allow_private_hosts);

        Ok(Self::new(Arc::new(feeds), Arc::new(pages), store)
            .with_request_delay(Duration::from_millis(config.request_delay_ms)))
    }

    /// Pause inserted between items during a full sync.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    /// Runs one sync of `feed_url`.
    ///
    /// Items are reconciled strictly one at a time in feed order. With
    /// `full_sync`, every item triggers a page fetch and the pipeline sleeps
    /// for the request delay between items (not after the last one).
    ///
    /// # Errors
    ///
    /// Only [`SyncError::Feed`]: per-item failures are counted in the
    /// summary instead.
    pub async fn run(
        &self,
        feed_url: &str,
        full_sync: bool,
        progress: Option<&mpsc::Sender<SyncProgress>>,
    ) -> Result<SyncSummary, SyncError> {
        tracing::info!(feed = %feed_url, full_sync = full_sync, "Starting sync");

        let text = self
            .feeds
            .fetch(feed_url)
            .await
            .map_err(|source| SyncError::Feed {
                url: feed_url.to_string(),
                source,
            })?;

        let parsed = parse_feed(&text);
        if parsed.skipped > 0 {
            tracing::warn!(
                feed = %feed_url,
                dropped = parsed.skipped,
                "Feed items missing title, link or date were skipped"
            );
        }

        let total = parsed.items.len();
        let mut summary = SyncSummary {
            total_processed: total,
            ..SyncSummary::default()
        };
        notify(
            progress,
            SyncProgress::Started {
                total,
                dropped: parsed.skipped,
            },
        )
        .await;

        for (i, item) in parsed.items.iter().enumerate() {
            let outcome = reconcile(item, full_sync, self.store.as_ref(), self.pages.as_ref()).await;
            summary.record(outcome);

            notify(
                progress,
                SyncProgress::Item {
                    index: i + 1,
                    total,
                    title: item.title.clone(),
                    outcome,
                },
            )
            .await;

            if full_sync && i + 1 < total && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        tracing::info!(
            feed = %feed_url,
            processed = summary.total_processed,
            new = summary.new_posts,
            updated = summary.updated_posts,
            skipped = summary.skipped,
            errored = summary.errored,
            "Sync complete"
        );
        notify(progress, SyncProgress::Finished(summary)).await;

        Ok(summary)
    }
}

async fn notify(progress: Option<&mpsc::Sender<SyncProgress>>, event: SyncProgress) {
    if let Some(tx) = progress {
        if let Err(e) = tx.send(event).await {
            tracing::debug!(error = %e, "Progress receiver dropped");
        }
    }
}
