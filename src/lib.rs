//! Sync a Substack RSS feed into an article store.
//!
//! The pipeline fetches the feed, extracts items with a tolerant regex
//! scanner, optionally scrapes each post page for its full body, and
//! reconciles every item against the store (insert, update or skip).
//! [`sync::SyncPipeline`] is the entry point; the `stacksync` binary and
//! [`server`] are thin adapters over it.

pub mod config;
pub mod content;
pub mod feed;
pub mod server;
pub mod storage;
pub mod sync;
pub mod util;
