//! The sync pipeline: reconciliation of feed items against the article
//! store, and the orchestrator that runs it over a whole feed.

mod reconcile;
mod runner;

pub use reconcile::{
    build_payload, parse_published, reconcile, select_content, try_reconcile, Outcome,
    ReconcileError, SUMMARY_MAX_CHARS,
};
pub use runner::{SyncError, SyncPipeline, SyncProgress, SyncSummary};
