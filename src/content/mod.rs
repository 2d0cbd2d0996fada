//! Article body handling: markup sanitization and full-page enrichment.
//!
//! - [`sanitize`] turns feed HTML into plain text
//! - [`strategy`] holds the ordered extraction strategies for post pages
//! - [`page`] fetches post pages and runs the strategy chain, degrading to
//!   an empty body on any failure

mod page;
mod sanitize;
mod strategy;

pub use page::{ContentError, HttpPageSource, PageSource, MIN_CONTENT_CHARS};
pub use sanitize::clean;
pub use strategy::{extract_article_body, ExtractionStrategy, STRATEGIES};
