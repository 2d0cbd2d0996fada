//! Feed retrieval and parsing.
//!
//! - [`extract`] pulls a single tag's inner text out of an XML fragment
//! - [`parser`] splits RSS text into normalized [`FeedItem`]s
//! - [`fetcher`] retrieves the feed over HTTP with timeout and retry limits
//!
//! # Example
//!
//! ```ignore
//! use stacksync::feed::{parse_feed, FeedSource, HttpFeedSource};
//!
//! let text = source.fetch("https://example.substack.com/feed").await?;
//! let parsed = parse_feed(&text);
//! ```

mod extract;
mod fetcher;
mod parser;

pub use extract::extract;
pub(crate) use fetcher::{is_transient, read_limited_bytes};
pub use fetcher::{build_client, FeedSource, FetchError, FetchSettings, HttpFeedSource};
pub use parser::{parse_feed, FeedItem, ParseResult};
