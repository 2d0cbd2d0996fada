//! Utility functions shared across the pipeline.
//!
//! - **URL validation**: guards outbound page fetches against SSRF
//! - **Text processing**: character-safe truncation and terminal-safe output

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_chars, ELLIPSIS};
pub use url_validator::{validate_fetch_url, UrlValidationError};
