use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::strategy::extract_article_body;
use crate::feed::{is_transient, read_limited_bytes, FetchError, FetchSettings};
use crate::util::validate_fetch_url;

const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Default minimum length for extracted text to count as an article body.
pub const MIN_CONTENT_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Refusing to fetch {0}")]
    InvalidUrl(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
}

impl ContentError {
    /// Returns true if this error is transient and the request should be
    /// retried. Mirrors [`FetchError::is_retryable`].
    fn is_retryable(&self) -> bool {
        match self {
            ContentError::Network(e) => is_transient(e),
            ContentError::Timeout(_) | ContentError::IncompleteResponse { .. } => true,
            ContentError::HttpStatus(status) => *status == 429 || *status >= 500,
            ContentError::InvalidUrl(_)
            | ContentError::ResponseTooLarge(_)
            | ContentError::InvalidUtf8 => false,
        }
    }
}

impl From<FetchError> for ContentError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(e) => ContentError::Network(e),
            FetchError::HttpStatus(status) => ContentError::HttpStatus(status),
            FetchError::Timeout(after) => ContentError::Timeout(after),
            FetchError::RateLimited(_) => ContentError::HttpStatus(429),
            FetchError::ResponseTooLarge(limit) => ContentError::ResponseTooLarge(limit),
            FetchError::IncompleteResponse { expected, received } => {
                ContentError::IncompleteResponse { expected, received }
            }
            FetchError::InvalidUtf8 => ContentError::InvalidUtf8,
        }
    }
}

/// Best-effort source of full post bodies.
///
/// Implementations never fail: an empty string means "nothing better than
/// what the feed already had".
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_body(&self, url: &str) -> String;
}

/// Scrapes post pages over HTTP and runs the extraction strategy chain.
#[derive(Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    settings: FetchSettings,
    min_content_chars: usize,
    allow_private_hosts: bool,
}

impl HttpPageSource {
    pub fn new(client: reqwest::Client, settings: FetchSettings) -> Self {
        Self {
            client,
            settings,
            min_content_chars: MIN_CONTENT_CHARS,
            allow_private_hosts: false,
        }
    }

    pub fn with_min_content_chars(mut self, min_content_chars: usize) -> Self {
        self.min_content_chars = min_content_chars;
        self
    }

    /// Allow fetching from localhost and private ranges (tests, intranet mirrors).
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Fetches the raw HTML of a post page.
    pub async fn fetch_html(&self, url: &str) -> Result<String, ContentError> {
        let parsed = validate_fetch_url(url, self.allow_private_hosts)
            .map_err(|e| ContentError::InvalidUrl(format!("{url}: {e}")))?;

        let mut retry_count = 0;
        loop {
            match self.fetch_once(parsed.as_str()).await {
                Ok(html) => return Ok(html),
                Err(e) if e.is_retryable() && retry_count < self.settings.max_retries => {
                    let delay = self.settings.backoff(retry_count);
                    tracing::debug!(
                        url = %url,
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying page fetch after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, ContentError> {
        let timeout = self.settings.timeout;
        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| ContentError::Timeout(timeout))??;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_PAGE_SIZE, timeout).await?;
        String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_body(&self, url: &str) -> String {
        let html = match self.fetch_html(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Page fetch failed, keeping feed content");
                return String::new();
            }
        };

        match extract_article_body(&html, self.min_content_chars) {
            Some((strategy, text)) => {
                tracing::debug!(
                    url = %url,
                    strategy = strategy,
                    chars = text.chars().count(),
                    "Extracted article body"
                );
                text
            }
            None => {
                tracing::info!(url = %url, "No substantial content found on page");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_source() -> HttpPageSource {
        HttpPageSource::new(
            reqwest::Client::new(),
            FetchSettings {
                timeout: Duration::from_secs(5),
                max_retries: 2,
                retry_base_delay: Duration::from_millis(5),
            },
        )
        .allow_private_hosts(true)
    }

    fn post_page(body: &str) -> String {
        format!(
            r#"<!DOCTYPE html><html><head><title>Post</title></head><body>
            <nav>Home | Archive | About</nav>
            <div class="available-content"><div class="body markup"><p>{body}</p></div></div>
            </body></html>"#
        )
    }

    #[tokio::test]
    async fn test_fetch_body_success() {
        let mock_server = MockServer::start().await;
        let body = "This is the full text of the post. ".repeat(10);
        Mock::given(method("GET"))
            .and(path("/p/post"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(post_page(&body))
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let text = test_source()
            .fetch_body(&format!("{}/p/post", mock_server.uri()))
            .await;
        assert_eq!(text, body.trim());
    }

    #[tokio::test]
    async fn test_fetch_body_404_is_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let text = test_source()
            .fetch_body(&format!("{}/p/missing", mock_server.uri()))
            .await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_fetch_body_500_retried_then_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // Initial request + 2 retries
            .mount(&mock_server)
            .await;

        let text = test_source()
            .fetch_body(&format!("{}/p/broken", mock_server.uri()))
            .await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_fetch_body_unreachable_is_empty() {
        let text = test_source().fetch_body("http://127.0.0.1:9/p/post").await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_fetch_body_thin_page_is_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(post_page("Paywalled.")))
            .mount(&mock_server)
            .await;

        let text = test_source()
            .fetch_body(&format!("{}/p/paywalled", mock_server.uri()))
            .await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_private_hosts_refused_by_default() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(post_page(&"x".repeat(500))))
            .expect(0)
            .mount(&mock_server)
            .await;

        let source = test_source().allow_private_hosts(false);
        let result = source
            .fetch_html(&format!("{}/p/post", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(ContentError::InvalidUrl(_))));
        assert_eq!(source.fetch_body("not-a-url").await, "");
    }

    #[tokio::test]
    async fn test_redirect_hops_are_validated() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/post"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/admin", mock_server.uri())),
            )
            .expect(2) // One per call: a refused redirect is not retried
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/p/metadata"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "http://169.254.169.254/latest/meta-data/"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin"))
            .respond_with(ResponseTemplate::new(200).set_body_string(post_page(&"x".repeat(500))))
            .expect(0)
            .mount(&mock_server)
            .await;

        // The first hop stands in for a public permalink; only the redirect
        // targets are subject to the private-host rule.
        let source = HttpPageSource::new(
            crate::feed::build_client("stacksync-test", false).unwrap(),
            FetchSettings {
                timeout: Duration::from_secs(5),
                max_retries: 2,
                retry_base_delay: Duration::from_millis(5),
            },
        )
        .allow_private_hosts(true);

        match source.fetch_html(&format!("{}/p/post", mock_server.uri())).await {
            Err(ContentError::Network(e)) => assert!(e.is_redirect()),
            other => panic!("Expected refused redirect, got {:?}", other),
        }
        match source.fetch_html(&format!("{}/p/metadata", mock_server.uri())).await {
            Err(ContentError::Network(e)) => assert!(e.is_redirect()),
            other => panic!("Expected refused redirect, got {:?}", other),
        }
        assert_eq!(
            source.fetch_body(&format!("{}/p/post", mock_server.uri())).await,
            ""
        );
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(post_page("Short but enough.")))
            .mount(&mock_server)
            .await;

        let text = test_source()
            .with_min_content_chars(5)
            .fetch_body(&format!("{}/p/short", mock_server.uri()))
            .await;
        assert_eq!(text, "Short but enough.");
    }
}
