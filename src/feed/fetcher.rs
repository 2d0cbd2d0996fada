use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::util::validate_fetch_url;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while retrieving the feed.
///
/// Any of these aborts a sync run: without the feed there is nothing to
/// reconcile.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Server kept answering 429 after every retry
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Fewer bytes arrived than the Content-Length announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
}

impl FetchError {
    /// Returns true if this error is transient and the request should be retried.
    ///
    /// Shared by the feed and page fetchers so both follow one retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(e) => is_transient(e),
            FetchError::HttpStatus(status) => *status == 429 || *status >= 500,
            FetchError::Timeout(_) | FetchError::IncompleteResponse { .. } => true,
            FetchError::RateLimited(_)
            | FetchError::ResponseTooLarge(_)
            | FetchError::InvalidUtf8 => false,
        }
    }
}

/// Connection failures and timeouts are worth another attempt; a refused
/// redirect or a malformed request never is.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    !(err.is_redirect() || err.is_builder())
}

/// Timeout and retry policy shared by the feed and page fetchers.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Upper bound on a single request, headers and body included
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Backoff before retry `n` is `retry_base_delay * 2^n`
    pub retry_base_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Builds an HTTP client whose redirects are held to the same URL rules as
/// the first request.
///
/// Every hop goes through [`validate_fetch_url`], so a public permalink
/// cannot bounce the fetcher onto a private address unless
/// `allow_private_hosts` is set.
pub fn build_client(user_agent: &str, allow_private_hosts: bool) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(redirect_policy(allow_private_hosts))
        .build()
}

/// Redirect policy with a hop limit, loop detection and per-hop URL validation.
fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {})", MAX_REDIRECTS));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        if let Err(e) = validate_fetch_url(url.as_str(), allow_private_hosts) {
            tracing::warn!(to = %url, error = %e, "Refusing redirect");
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Source of raw feed text.
///
/// The sync pipeline only depends on this trait, so runs can be driven from
/// HTTP in production and from fixed text in tests.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches feeds over HTTP with timeout, retry and size limits.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client, settings: FetchSettings) -> Self {
        Self { client, settings }
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let timeout = self.settings.timeout;
        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE, timeout).await
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    /// Retrieves the feed body as text.
    ///
    /// - Timeouts, connection failures, truncated bodies, HTTP 429 and 5xx
    ///   are retried with exponential backoff
    /// - Other non-2xx statuses fail immediately
    /// - Bodies over 10MB are rejected
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let settings = &self.settings;
        let mut retry_count = 0;

        let bytes = loop {
            match self.fetch_once(url).await {
                Ok(bytes) => break bytes,
                Err(e) if e.is_retryable() && retry_count < settings.max_retries => {
                    let delay = settings.backoff(retry_count);
                    tracing::warn!(
                        feed = %url,
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient feed error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(FetchError::HttpStatus(429)) => {
                    return Err(FetchError::RateLimited(settings.max_retries))
                }
                Err(e) => return Err(e),
            }
        };

        tracing::debug!(feed = %url, bytes = bytes.len(), "Fetched feed");
        String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)
    }
}

/// Reads a response body, refusing anything over `limit` bytes and flagging
/// bodies cut short of their Content-Length.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let read = async {
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(FetchError::Network)?;
            if bytes.len().saturating_add(chunk.len()) > limit {
                return Err(FetchError::ResponseTooLarge(limit));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    };

    let bytes = tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
