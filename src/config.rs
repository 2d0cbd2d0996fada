//! Configuration file parser for ~/.config/stacksync/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Environment variables override file values for the feed url and secrets,
//! so deployments can keep credentials out of the file entirely.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const ENV_FEED_URL: &str = "STACKSYNC_FEED_URL";
pub const ENV_DATABASE_URL: &str = "STACKSYNC_DATABASE_URL";
pub const ENV_SYNC_TOKEN: &str = "STACKSYNC_SYNC_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No feed URL configured: pass --feed-url, set feed_url in the config file or STACKSYNC_FEED_URL")]
    MissingFeedUrl,

    #[error("No database configured: set database_url in the config file or STACKSYNC_DATABASE_URL")]
    MissingDatabaseUrl,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// Built once at start-up and passed down explicitly; nothing reads the
/// environment after [`Config::with_env_overrides`].
///
/// Custom Debug impl masks `database_url` and `server.sync_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed synced when no URL is given on the command line or request.
    pub feed_url: Option<String>,

    /// sqlx SQLite URL, e.g. `sqlite://articles.db`. May carry credentials
    /// for other backends, so it is treated as a secret.
    pub database_url: Option<String>,

    /// Pause between items during a full sync, in milliseconds.
    pub request_delay_ms: u64,

    /// Per-request timeout for feed and page fetches.
    pub request_timeout_secs: u64,

    /// Retries for transient HTTP failures (429, 5xx, truncated bodies).
    pub max_retries: u32,

    /// First retry delay; doubles on each subsequent retry.
    pub retry_base_delay_ms: u64,

    /// Extracted page text must be longer than this to replace feed content.
    pub min_content_chars: usize,

    /// Permit page fetches to localhost and private address ranges.
    pub allow_private_hosts: bool,

    pub user_agent: String,

    pub server: ServerConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP trigger listens on.
    pub bind: String,

    /// When set, `POST /sync` requires `Authorization: Bearer <token>`.
    pub sync_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: None,
            database_url: None,
            request_delay_ms: 1000,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            min_content_chars: crate::content::MIN_CONTENT_CHARS,
            allow_private_hosts: false,
            user_agent: format!("stacksync/{}", env!("CARGO_PKG_VERSION")),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            sync_token: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("feed_url", &self.feed_url)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_delay_ms", &self.request_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("min_content_chars", &self.min_content_chars)
            .field("allow_private_hosts", &self.allow_private_hosts)
            .field("user_agent", &self.user_agent)
            .field("server", &self.server)
            .finish()
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("sync_token", &self.sync_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] = &[
        "feed_url",
        "database_url",
        "request_delay_ms",
        "request_timeout_secs",
        "max_retries",
        "retry_base_delay_ms",
        "min_content_chars",
        "allow_private_hosts",
        "user_agent",
        "server",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::debug!(config = ?config, "Loaded configuration");
        Ok(config)
    }

    /// Apply environment overrides, taking precedence over file values.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_FEED_URL) {
            self.feed_url = Some(url);
        }
        if let Some(url) = non_empty(ENV_DATABASE_URL) {
            self.database_url = Some(url);
        }
        if let Some(token) = non_empty(ENV_SYNC_TOKEN) {
            self.server.sync_token = Some(token);
        }
        self
    }

    /// The feed to sync: the explicit override if given, else the configured one.
    pub fn resolve_feed_url(&self, explicit: Option<&str>) -> Result<String, ConfigError> {
        explicit
            .or(self.feed_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::MissingFeedUrl)
    }

    /// The storage credential. Missing is fatal for any command touching storage.
    pub fn database_url(&self) -> Result<SecretString, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| SecretString::from(url.to_string()))
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    pub fn sync_token(&self) -> Option<SecretString> {
        self.server
            .sync_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(|token| SecretString::from(token.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
