//! Configuration file parser for `tickerpulse.toml`.
//!
//! The config file is optional and a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but logged as a warning since they are
//! usually typos.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::enrich::TickerMetadata;
use crate::feed::{ContentFilter, FeedSource, FilterError};

// ============================================================================
// Defaults
// ============================================================================

/// Sources substituted when the configured list is empty.
pub const DEFAULT_SOURCES: [&str; 4] = ["stocks", "investing", "wallstreetbets", "finance"];

pub const DEFAULT_QUERY: &str = "stocks OR finance OR investing";

pub const DEFAULT_TITLE_PATTERNS: [&str; 7] = [
    r"daily.*discussion",
    r"general.*discussion",
    r"advice.*thread",
    r"what.*are.*your.*moves",
    r"weekend.*discussion",
    r"discussion.*thread",
    r"daily.*thread",
];

pub const DEFAULT_KEYWORDS: [&str; 8] = [
    "which niche",
    "wanted to talk to but",
    "career advice",
    "networking",
    "should i",
    "how do i become",
    "resume",
    "job interview",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid filter rule in config file: {0}")]
    Filter(#[from] FilterError),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `:memory:` is accepted for throwaway runs.
    pub database_path: String,

    pub feeds: FeedConfig,

    pub filter: FilterConfig,

    /// Static ticker metadata keyed by uppercase symbol. Empty means the
    /// built-in table is used.
    pub tickers: BTreeMap<String, TickerMetadata>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "tickerpulse.db".to_string(),
            feeds: FeedConfig::default(),
            filter: FilterConfig::default(),
            tickers: BTreeMap::new(),
        }
    }
}

/// Where and how feeds are fetched.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,

    /// Path template appended to `base_url`; `{source}` is replaced by the
    /// source name.
    pub search_path: String,

    pub sources: Vec<String>,

    /// Query used when the caller does not supply one.
    pub default_query: String,

    pub user_agent: String,

    /// Per-request timeout.
    pub timeout_secs: u64,

    /// Upper clamp for the caller-requested result cap.
    pub max_results: usize,

    /// Retries for 429, 5xx and truncated responses. 0 disables retrying.
    pub max_retries: u32,

    /// First backoff delay; doubled on every retry.
    pub retry_base_delay_ms: u64,

    /// Overall budget for the fetch phase of one ingestion call.
    pub ingest_timeout_secs: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.reddit.com".to_string(),
            search_path: "/r/{source}/search.rss".to_string(),
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            default_query: DEFAULT_QUERY.to_string(),
            user_agent: "tickerpulse/0.1".to_string(),
            timeout_secs: 10,
            max_results: 100,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            ingest_timeout_secs: None,
        }
    }
}

impl FeedConfig {
    /// Configured sources, or the default list when none are configured.
    pub fn sources(&self) -> Vec<FeedSource> {
        let names: Vec<&str> = if self.sources.iter().all(|s| s.trim().is_empty()) {
            DEFAULT_SOURCES.to_vec()
        } else {
            self.sources
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect()
        };
        names
            .into_iter()
            .map(|name| FeedSource::new(name, &self.search_path))
            .collect()
    }
}

/// Ordered exclusion rules for the content filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Case-insensitive regular expressions matched against the title.
    pub exclude_titles: Vec<String>,

    /// Case-insensitive substrings matched against title and body.
    pub exclude_keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_titles: DEFAULT_TITLE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Invalid title pattern → `Err(ConfigError::Filter)`
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
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

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["database_path", "feeds", "filter", "tickers"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            sources = config.feeds.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Compile the filter rules once so a bad pattern fails at startup
    /// rather than on the first ingestion call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ContentFilter::from_config(&self.filter)?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
