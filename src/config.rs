//! Configuration module for feedrelay.

use serde::Deserialize;
use std::path::Path;

use crate::{RelayError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/feedrelay.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Fetcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Whether the fetch loop runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interval between fetch cycles in seconds.
    #[serde(default = "default_fetch_interval")]
    pub interval_secs: u64,
    /// Maximum items considered per feed per cycle.
    #[serde(default = "default_max_items")]
    pub max_items_per_feed: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Only keep items mentioning one of these keywords (empty = keep all).
    #[serde(default)]
    pub filter_keywords: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_fetch_interval() -> u64 {
    60 // 1 minute
}

fn default_max_items() -> usize {
    100
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_fetch_interval(),
            max_items_per_feed: default_max_items(),
            max_feed_size_bytes: default_max_feed_size(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            filter_keywords: vec![],
        }
    }
}

/// Notifier configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Whether the notify loop runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interval between notify cycles in seconds.
    #[serde(default = "default_notify_interval")]
    pub interval_secs: u64,
    /// Timezone used for the publish time in messages (e.g., "UTC", "Europe/Moscow").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_notify_interval() -> u64 {
    10
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_notify_interval(),
            timezone: default_timezone(),
        }
    }
}

/// Telegram delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token (must be set unless dry_run is enabled).
    #[serde(default)]
    pub token: String,
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Log messages instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_api_base(),
            dry_run: false,
        }
    }
}

/// A source seeded into the catalog at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSeed {
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Priority (higher is polled first).
    #[serde(default)]
    pub priority: i64,
}

/// A subscriber seeded into the directory at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberSeed {
    /// Chat identity.
    pub chat_id: i64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Names of the seeded sources this subscriber follows.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Fetcher configuration.
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Notifier configuration.
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Telegram configuration.
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Sources to ensure at startup.
    #[serde(default)]
    pub sources: Vec<SourceSeed>,
    /// Subscribers to ensure at startup.
    #[serde(default)]
    pub subscribers: Vec<SubscriberSeed>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDRELAY_TELEGRAM_TOKEN`: Override the bot token
    /// - `TELEGRAM_TOKEN`: Used when the above is not set
    pub fn apply_env_overrides(&mut self) {
        let token = std::env::var("FEEDRELAY_TELEGRAM_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("TELEGRAM_TOKEN").ok().filter(|t| !t.is_empty()));
        if let Some(token) = token {
            self.telegram.token = token;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.telegram.dry_run && self.telegram.token.is_empty() {
            return Err(RelayError::Validation(
                "telegram token is not set. \
                 Set it in config.toml or via FEEDRELAY_TELEGRAM_TOKEN, or enable dry_run."
                    .to_string(),
            ));
        }
        if self.fetcher.interval_secs == 0 {
            return Err(RelayError::Validation(
                "fetcher.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.notifier.interval_secs == 0 {
            return Err(RelayError::Validation(
                "notifier.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.notifier.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(RelayError::Validation(format!(
                "unknown timezone: {}",
                self.notifier.timezone
            )));
        }
        for subscriber in &self.subscribers {
            for name in &subscriber.sources {
                if !self.sources.iter().any(|s| &s.name == name) {
                    return Err(RelayError::Validation(format!(
                        "subscriber {} follows unknown source: {}",
                        subscriber.chat_id, name
                    )));
                }
            }
        }
        Ok(())
    }
}
