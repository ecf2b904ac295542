//! Cache configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the cache works with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::error::{Result, StoreError};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the three store files.
    /// Env: `CHATCACHE_DATA_DIR`
    /// Default: platform data dir + `cache/` (see [`CacheConfig::default_data_dir`]).
    pub data_dir: PathBuf,

    /// Age after which a sweep drops a cached conversation.
    /// Env: `CHATCACHE_MESSAGES_RETENTION_DAYS`
    /// Default: 360 days.
    pub messages_retention: Duration,

    /// Age after which a sweep drops a chat-list summary.
    /// Env: `CHATCACHE_CHAT_LIST_RETENTION_DAYS`
    /// Default: 30 days.
    pub chat_list_retention: Duration,

    /// Age after which the current-user snapshot is treated as absent.
    /// Env: `CHATCACHE_USER_FRESHNESS_HOURS`
    /// Default: 24 hours.
    pub user_freshness: Duration,

    /// Period of the background sweeper.
    /// Env: `CHATCACHE_SWEEP_INTERVAL_SECS`
    /// Default: 6 hours.
    pub sweep_interval: Duration,

    /// SQLite busy timeout.
    /// Env: `CHATCACHE_BUSY_TIMEOUT_MS`
    /// Default: 5000 ms.
    pub busy_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir().unwrap_or_else(|_| PathBuf::from("./chatcache")),
            messages_retention: DAY * 360,
            chat_list_retention: DAY * 30,
            user_freshness: HOUR * 24,
            sweep_interval: HOUR * 6,
            busy_timeout: Duration::from_millis(5_000),
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at an explicit directory.
    ///
    /// Handy for tests and for embedding the cache in custom layouts.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Platform-appropriate cache directory:
    /// - Linux:   `~/.local/share/chatcache/cache`
    /// - macOS:   `~/Library/Application Support/com.chatcache.chatcache/cache`
    /// - Windows: `{FOLDERID_RoamingAppData}\chatcache\chatcache\data\cache`
    pub fn default_data_dir() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", "chatcache", "chatcache").ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().join("cache"))
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("CHATCACHE_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(d) = parse_duration(&lookup, "CHATCACHE_MESSAGES_RETENTION_DAYS", DAY) {
            config.messages_retention = d;
        }

        if let Some(d) = parse_duration(&lookup, "CHATCACHE_CHAT_LIST_RETENTION_DAYS", DAY) {
            config.chat_list_retention = d;
        }

        if let Some(d) = parse_duration(&lookup, "CHATCACHE_USER_FRESHNESS_HOURS", HOUR) {
            config.user_freshness = d;
        }

        if let Some(d) = parse_duration(
            &lookup,
            "CHATCACHE_SWEEP_INTERVAL_SECS",
            Duration::from_secs(1),
        ) {
            config.sweep_interval = d;
        }

        if let Some(d) = parse_duration(
            &lookup,
            "CHATCACHE_BUSY_TIMEOUT_MS",
            Duration::from_millis(1),
        ) {
            config.busy_timeout = d;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Read `name` as a positive integer count of `unit`s.
fn parse_duration(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    unit: Duration,
) -> Option<Duration> {
    let raw = lookup(name)?;
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Some(unit * n),
        _ => {
            tracing::warn!(variable = name, value = %raw, "Invalid duration, using default");
            None
        }
    }
}
