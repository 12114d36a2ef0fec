//! Configuration and settings management
//!
//! Loads settings from environment variables and defines tuning constants.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Pause between deletion attempts, in milliseconds
    #[serde(default = "default_deletion_pause_ms")]
    pub deletion_pause_ms: u64,

    /// Path to the log file displayed by the marquee
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// Initial marquee window size, in lines
    #[serde(default = "default_marquee_window")]
    pub marquee_window: usize,

    /// Initial marquee refresh delay, in seconds
    #[serde(default = "default_marquee_delay_secs")]
    pub marquee_delay_secs: u64,

    /// Comma-separated stop words; a match disqualifies a message from forwarding
    #[serde(rename = "stop_words")]
    pub stop_words_str: Option<String>,

    /// Comma-separated key words; when set, forwarded messages must contain one
    #[serde(rename = "key_words")]
    pub key_words_str: Option<String>,

    /// Comma-separated chat IDs watched by the filter-and-forward flow
    #[serde(rename = "source_chats")]
    pub source_chats_str: Option<String>,

    /// Destination chat for forwarded messages
    pub forward_chat_id: Option<i64>,
}

const fn default_deletion_pause_ms() -> u64 {
    500
}

fn default_log_path() -> String {
    "chatsweep.log".to_string()
}

const fn default_marquee_window() -> usize {
    10
}

const fn default_marquee_delay_secs() -> u64 {
    5
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Stop words as configured
    #[must_use]
    pub fn stop_words(&self) -> Vec<String> {
        split_list(self.stop_words_str.as_deref())
    }

    /// Key words as configured
    #[must_use]
    pub fn key_words(&self) -> Vec<String> {
        split_list(self.key_words_str.as_deref())
    }

    /// Returns the set of chat IDs the filter-and-forward flow watches
    #[must_use]
    pub fn source_chats(&self) -> HashSet<i64> {
        split_list(self.source_chats_str.as_deref())
            .iter()
            .filter_map(|id| id.parse::<i64>().ok())
            .collect()
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split([',', ';'])
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Similarity score at or above which two messages count as duplicates
pub const DUPLICATE_SIMILARITY_THRESHOLD: f64 = 0.90;

/// How long a seen message stays in the dedup store
pub const SEEN_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of lines shown by the /latest command
pub const LATEST_LINES: usize = 10;

/// Maximum message length for Telegram with safety margin.
/// Telegram's official limit is 4096; 4000 leaves room for HTML tags.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

// Retry policy for transient Telegram network errors
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum retry attempts for Telegram API operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            deletion_pause_ms: 500,
            log_path: "chatsweep.log".to_string(),
            marquee_window: 10,
            marquee_delay_secs: 5,
            stop_words_str: None,
            key_words_str: None,
            source_chats_str: None,
            forward_chat_id: None,
        }
    }

    #[test]
    fn test_list_parsing() {
        let mut settings = bare_settings();

        settings.stop_words_str = Some("продам, куплю;реклама".to_string());
        let words = settings.stop_words();
        assert_eq!(words, vec!["продам", "куплю", "реклама"]);

        settings.source_chats_str = Some("-100123, abc, 456".to_string());
        let chats = settings.source_chats();
        assert!(chats.contains(&-100_123));
        assert!(chats.contains(&456));
        assert_eq!(chats.len(), 2);
    }

    #[test]
    fn test_empty_lists_default() {
        let settings = bare_settings();
        assert!(settings.stop_words().is_empty());
        assert!(settings.key_words().is_empty());
        assert!(settings.source_chats().is_empty());
    }
}
