//! Settings file and on-disk layout.
//!
//! Settings live in `settings.conf` under the config directory, one
//! `key = value` per line with `#`, `;`, and `//` comments. Unknown keys
//! and unparsable values are logged and ignored, a broken file never
//! prevents startup.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::ChannelConfig;
use crate::channel::backoff::BackoffPolicy;
use crate::net::channel_url;
use crate::search::SearchConfig;

/// Whether a settings line carries no data (blank or comment).
fn skip_comment_or_empty(line: &str) -> bool {
    line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with("//")
}

/// Split one `key = value` line, trimming both sides.
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();
    if key.is_empty() { None } else { Some((key, value)) }
}

fn set_parsed<T: FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "ignoring unparsable setting"),
    }
}

fn set_bool(slot: &mut bool, key: &str, value: &str) {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => *slot = true,
        "false" | "0" | "no" | "off" => *slot = false,
        _ => warn!(key, value, "ignoring unparsable setting"),
    }
}

/// All tunables of the client, with working defaults for a local server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// REST base URL of the dashboard server.
    pub server_url: String,
    /// First reconnect delay in milliseconds.
    pub reconnect_base_ms: u64,
    /// Reconnect delay cap in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before falling back to polling.
    pub reconnect_max_attempts: u32,
    /// Keepalive ping cadence in seconds.
    pub heartbeat_secs: u64,
    /// Snapshot poll cadence in seconds while in fallback.
    pub poll_secs: u64,
    /// Reconnect probe cadence in seconds while in fallback.
    pub probe_secs: u64,
    /// Search debounce window in milliseconds.
    pub search_debounce_ms: u64,
    /// Minimum trimmed query length.
    pub search_min_len: usize,
    /// Result cap requested per search.
    pub search_max_results: u32,
    /// Whether AI hints are requested.
    pub search_include_ai: bool,
    /// Distinct queries the suggestion cache holds.
    pub cache_capacity: usize,
    /// Cache entry lifetime in seconds, `0` disables expiry.
    pub cache_ttl_secs: u64,
    /// Size of the search history ring.
    pub history_capacity: usize,
    /// Entries shown in the history preview.
    pub history_preview: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            reconnect_base_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            reconnect_max_attempts: 5,
            heartbeat_secs: 30,
            poll_secs: 30,
            probe_secs: 60,
            search_debounce_ms: 300,
            search_min_len: 2,
            search_max_results: 10,
            search_include_ai: true,
            cache_capacity: 64,
            cache_ttl_secs: 0,
            history_capacity: 20,
            history_preview: 5,
        }
    }
}

impl Settings {
    /// What: Read settings from `path`.
    ///
    /// Inputs:
    /// - `path`: Location of `settings.conf`.
    ///
    /// Output: Parsed settings; a missing or unreadable file yields the
    /// defaults.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Parse settings text, keeping the default for every line that does
    /// not parse.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();
        for raw in text.lines() {
            let line = raw.trim();
            if skip_comment_or_empty(line) {
                continue;
            }
            match parse_key_value(line) {
                Some((key, value)) => settings.apply(key, value),
                None => warn!(line, "ignoring malformed settings line"),
            }
        }
        settings
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "server_url" => self.server_url = value.to_string(),
            "reconnect_base_ms" => set_parsed(&mut self.reconnect_base_ms, key, value),
            "reconnect_max_delay_ms" => set_parsed(&mut self.reconnect_max_delay_ms, key, value),
            "reconnect_max_attempts" => set_parsed(&mut self.reconnect_max_attempts, key, value),
            "heartbeat_secs" => set_parsed(&mut self.heartbeat_secs, key, value),
            "poll_secs" => set_parsed(&mut self.poll_secs, key, value),
            "probe_secs" => set_parsed(&mut self.probe_secs, key, value),
            "search_debounce_ms" => set_parsed(&mut self.search_debounce_ms, key, value),
            "search_min_len" => set_parsed(&mut self.search_min_len, key, value),
            "search_max_results" => set_parsed(&mut self.search_max_results, key, value),
            "search_include_ai" => set_bool(&mut self.search_include_ai, key, value),
            "cache_capacity" => set_parsed(&mut self.cache_capacity, key, value),
            "cache_ttl_secs" => set_parsed(&mut self.cache_ttl_secs, key, value),
            "history_capacity" => set_parsed(&mut self.history_capacity, key, value),
            "history_preview" => set_parsed(&mut self.history_preview, key, value),
            _ => debug!(key, "unknown settings key"),
        }
    }

    /// Channel configuration derived from these settings.
    #[must_use]
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: channel_url(&self.server_url),
            backoff: BackoffPolicy::new(
                Duration::from_millis(self.reconnect_base_ms),
                Duration::from_millis(self.reconnect_max_delay_ms),
                self.reconnect_max_attempts,
            ),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            poll_interval: Duration::from_secs(self.poll_secs),
            probe_interval: Duration::from_secs(self.probe_secs),
        }
    }

    /// Search configuration derived from these settings.
    #[must_use]
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            debounce: Duration::from_millis(self.search_debounce_ms),
            min_query_len: self.search_min_len,
            max_results: self.search_max_results,
            include_ai: self.search_include_ai,
            cache_capacity: NonZeroUsize::new(self.cache_capacity).unwrap_or(NonZeroUsize::MIN),
            cache_ttl: if self.cache_ttl_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(self.cache_ttl_secs))
            },
            history_capacity: self.history_capacity,
            history_preview: self.history_preview,
        }
    }
}

fn home_config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".config")
}

/// Default config directory, `$XDG_CONFIG_HOME/shelfwire` or
/// `~/.config/shelfwire`, created on first use.
#[must_use]
pub fn config_dir() -> PathBuf {
    let dir = home_config_dir().join("shelfwire");
    if let Err(err) = std::fs::create_dir_all(&dir) {
        warn!(path = %dir.display(), error = %err, "cannot create config directory");
    }
    dir
}

/// Location of `settings.conf` under `dir`.
#[must_use]
pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join("settings.conf")
}

/// Location of the persisted search history under `dir`.
#[must_use]
pub fn history_path(dir: &Path) -> PathBuf {
    dir.join("search_history.json")
}

/// Log directory under `dir`, created on first use.
#[must_use]
pub fn logs_dir(dir: &Path) -> PathBuf {
    let logs = dir.join("logs");
    if let Err(err) = std::fs::create_dir_all(&logs) {
        warn!(path = %logs.display(), error = %err, "cannot create log directory");
    }
    logs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// What: Comment and blank lines are skipped, `key = value` lines are
    /// split and trimmed.
    ///
    /// - Input: Comment markers and a padded assignment
    /// - Output: Skips and the trimmed pair
    fn config_line_primitives() {
        assert!(skip_comment_or_empty(""));
        assert!(skip_comment_or_empty("# comment"));
        assert!(skip_comment_or_empty("; comment"));
        assert!(skip_comment_or_empty("// comment"));
        assert!(!skip_comment_or_empty("key = value"));

        assert_eq!(
            parse_key_value("server_url =  http://x"),
            Some(("server_url", "http://x"))
        );
        assert_eq!(parse_key_value("no_equals_here"), None);
        assert_eq!(parse_key_value("= value"), None);
    }

    #[test]
    /// What: A settings file overrides only the keys it names.
    ///
    /// - Input: Three overrides plus comments and noise
    /// - Output: Overridden fields changed, everything else default
    fn config_parse_overrides_defaults() {
        let text = "\
# Shelfwire settings
server_url = https://shelf.example
reconnect_max_attempts = 3

; cadence
poll_secs = 10
search_include_ai = no
broken line without equals
cache_ttl_secs = oops
";
        let settings = Settings::parse(text);
        assert_eq!(settings.server_url, "https://shelf.example");
        assert_eq!(settings.reconnect_max_attempts, 3);
        assert_eq!(settings.poll_secs, 10);
        assert!(!settings.search_include_ai);
        assert_eq!(settings.cache_ttl_secs, 0);
        assert_eq!(settings.reconnect_base_ms, 1000);
        assert_eq!(settings.history_capacity, 20);
    }

    #[test]
    /// What: Derived configs carry the settings over, including the zero
    /// TTL and zero capacity edge cases.
    ///
    /// - Input: Defaults plus a TTL, then a zero cache capacity
    /// - Output: Matching channel/search configs, capacity clamped to one
    fn config_derives_channel_and_search() {
        let settings = Settings {
            cache_ttl_secs: 60,
            ..Settings::default()
        };

        let channel = settings.channel_config();
        assert_eq!(channel.url, "ws://127.0.0.1:8000/ws/dashboard");
        assert_eq!(channel.backoff.max_attempts(), 5);
        assert_eq!(channel.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(channel.probe_interval, Duration::from_secs(60));

        let search = settings.search_config();
        assert_eq!(search.debounce, Duration::from_millis(300));
        assert_eq!(search.cache_ttl, Some(Duration::from_secs(60)));

        let clamped = Settings {
            cache_capacity: 0,
            ..Settings::default()
        };
        assert_eq!(clamped.search_config().cache_capacity.get(), 1);
    }
}
