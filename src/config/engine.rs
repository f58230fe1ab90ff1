// src/config/engine.rs
use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ConfigError;
use crate::ingest::types::StreamConfig;

pub const ENV_CONFIG_PATH: &str = "STREAM_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/stream.toml";

// env overrides
pub const ENV_SUBREDDIT: &str = "SUBREDDIT";
pub const ENV_STREAM_LIMIT: &str = "STREAM_LIMIT";
pub const ENV_HISTORY_CAPACITY: &str = "HISTORY_CAPACITY";
pub const ENV_RECONNECT_DELAY_MS: &str = "RECONNECT_DELAY_MS";

static RE_SUBREDDIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_]{1,20}$").expect("subreddit regex"));

fn default_subreddit() -> String {
    "wallstreetbets".to_string()
}
fn default_true() -> bool {
    true
}
fn default_history_capacity() -> usize {
    crate::store::DEFAULT_HISTORY_CAPACITY
}
fn default_recent_log_capacity() -> usize {
    crate::store::DEFAULT_RECENT_CAPACITY
}
fn default_per_session_limit() -> u64 {
    500
}
fn default_reconnect_delay_ms() -> u64 {
    5_000
}
fn default_max_reconnect_delay_ms() -> u64 {
    60_000
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_receive_timeout_ms() -> u64 {
    90_000
}
fn default_fetch_interval_ms() -> u64 {
    2_000
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_moving_average_window() -> usize {
    crate::rolling::DEFAULT_MOVING_AVERAGE_WINDOW
}
fn default_truncate_chars() -> usize {
    100
}

/// Every tunable of the ingestion engine. All fields are optional in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_subreddit")]
    pub subreddit: String,
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_recent_log_capacity")]
    pub recent_log_capacity: usize,
    /// Items scored per run before the loop stops on its own.
    #[serde(default = "default_per_session_limit")]
    pub per_session_limit: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Consecutive failed reconnects before giving up; 0 = never give up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Longest wait for a single item before the stream counts as stalled.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// How often the Reddit listing is re-fetched while streaming.
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,
    /// Advertised to pollers of the query API.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_moving_average_window")]
    pub moving_average_window: usize,
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            subreddit: default_subreddit(),
            skip_existing: default_true(),
            history_capacity: default_history_capacity(),
            recent_log_capacity: default_recent_log_capacity(),
            per_session_limit: default_per_session_limit(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            receive_timeout_ms: default_receive_timeout_ms(),
            fetch_interval_ms: default_fetch_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            moving_average_window: default_moving_average_window(),
            truncate_chars: default_truncate_chars(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing engine config toml")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config the way the service boots:
    /// 1) $STREAM_CONFIG_PATH (must exist)
    /// 2) config/stream.toml
    /// 3) built-in defaults
    ///
    /// then env overrides, then validation.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var(ENV_SUBREDDIT) {
            self.subreddit = v.trim().trim_start_matches("r/").to_string();
        }
        if let Some(v) = parse_env::<u64>(ENV_STREAM_LIMIT)? {
            self.per_session_limit = v;
        }
        if let Some(v) = parse_env::<usize>(ENV_HISTORY_CAPACITY)? {
            self.history_capacity = v;
        }
        if let Some(v) = parse_env::<u64>(ENV_RECONNECT_DELAY_MS)? {
            self.reconnect_delay_ms = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !RE_SUBREDDIT.is_match(&self.subreddit) {
            return Err(ConfigError::invalid(
                "subreddit",
                format!("'{}' is not a valid subreddit name", self.subreddit),
            ));
        }
        let non_zero = [
            ("history_capacity", self.history_capacity as u64),
            ("recent_log_capacity", self.recent_log_capacity as u64),
            ("per_session_limit", self.per_session_limit),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("moving_average_window", self.moving_average_window as u64),
            ("truncate_chars", self.truncate_chars as u64),
        ];
        for (name, v) in non_zero {
            if v == 0 {
                return Err(ConfigError::invalid(name, "must be > 0"));
            }
        }
        // Polling must be non-zero and faster than the stall timeout.
        if self.fetch_interval_ms == 0 || self.fetch_interval_ms >= self.receive_timeout_ms {
            return Err(ConfigError::invalid(
                "fetch_interval_ms",
                format!(
                    "must be > 0 and below receive_timeout_ms ({})",
                    self.receive_timeout_ms
                ),
            ));
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            source: self.subreddit.clone(),
            skip_existing: self.skip_existing,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}

fn parse_env<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(var, format!("'{raw}' is not a number"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
subreddit = "stocks"
history_capacity = 50
"#,
        )
        .unwrap();
        assert_eq!(cfg.subreddit, "stocks");
        assert_eq!(cfg.history_capacity, 50);
        assert_eq!(cfg.recent_log_capacity, 10);
        assert_eq!(cfg.per_session_limit, 500);
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(cfg.poll_interval_ms, 2000);
        assert_eq!(cfg.moving_average_window, 20);
        assert!(cfg.skip_existing);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacities_and_bad_names() {
        let cfg = EngineConfig {
            history_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "history_capacity"
        ));

        let cfg = EngineConfig {
            subreddit: "no spaces allowed".into(),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = EngineConfig {
            subreddit: String::new(),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fetch_interval_must_fit_inside_receive_timeout() {
        let zero = EngineConfig {
            fetch_interval_ms: 0,
            ..EngineConfig::default()
        };
        let err = zero.validate().unwrap_err();
        assert!(err.to_string().contains("fetch_interval_ms"), "{err}");

        let too_slow = EngineConfig {
            fetch_interval_ms: 90_000,
            receive_timeout_ms: 90_000,
            ..EngineConfig::default()
        };
        assert!(matches!(
            too_slow.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "fetch_interval_ms"
        ));

        let ok = EngineConfig {
            fetch_interval_ms: 500,
            receive_timeout_ms: 1_000,
            ..EngineConfig::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn config_errors_name_the_key() {
        let err = ConfigError::invalid("history_capacity", "must be > 0");
        assert_eq!(err.to_string(), "stream config `history_capacity`: must be > 0");
        let err = ConfigError::MissingVariable("REDDIT_CLIENT_ID".into());
        assert!(err.to_string().starts_with("REDDIT_CLIENT_ID is not set"));
    }

    #[test]
    fn unknown_types_fail_to_parse() {
        assert!(EngineConfig::from_toml_str(r#"history_capacity = "lots""#).is_err());
    }
}
