// src/config/mod.rs
pub mod engine;
pub mod reddit;

pub use engine::EngineConfig;
pub use reddit::RedditCredentials;

/// Startup configuration failures. Fatal: the ingestion loop never starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required `REDDIT_*` variable is unset or blank.
    MissingVariable(String),
    /// `key` is a TOML key or an override variable.
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => {
                write!(f, "{var} is not set; reddit credentials are incomplete")
            }
            ConfigError::InvalidValue { key, reason } => write!(f, "stream config `{key}`: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}
