// src/config/reddit.rs
use std::env;

use super::ConfigError;

pub const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_USER_AGENT: &str = "REDDIT_USER_AGENT";

/// Script-app credentials for the Reddit OAuth API.
#[derive(Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl RedditCredentials {
    /// Read all three `REDDIT_*` variables. Blank values count as missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: required(ENV_CLIENT_ID)?,
            client_secret: required(ENV_CLIENT_SECRET)?,
            user_agent: required(ENV_USER_AGENT)?,
        })
    }
}

// Never print the secret; only its length.
impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret_len", &self.client_secret.len())
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingVariable(var.to_string())),
    }
}
