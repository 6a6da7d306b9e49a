//! Feed configuration, loadable from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.vk.com/method";
pub const DEFAULT_API_VERSION: &str = "5.199";
pub const DEFAULT_LP_VERSION: u32 = 10;
pub const DEFAULT_WAIT_SECS: u64 = 25;
pub const DEFAULT_BACKOFF_SECS: u64 = 10;
pub const DEFAULT_IDLE_WINDOW_SECS: u64 = 30;
pub const DEFAULT_TIMEOUT_SLACK_SECS: u64 = 10;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for sessions and the manager. Every field has a default, so an
/// empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// REST base used for server-descriptor calls.
    pub api_base_url: String,
    pub api_version: String,
    pub lp_version: u32,
    /// How long the server may hold a poll open.
    pub wait_secs: u64,
    /// Fixed delay before retrying after an error or a rejected cursor.
    pub backoff_secs: u64,
    /// Idle window T of the two-phase teardown.
    pub idle_window_secs: u64,
    /// Client-side HTTP timeout is `wait_secs + request_timeout_slack_secs`.
    pub request_timeout_slack_secs: u64,
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            lp_version: DEFAULT_LP_VERSION,
            wait_secs: DEFAULT_WAIT_SECS,
            backoff_secs: DEFAULT_BACKOFF_SECS,
            idle_window_secs: DEFAULT_IDLE_WINDOW_SECS,
            request_timeout_slack_secs: DEFAULT_TIMEOUT_SLACK_SECS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl FeedConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "api_base_url",
                detail: "must not be empty".to_owned(),
            });
        }
        if self.wait_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "wait_secs",
                detail: "must be at least 1".to_owned(),
            });
        }
        if self.backoff_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "backoff_secs",
                detail: "must be at least 1".to_owned(),
            });
        }
        if self.idle_window_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "idle_window_secs",
                detail: "must be at least 1".to_owned(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "channel_capacity",
                detail: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_secs(self.idle_window_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_secs.saturating_add(self.request_timeout_slack_secs))
    }
}
