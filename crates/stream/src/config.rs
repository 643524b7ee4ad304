//! Stream configuration
//!
//! Defaults match the dashboard's behavior; a YAML file and the
//! `SCALER_WS_URL` environment variable may override them.

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3000;

/// Environment variable overriding the stream endpoint
pub const WS_URL_ENV: &str = "SCALER_WS_URL";

fn default_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_attempts() -> u32 {
    DEFAULT_RECONNECT_ATTEMPTS
}

fn default_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint of the autoscaler backend
    #[serde(default = "default_url")]
    pub url: String,
    /// Reconnect automatically after an unplanned close
    #[serde(default = "default_true")]
    pub reconnect: bool,
    #[serde(default = "default_attempts")]
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts
    #[serde(default = "default_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Connect as soon as the client is spawned
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect: true,
            max_reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            enabled: true,
        }
    }
}

impl StreamConfig {
    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var(WS_URL_ENV) {
            if !url.trim().is_empty() {
                self.url = url;
            }
        }
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.url)
            .map_err(|e| ConfigError::Invalid(format!("invalid url {}: {}", self.url, e)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "url scheme must be ws or wss, got {}",
                    other
                )))
            }
        }

        if self.reconnect && self.reconnect_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
