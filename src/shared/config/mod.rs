//! Application configuration module
//!
//! Provides the configuration types for the tracking runtime: endpoint base
//! URLs, timer cadences and reconnection limits. Values come from the builder
//! defaults, an optional TOML file and environment overrides (applied by
//! `driver_app::config::Config`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default tracking channel base URL
pub const DEFAULT_TRACKING_WS_URL: &str = "ws://localhost:8016/deliverydriver/api/v1";
/// Default driver API base URL (bulk position snapshot)
pub const DEFAULT_DRIVER_API_URL: &str = "http://localhost:8016/deliverydriver/api/v1";
/// Default records API base URL (restaurant and customer lookups)
pub const DEFAULT_RECORDS_API_URL: &str = "http://localhost:5000/api";

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Base URL of the tracking WebSocket endpoint
    pub tracking_ws_url: String,
    /// Base URL of the driver API serving the bulk position snapshot
    pub driver_api_url: String,
    /// Base URL of the records API serving restaurants and customers
    pub records_api_url: String,
    /// Location of the local store; `None` means the platform data directory
    pub store_path: Option<PathBuf>,
    /// Timer cadences and limits
    pub tracking: TrackingSettings,
}

/// Timer cadences, backoff limits and sensor options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    pub heartbeat_interval_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub backoff_jitter_ms: u64,
    pub max_reconnect_attempts: u32,
    pub poll_interval_ms: u64,
    /// Upper bound on one records lookup request
    pub request_timeout_ms: u64,
    pub high_accuracy: bool,
    pub sample_max_age_ms: u64,
    pub sample_timeout_ms: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            backoff_jitter_ms: 3_000,
            max_reconnect_attempts: 10,
            poll_interval_ms: 1_000,
            request_timeout_ms: 10_000,
            high_accuracy: true,
            sample_max_age_ms: 1_000,
            sample_timeout_ms: 10_000,
        }
    }
}

impl TrackingSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("heartbeat_interval_ms must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("poll_interval_ms must be positive"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("request_timeout_ms must be positive"));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(ConfigError::InvalidValue("backoff_cap_ms must be >= backoff_base_ms"));
        }
        if self.sample_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("sample_timeout_ms must be positive"));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracking_ws_url: DEFAULT_TRACKING_WS_URL.to_string(),
            driver_api_url: DEFAULT_DRIVER_API_URL.to_string(),
            records_api_url: DEFAULT_RECORDS_API_URL.to_string(),
            store_path: None,
            tracking: TrackingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tracking_ws_url.starts_with("ws://") || self.tracking_ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(self.tracking_ws_url.clone()));
        }
        for url in [&self.driver_api_url, &self.records_api_url] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        self.tracking.validate()
    }
}

/// Shape of the optional TOML configuration file
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    tracking_ws_url: Option<String>,
    driver_api_url: Option<String>,
    records_api_url: Option<String>,
    store_path: Option<PathBuf>,
    tracking: Option<TrackingSettings>,
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    tracking_ws_url: Option<String>,
    driver_api_url: Option<String>,
    records_api_url: Option<String>,
    store_path: Option<PathBuf>,
    tracking: Option<TrackingSettings>,
}

impl AppConfigBuilder {
    /// Start from the contents of a TOML file
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: FileConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self {
            tracking_ws_url: file.tracking_ws_url,
            driver_api_url: file.driver_api_url,
            records_api_url: file.records_api_url,
            store_path: file.store_path,
            tracking: file.tracking,
        })
    }

    pub fn tracking_ws_url(mut self, url: impl Into<String>) -> Self {
        self.tracking_ws_url = Some(url.into());
        self
    }

    pub fn driver_api_url(mut self, url: impl Into<String>) -> Self {
        self.driver_api_url = Some(url.into());
        self
    }

    pub fn records_api_url(mut self, url: impl Into<String>) -> Self {
        self.records_api_url = Some(url.into());
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn tracking(mut self, settings: TrackingSettings) -> Self {
        self.tracking = Some(settings);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            tracking_ws_url: trim_slash(self.tracking_ws_url.unwrap_or(defaults.tracking_ws_url)),
            driver_api_url: trim_slash(self.driver_api_url.unwrap_or(defaults.driver_api_url)),
            records_api_url: trim_slash(self.records_api_url.unwrap_or(defaults.records_api_url)),
            store_path: self.store_path,
            tracking: self.tracking.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}
