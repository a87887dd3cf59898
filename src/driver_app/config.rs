use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError, TrackingSettings};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "courier-track";

/// Application configuration wrapper.
///
/// Resolution order: builder defaults, then the TOML file (`COURIER_CONFIG` or
/// `<config_dir>/courier-track/config.toml`), then environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self { app: builder.build()? })
    }

    /// Load from the config file (if any) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let builder = match Self::config_file_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from {}", path.display());
                let contents = std::fs::read_to_string(&path)?;
                AppConfigBuilder::from_toml_str(&contents)?
            }
            _ => AppConfigBuilder::default(),
        };
        Self::with_builder(apply_env(builder))
    }

    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("COURIER_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|mut path| {
            path.push(APP_DIR);
            path.push("config.toml");
            path
        })
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn tracking(&self) -> &TrackingSettings {
        &self.app.tracking
    }

    /// Address of the tracking channel for one driver, token as query parameter
    pub fn channel_url(&self, driver_id: &str, token: &str) -> String {
        format!("{}/ws/drivers/{}?token={}", self.app.tracking_ws_url, driver_id, token)
    }

    /// Bulk read of every connected driver's last position
    pub fn snapshot_url(&self) -> String {
        format!("{}/drivers/locations", self.app.driver_api_url)
    }

    pub fn restaurant_url(&self, restaurant_id: &str) -> String {
        format!("{}/restaurants/{}", self.app.records_api_url, restaurant_id)
    }

    pub fn customer_url(&self, customer_id: &str) -> String {
        format!("{}/users/dd/{}", self.app.records_api_url, customer_id)
    }

    /// Local store file, defaulting to the platform data directory
    pub fn store_path(&self) -> PathBuf {
        if let Some(path) = &self.app.store_path {
            return path.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push(APP_DIR);
        path.push("local.db");
        path
    }
}

fn apply_env(mut builder: AppConfigBuilder) -> AppConfigBuilder {
    if let Ok(url) = std::env::var("TRACKING_WS_URL") {
        builder = builder.tracking_ws_url(url);
    }
    if let Ok(url) = std::env::var("DRIVER_API_URL") {
        builder = builder.driver_api_url(url);
    }
    if let Ok(url) = std::env::var("RECORDS_API_URL") {
        builder = builder.records_api_url(url);
    }
    if let Ok(path) = std::env::var("COURIER_STORE_PATH") {
        builder = builder.store_path(Path::new(&path));
    }
    builder
}
