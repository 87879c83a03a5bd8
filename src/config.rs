//! ==============================================================================
//! config.rs - runtime configuration loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `logger.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - PollingConfig: how often the shadow is polled.
//!     - DeviceConfig: which device shadow to read and how to reach it.
//!     - StoreConfig: where the sqlite file lives.
//!     - ServerConfig: dashboard / api listen address.
//!     - HistoryConfig: which history view /api/history serves and its bounds.
//!     - LoggingConfig: default log filter and reading echo.
//!
//! secrets:
//!     the iotda token should not live in the toml file. HUAWEICLOUD_IOTDA_TOKEN
//!     overrides `device.auth_token` when set.
//!
//! ==============================================================================

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "SHADOW_LOGGER_CONFIG";
pub const TOKEN_ENV: &str = "HUAWEICLOUD_IOTDA_TOKEN";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggerConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    /// application endpoint, e.g. https://xxxx.iotda-app.cn-north-4.myhuaweicloud.com
    pub endpoint: String,
    pub project_id: String,
    /// sent as the Instance-Id header when set
    pub instance_id: Option<String>,
    pub device_id: String,
    pub auth_token: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://iotda.cn-north-4.myhuaweicloud.com".to_string(),
            project_id: String::new(),
            instance_id: None,
            device_id: String::new(),
            auth_token: None,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sensor_data.db"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

/// which shape /api/history returns
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryView {
    /// every row inside the trailing window: timestamp, temperature, humidity
    #[default]
    Recent,
    /// decimated chart points: timestamp, L/B, BI, id
    Points,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub view: HistoryView,
    pub window_minutes: u64,
    pub max_points: usize,
    pub min_gap_seconds: u64,
    /// how many of the newest rows the points view looks at
    pub scan_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            view: HistoryView::Recent,
            window_minutes: 60,
            max_points: 10,
            min_gap_seconds: 60,
            scan_limit: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// used when RUST_LOG is not set
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: true,
        }
    }
}

/// where the active configuration came from, reported once logging is up
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults { skipped: Vec<String> },
}

impl LoggerConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("failed to parse config")
    }

    /// Load with default fallback, then apply environment overrides
    pub fn load_or_default() -> (Self, ConfigSource) {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                paths.push(PathBuf::from(trimmed));
            }
        }
        paths.push(PathBuf::from("config").join("logger.toml"));
        paths.push(PathBuf::from("..").join("config").join("logger.toml"));

        let mut skipped = Vec::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(mut config) => {
                    config.apply_env();
                    return (config, ConfigSource::File(path));
                }
                Err(e) => skipped.push(format!("{}: {:#}", path.display(), e)),
            }
        }

        let mut config = Self::default();
        config.apply_env();
        (config, ConfigSource::Defaults { skipped })
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                self.device.auth_token = Some(trimmed.to_string());
            }
        }
    }

    /// reject configurations the poller cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.device.device_id.trim().is_empty() {
            bail!("device.device_id must be set");
        }
        if self.device.project_id.trim().is_empty() {
            bail!("device.project_id must be set");
        }
        if self.polling.interval_seconds == 0 {
            bail!("polling.interval_seconds must be greater than zero");
        }
        if self.history.max_points == 0 || self.history.scan_limit == 0 {
            bail!("history.max_points and history.scan_limit must be greater than zero");
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            device_id = %self.device.device_id,
            endpoint = %self.device.endpoint,
            token_configured = self.device.auth_token.is_some(),
            poll_interval_s = self.polling.interval_seconds,
            store = %self.store.path.display(),
            bind = %self.server.bind,
            history_view = ?self.history.view,
            "configuration"
        );
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.device.request_timeout_seconds)
    }
}

impl HistoryConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes * 60)
    }

    pub fn min_gap(&self) -> Duration {
        Duration::from_secs(self.min_gap_seconds)
    }
}
