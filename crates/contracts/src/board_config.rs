//! BoardConfig - Config Loader output
//!
//! Describes the complete runtime configuration: store, dispatch timing,
//! device transport, formatter endpoint and observability.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete runtime configuration
///
/// Every section has defaults, so an empty file is a valid configuration
/// (console device, local database).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// Persistence settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Controller timing and retry policy
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Physical board transport
    #[serde(default)]
    pub device: DeviceConfig,

    /// Layout formatting service
    #[serde(default)]
    pub formatter: FormatterConfig,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

/// Store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file (`:memory:` for an ephemeral store)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Failed attempts after which a record is evicted
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// SQLite busy timeout
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("board-queue.db")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_attempts: default_max_attempts(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Controller tick period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Minimum spacing between device calls
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Delivery calls per dispatch attempt (first call included)
    #[serde(default = "default_inline_retries")]
    pub inline_retries: u32,

    /// Backoff base
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    30_000
}

fn default_rate_limit_ms() -> u64 {
    15_000
}

fn default_inline_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            rate_limit_ms: default_rate_limit_ms(),
            inline_retries: default_inline_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Device transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// Real board over HTTP
    Http,
    /// Render frames to the log (dev mode)
    #[default]
    Console,
}

/// Device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub mode: DeviceMode,

    /// Read/write API base URL
    #[serde(default = "default_device_base_url")]
    pub base_url: String,

    /// Read/write key; required in http mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_device_base_url() -> String {
    "https://rw.vestaboard.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::default(),
            base_url: default_device_base_url(),
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Formatter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatterConfig {
    /// VBML compose endpoint
    #[serde(default = "default_formatter_url")]
    pub url: String,
}

fn default_formatter_url() -> String {
    "https://vbml.vestaboard.com/compose".to_string()
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            url: default_formatter_url(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    Json,
    #[default]
    Pretty,
    Compact,
}

/// Observability settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default)]
    pub log_format: LogFormatSetting,

    /// Prometheus listener port (None = disabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: BoardConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.store.max_attempts, 3);
        assert_eq!(config.dispatch.rate_limit(), Duration::from_secs(15));
        assert_eq!(config.dispatch.tick_interval(), Duration::from_secs(30));
        assert_eq!(config.device.mode, DeviceMode::Console);
        assert!(config.observability.metrics_port.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: BoardConfig =
            serde_json::from_str(r#"{ "dispatch": { "rate_limit_ms": 500 } }"#).unwrap();
        assert_eq!(config.dispatch.rate_limit_ms, 500);
        assert_eq!(config.dispatch.inline_retries, 3);
    }
}
