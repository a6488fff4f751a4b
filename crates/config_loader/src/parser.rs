//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{BoardConfig, ContractError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<BoardConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<BoardConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<BoardConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DeviceMode;

    #[test]
    fn test_parse_toml_full() {
        let content = r#"
[store]
path = "/var/lib/board/queue.db"
max_attempts = 2

[dispatch]
tick_interval_ms = 1000
rate_limit_ms = 15000

[device]
mode = "http"
api_key = "secret"

[observability]
log_format = "json"
metrics_port = 9000
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.store.max_attempts, 2);
        assert_eq!(config.dispatch.tick_interval_ms, 1000);
        assert_eq!(config.device.mode, DeviceMode::Http);
        assert_eq!(config.device.api_key.as_deref(), Some("secret"));
        assert_eq!(config.observability.metrics_port, Some(9000));
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{ "store": { "path": ":memory:" } }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.store.path.to_str(), Some(":memory:"));
        assert_eq!(config.store.max_attempts, 3);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_parse_unknown_device_mode() {
        let content = "[device]\nmode = \"carrier_pigeon\"\n";
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
