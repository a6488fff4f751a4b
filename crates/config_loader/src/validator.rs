//! 配置校验模块
//!
//! 校验规则：
//! - max_attempts >= 1, inline_retries >= 1
//! - tick_interval_ms > 0
//! - backoff_base_ms <= backoff_max_ms
//! - URL 非空且为 http(s)
//! - http 模式必须提供 api_key

use contracts::{BoardConfig, ContractError, DeviceMode};

/// 校验 BoardConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &BoardConfig) -> Result<(), ContractError> {
    validate_store(config)?;
    validate_dispatch(config)?;
    validate_device(config)?;
    validate_formatter(config)?;
    Ok(())
}

/// 校验存储配置
fn validate_store(config: &BoardConfig) -> Result<(), ContractError> {
    let store = &config.store;
    if store.path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "store.path",
            "store path cannot be empty",
        ));
    }
    if store.max_attempts == 0 {
        return Err(ContractError::config_validation(
            "store.max_attempts",
            "max_attempts must be >= 1",
        ));
    }
    Ok(())
}

/// 校验分发时序与重试策略
fn validate_dispatch(config: &BoardConfig) -> Result<(), ContractError> {
    let dispatch = &config.dispatch;

    if dispatch.tick_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "dispatch.tick_interval_ms",
            "tick_interval_ms must be > 0",
        ));
    }

    if dispatch.inline_retries == 0 {
        return Err(ContractError::config_validation(
            "dispatch.inline_retries",
            "inline_retries must be >= 1",
        ));
    }

    if dispatch.backoff_base_ms > dispatch.backoff_max_ms {
        return Err(ContractError::config_validation(
            "dispatch.backoff_base_ms / dispatch.backoff_max_ms",
            format!(
                "backoff_base_ms ({}) must be <= backoff_max_ms ({})",
                dispatch.backoff_base_ms, dispatch.backoff_max_ms
            ),
        ));
    }

    Ok(())
}

/// 校验设备配置
fn validate_device(config: &BoardConfig) -> Result<(), ContractError> {
    let device = &config.device;
    if device.mode != DeviceMode::Http {
        return Ok(());
    }

    validate_url("device.base_url", &device.base_url)?;

    if device.api_key.as_deref().is_none_or(str::is_empty) {
        return Err(ContractError::config_validation(
            "device.api_key",
            "api_key is required in http mode",
        ));
    }

    if device.request_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "device.request_timeout_ms",
            "request_timeout_ms must be > 0",
        ));
    }

    Ok(())
}

/// 校验格式化服务配置
fn validate_formatter(config: &BoardConfig) -> Result<(), ContractError> {
    validate_url("formatter.url", &config.formatter.url)
}

fn validate_url(field: &str, url: &str) -> Result<(), ContractError> {
    if url.trim().is_empty() {
        return Err(ContractError::config_validation(field, "url cannot be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ContractError::config_validation(
            field,
            format!("url must start with http:// or https://, got '{url}'"),
        ));
    }
    Ok(())
}
