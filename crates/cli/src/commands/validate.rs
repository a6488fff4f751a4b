//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{BoardConfig, DeviceMode};
use serde::Serialize;
use tracing::info;

use super::LoadedConfig;
use crate::cli::{Cli, ValidateArgs};

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    store_path: String,
    max_attempts: u32,
    tick_interval_ms: u64,
    rate_limit_ms: u64,
    inline_retries: u32,
    device: String,
    metrics_port: Option<u16>,
}

/// Execute the `validate` command
pub fn run_validate(cli: &Cli, args: &ValidateArgs) -> Result<()> {
    info!(config = %cli.config.display(), "Validating configuration");

    let result = validate_config(cli);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(cli: &Cli) -> ValidationResult {
    let config_path = cli.config.display().to_string();

    let loaded = match super::read_config(cli) {
        Ok(loaded) => loaded,
        Err(e) => return invalid(config_path, format!("{e:#}")),
    };

    if let Err(e) = config_loader::ConfigLoader::validate(&loaded.config) {
        return invalid(config_path, e.to_string());
    }

    let warnings = collect_warnings(&loaded);
    let config = &loaded.config;
    ValidationResult {
        valid: true,
        config_path,
        error: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(ConfigSummary {
            version: format!("{:?}", config.version),
            store_path: config.store.path.display().to_string(),
            max_attempts: config.store.max_attempts,
            tick_interval_ms: config.dispatch.tick_interval_ms,
            rate_limit_ms: config.dispatch.rate_limit_ms,
            inline_retries: config.dispatch.inline_retries,
            device: device_label(config),
            metrics_port: config.observability.metrics_port,
        }),
    }
}

fn invalid(config_path: String, error: String) -> ValidationResult {
    ValidationResult {
        valid: false,
        config_path,
        error: Some(error),
        warnings: None,
        summary: None,
    }
}

fn device_label(config: &BoardConfig) -> String {
    match config.device.mode {
        DeviceMode::Http => format!("http ({})", config.device.base_url),
        DeviceMode::Console => "console (dev mode)".to_string(),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(loaded: &LoadedConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let config = &loaded.config;

    if !loaded.from_file {
        warnings.push("Configuration file not found - using built-in defaults".to_string());
    }

    if config.device.mode == DeviceMode::Console {
        warnings.push("device.mode is console - frames are logged, not sent".to_string());
    }

    if config.store.path.as_os_str() == ":memory:" {
        warnings.push("store.path is :memory: - the queue will not survive a restart".to_string());
    }

    // 一条消息的重试可能占满整个 tick 周期
    let worst_case_ms = config
        .dispatch
        .rate_limit_ms
        .saturating_mul(u64::from(config.dispatch.inline_retries));
    if worst_case_ms > config.dispatch.tick_interval_ms {
        warnings.push(format!(
            "inline retries can take up to {}ms, longer than the {}ms tick interval",
            worst_case_ms, config.dispatch.tick_interval_ms
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Store: {} (max attempts {})", summary.store_path, summary.max_attempts);
            println!("  Tick interval: {}ms", summary.tick_interval_ms);
            println!("  Rate limit: {}ms", summary.rate_limit_ms);
            println!("  Inline retries: {}", summary.inline_retries);
            println!("  Device: {}", summary.device);
            if let Some(port) = summary.metrics_port {
                println!("  Metrics port: {}", port);
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
