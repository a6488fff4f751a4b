//! # Board Queue CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 调度控制器的生命周期管理与优雅关闭
//! - 运维控制面：锁定、暂停、插队、立即发送

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Commands};
use commands::load_config;
use contracts::ObservabilitySettings;
use observability::ObservabilityConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // validate 自行加载配置并报告错误
    if let Commands::Validate(args) = &cli.command {
        init_logging(&cli, &ObservabilitySettings::default())?;
        return commands::run_validate(&cli, args);
    }

    // 配置先于日志加载：日志格式来自配置文件
    let loaded = load_config(&cli)?;
    init_logging(&cli, &loaded.config.observability)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Board Queue CLI starting"
    );
    if !loaded.from_file {
        warn!(config = %cli.config.display(), "Configuration file not found, using defaults");
    }

    let config = loaded.config;
    let result = match &cli.command {
        Commands::Run(args) => commands::run_controller(args, config).await,
        Commands::Enqueue(args) => commands::run_enqueue(args, &config).await,
        Commands::State(args) => commands::run_state(args, &config),
        Commands::Recent(args) => commands::run_recent(args, &config),
        Commands::Show(args) => commands::run_show(args, &config),
        Commands::Lock(args) => commands::run_lock(args, &config),
        Commands::Unlock(args) => commands::run_unlock(args, &config),
        Commands::Pause(args) => commands::run_pause(args, &config),
        Commands::Resume(args) => commands::run_resume(args, &config),
        Commands::Reprioritize(args) => commands::run_reprioritize(args, &config),
        Commands::Send(args) => commands::run_send(args, &config).await,
        Commands::Validate(args) => commands::run_validate(&cli, args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options and the loaded configuration
///
/// The Prometheus listener is only started by `run`.
fn init_logging(cli: &Cli, settings: &ObservabilitySettings) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let mut config = ObservabilityConfig::from(settings);
    config.metrics_port = None;
    config.default_log_level = default_log_level.to_string();
    if let Some(format) = cli.log_format {
        config.log_format = format.into();
    }

    observability::init_with_config(config)
}
