//! Command implementations.

mod control;
mod queue;
mod run;
mod validate;

pub use control::{run_lock, run_pause, run_resume, run_unlock};
pub use queue::{run_enqueue, run_recent, run_reprioritize, run_send, run_show, run_state};
pub use run::run_controller;
pub use validate::run_validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::{BoardConfig, Grid, MessageRecord, QueueMetrics, SystemClock};
use observability::PrometheusMetrics;
use queue_store::PersistentQueueStore;
use serde::Serialize;

use crate::cli::Cli;

/// Configuration after CLI overrides
pub struct LoadedConfig {
    pub config: BoardConfig,
    /// false when the file was missing and defaults were used
    pub from_file: bool,
}

/// Read the configuration file, apply CLI overrides and validate
pub fn load_config(cli: &Cli) -> Result<LoadedConfig> {
    let loaded = read_config(cli)?;
    config_loader::ConfigLoader::validate(&loaded.config)
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    Ok(loaded)
}

/// Parse without validating; a missing file yields the defaults
fn read_config(cli: &Cli) -> Result<LoadedConfig> {
    let (mut config, from_file) = if cli.config.exists() {
        let config = config_loader::ConfigLoader::read_from_path(&cli.config)
            .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
        (config, true)
    } else {
        (BoardConfig::default(), false)
    };

    if let Some(ref key) = cli.api_key {
        config.device.api_key = Some(key.clone());
    }

    Ok(LoadedConfig { config, from_file })
}

/// Metrics sink for every command; a no-op until a recorder is installed
fn metrics() -> Arc<dyn QueueMetrics> {
    Arc::new(PrometheusMetrics)
}

fn open_store(config: &BoardConfig) -> Result<Arc<PersistentQueueStore>> {
    let store = PersistentQueueStore::open(&config.store, Arc::new(SystemClock), metrics())
        .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;
    Ok(Arc::new(store))
}

/// Read a grid file: a JSON array of 6 rows of 22 codes
fn read_grid_rows(path: &Path) -> Result<Vec<Vec<i64>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read grid file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Grid file {} is not a JSON array of rows", path.display()))
}

fn read_grid(path: &Path) -> Result<Grid> {
    let rows = read_grid_rows(path)?;
    Grid::try_from(rows).with_context(|| format!("Invalid grid in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// One-line record summary
fn record_line(record: &MessageRecord) -> String {
    format!(
        "{}  {:<8} {:<8} attempts={} priority={} created={}",
        record.id,
        record.source.as_str(),
        format!("{:?}", record.state()).to_lowercase(),
        record.attempts,
        record.priority,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["board-queue"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cli = parse(&["-c", path.to_str().unwrap(), "state"]);

        let loaded = load_config(&cli).unwrap();
        assert!(!loaded.from_file);
        assert_eq!(loaded.config.store.max_attempts, 3);
    }

    #[test]
    fn test_api_key_flag_satisfies_http_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.toml");
        std::fs::write(&path, "[device]\nmode = \"http\"\n").unwrap();

        let cli = parse(&["-c", path.to_str().unwrap(), "--api-key", "rw-key", "state"]);
        let loaded = load_config(&cli).unwrap();
        assert!(loaded.from_file);
        assert_eq!(loaded.config.device.api_key.as_deref(), Some("rw-key"));
    }

    #[test]
    fn test_read_grid_rejects_bad_shape() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, serde_json::to_string(&vec![vec![1; 22]; 6]).unwrap()).unwrap();
        std::fs::write(&bad, "[[1, 2, 3]]").unwrap();

        assert_eq!(read_grid(&good).unwrap().filled_cells(), 132);
        assert!(read_grid(&bad).is_err());
    }
}
