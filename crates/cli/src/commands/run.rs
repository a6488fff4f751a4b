//! `run` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::BoardConfig;
use dispatcher::{create_transport, DeliveryTransport, DispatchController};
use tokio::sync::watch;
use tracing::{info, warn};

use super::{metrics, open_store};
use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_controller(args: &RunArgs, mut config: BoardConfig) -> Result<()> {
    // Apply CLI overrides
    if let Some(interval) = args.tick_interval_ms {
        info!(tick_interval_ms = interval, "Overriding tick interval from CLI");
        config.dispatch.tick_interval_ms = interval;
    }
    let metrics_port = match args.metrics_port {
        Some(0) => None,
        Some(port) => Some(port),
        None => config.observability.metrics_port,
    };
    config_loader::ConfigLoader::validate(&config).context("Invalid configuration after CLI overrides")?;

    info!(
        store = %config.store.path.display(),
        device = ?config.device.mode,
        tick_interval_ms = config.dispatch.tick_interval_ms,
        rate_limit_ms = config.dispatch.rate_limit_ms,
        max_attempts = config.store.max_attempts,
        "Configuration loaded"
    );

    if let Some(port) = metrics_port {
        observability::init_metrics_only(port)?;
    }

    let store = open_store(&config)?;

    // Dry run - store opened and configuration valid, exit
    if args.dry_run {
        let snapshot = store.get_state()?;
        info!(
            unsent = snapshot.stats.unsent,
            locked = snapshot.control.locked,
            paused = snapshot.control.queue_paused,
            "Dry run mode - store is readable, exiting"
        );
        return Ok(());
    }

    let transport = Arc::new(create_transport(&config.device)?);
    info!(transport = %transport.name(), "Transport ready");

    let controller = Arc::new(DispatchController::new(
        store,
        transport,
        &config.dispatch,
        metrics(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Arc::clone(&controller).spawn(shutdown_rx);

    info!("Dispatch controller running, press Ctrl+C to stop");
    shutdown_signal().await?;
    warn!("Received shutdown signal, stopping controller...");

    // 接收端已退出时发送失败无影响
    let _ = shutdown_tx.send(true);
    handle
        .await
        .context("Controller task panicked")?
        .context("Controller stopped with an error")?;

    let snapshot = controller.metrics().snapshot();
    info!(
        ticks = snapshot.ticks(),
        sent = snapshot.sent,
        failed = snapshot.failed,
        evicted = snapshot.evicted,
        "Board Queue finished"
    );
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    Ok(())
}
