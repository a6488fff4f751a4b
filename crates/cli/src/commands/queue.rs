//! Queue commands: `enqueue`, `state`, `recent`, `show`, `reprioritize`, `send`.

use anyhow::{Context, Result};
use contracts::{
    BoardConfig, Grid, MessageId, MessageRecord, PayloadFormatter, RetryPolicy, Source, StateSnapshot,
    VbmlMessage,
};
use dispatcher::transports::render_grid;
use ingestion::{AcceptAll, IngestionPipeline, VbmlFormatter};
use queue_store::PersistentQueueStore;
use serde_json::{json, Value};
use tracing::info;

use super::{metrics, open_store, print_json, read_grid, read_grid_rows, record_line};
use crate::cli::{EnqueueArgs, IdArgs, OutputArgs, PayloadArgs, RecentArgs};

fn formatter(config: &BoardConfig) -> Result<VbmlFormatter> {
    let formatter = VbmlFormatter::new(&config.formatter, config.device.request_timeout())
        .context("Failed to create formatter client")?;
    Ok(formatter.with_policy(RetryPolicy::from_dispatch(&config.dispatch)))
}

/// Execute the `enqueue` command
pub async fn run_enqueue(args: &EnqueueArgs, config: &BoardConfig) -> Result<()> {
    let metadata: Option<Value> = args
        .metadata
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--metadata must be valid JSON")?;

    let store = open_store(config)?;
    let pipeline = IngestionPipeline::new(store, formatter(config)?, AcceptAll, metrics());

    let record = match (&args.payload.file, &args.payload.text) {
        (Some(path), _) => pipeline.submit_rows(read_grid_rows(path)?, args.source, metadata)?,
        (None, Some(text)) => pipeline.submit_text(text, args.source, metadata).await?,
        (None, None) => anyhow::bail!("Either --file or --text is required"),
    };

    info!(id = %record.id, source = %record.source, "Message enqueued");
    if args.json {
        print_json(&record)
    } else {
        println!("✓ Enqueued {}", record_line(&record));
        Ok(())
    }
}

/// Execute the `state` command
pub fn run_state(args: &OutputArgs, config: &BoardConfig) -> Result<()> {
    let snapshot = open_store(config)?.get_state()?;
    if args.json {
        print_json(&snapshot)
    } else {
        print_state(&snapshot);
        Ok(())
    }
}

/// Execute the `recent` command
pub fn run_recent(args: &RecentArgs, config: &BoardConfig) -> Result<()> {
    let records = open_store(config)?.get_recent(args.limit)?;
    if args.json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("No messages");
    }
    for record in &records {
        println!("{}", record_line(record));
    }
    Ok(())
}

/// Execute the `show` command
pub fn run_show(args: &IdArgs, config: &BoardConfig) -> Result<()> {
    let id = MessageId::from(args.id.as_str());
    let record = open_store(config)?
        .get_by_id(&id)?
        .with_context(|| format!("Message not found: {}", id))?;

    if args.json {
        return print_json(&record);
    }

    println!("{}", record_line(&record));
    if let Some(ref metadata) = record.metadata {
        println!("metadata: {}", metadata);
    }
    println!("{}", render_grid(&record.payload));
    Ok(())
}

/// Execute the `reprioritize` command
pub fn run_reprioritize(args: &IdArgs, config: &BoardConfig) -> Result<()> {
    let id = MessageId::from(args.id.as_str());
    let record = open_store(config)?.reprioritize(&id)?;

    if args.json {
        print_json(&record)
    } else {
        println!("✓ Moved to front: {}", record_line(&record));
        Ok(())
    }
}

/// Execute the `send` command
///
/// Persists the grid ahead of every pending record. The `run` process owns
/// the device and delivers it on its next tick, through its own rate limiter
/// and in-flight guard.
pub async fn run_send(args: &PayloadArgs, config: &BoardConfig) -> Result<()> {
    let grid = match (&args.file, &args.text) {
        (Some(path), _) => read_grid(path)?,
        (None, Some(text)) => format_text(config, text).await?,
        (None, None) => anyhow::bail!("Either --file or --text is required"),
    };

    let record = queue_for_next_tick(&*open_store(config)?, grid)?;
    println!("✓ Queued for next dispatch: {}", record_line(&record));
    Ok(())
}

/// Front-of-queue record tagged as a manual send
fn queue_for_next_tick(store: &PersistentQueueStore, grid: Grid) -> Result<MessageRecord> {
    let record = store.enqueue_next(grid, Source::Custom, Some(json!({ "immediate": true })))?;
    info!(id = %record.id, "Manual send queued");
    Ok(record)
}

async fn format_text(config: &BoardConfig, text: &str) -> Result<Grid> {
    let grid = formatter(config)?
        .format(&VbmlMessage::centered(text))
        .await
        .context("Failed to format text")?;
    Ok(grid)
}

fn print_state(snapshot: &StateSnapshot) {
    let control = &snapshot.control;

    println!("Control plane");
    match (&control.lock_reason, control.locked_until) {
        _ if !control.locked => println!("  Locked: no"),
        (reason, Some(until)) => println!(
            "  Locked: yes ({}) until {}",
            reason.as_deref().unwrap_or("no reason"),
            until.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        (reason, None) => println!("  Locked: yes ({})", reason.as_deref().unwrap_or("no reason")),
    }
    println!("  Paused: {}", if control.queue_paused { "yes" } else { "no" });

    let stats = &snapshot.stats;
    println!("\nQueue");
    println!("  Total: {}", stats.total);
    println!("  Unsent: {}", stats.unsent);
    println!("  Evicted: {}", stats.evicted);
    match stats.oldest_unsent_age_secs {
        Some(age) => println!("  Oldest unsent: {:.1}s", age),
        None => println!("  Oldest unsent: -"),
    }
    println!("  Max attempts: {}", snapshot.max_attempts);
}
