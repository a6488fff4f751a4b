//! Control plane commands: `lock`, `unlock`, `pause`, `resume`.

use anyhow::{Context, Result};
use contracts::{BoardConfig, ControlState};

use super::{open_store, print_json};
use crate::cli::{LockArgs, OutputArgs};

/// Execute the `lock` command
pub fn run_lock(args: &LockArgs, config: &BoardConfig) -> Result<()> {
    let store = open_store(config)?;
    let state = match args.ttl_secs {
        Some(secs) => {
            let ttl = i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .context("--ttl-secs is out of range")?;
            store.lock_for(args.reason.clone(), ttl)?
        }
        None => store.lock(args.reason.clone())?,
    };
    report(&state, args.json)
}

/// Execute the `unlock` command
pub fn run_unlock(args: &OutputArgs, config: &BoardConfig) -> Result<()> {
    let state = open_store(config)?.unlock()?;
    report(&state, args.json)
}

/// Execute the `pause` command
pub fn run_pause(args: &OutputArgs, config: &BoardConfig) -> Result<()> {
    let state = open_store(config)?.pause_queue()?;
    report(&state, args.json)
}

/// Execute the `resume` command
pub fn run_resume(args: &OutputArgs, config: &BoardConfig) -> Result<()> {
    let state = open_store(config)?.resume_queue()?;
    report(&state, args.json)
}

fn report(state: &ControlState, json: bool) -> Result<()> {
    if json {
        return print_json(state);
    }

    let lock = if state.locked {
        match state.lock_reason {
            Some(ref reason) => format!("locked ({})", reason),
            None => "locked".to_string(),
        }
    } else {
        "unlocked".to_string()
    };
    let queue = if state.queue_paused { "paused" } else { "running" };
    println!("✓ Ingestion {}, dispatch {}", lock, queue);
    Ok(())
}
