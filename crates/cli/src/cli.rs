//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::Source;
use std::path::PathBuf;

/// Board Queue - durable outbound message queue for a split-flap board
#[derive(Parser, Debug)]
#[command(
    name = "board-queue",
    author,
    version,
    about = "Durable, rate-limited message queue for a split-flap display",
    long_about = "Persists outbound board messages, dispatches them to the device one at a time\n\
                  under a strict rate limit, and exposes the operator control plane \n\
                  (lock, pause, reprioritize) on the same store."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BOARD_QUEUE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (defaults to the configured format)
    #[arg(long, value_enum, global = true, env = "BOARD_QUEUE_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Path to configuration file (TOML or JSON); defaults apply when absent
    #[arg(
        short,
        long,
        default_value = "board.toml",
        global = true,
        env = "BOARD_QUEUE_CONFIG"
    )]
    pub config: PathBuf,

    /// Device read/write key, overrides `device.api_key`
    #[arg(long, global = true, env = "VESTABOARD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatch controller until interrupted
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Add a message to the queue
    Enqueue(EnqueueArgs),

    /// Show the control plane and queue statistics
    State(OutputArgs),

    /// List the most recent records
    Recent(RecentArgs),

    /// Show one record
    Show(IdArgs),

    /// Refuse automated producers until unlocked
    Lock(LockArgs),

    /// Accept automated producers again
    Unlock(OutputArgs),

    /// Stop dispatching without blocking ingestion
    Pause(OutputArgs),

    /// Resume dispatching
    Resume(OutputArgs),

    /// Move a pending record to the front of the queue
    Reprioritize(IdArgs),

    /// Put a message at the front of the queue for the running dispatcher
    Send(PayloadArgs),
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Override the configured Prometheus port (0 = disabled)
    #[arg(long, env = "BOARD_QUEUE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Override the configured tick interval in milliseconds
    #[arg(long, env = "BOARD_QUEUE_TICK_INTERVAL_MS")]
    pub tick_interval_ms: Option<u64>,

    /// Validate configuration and open the store, then exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Message body: a grid file or free text
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct PayloadArgs {
    /// JSON file holding 6 rows of 22 character codes
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Free text, laid out by the formatting service
    #[arg(long)]
    pub text: Option<String>,
}

/// Arguments for the `enqueue` command
#[derive(Args, Debug)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,

    /// Producer recorded on the message
    #[arg(long, default_value = "custom")]
    pub source: Source,

    /// Opaque JSON metadata stored with the message
    #[arg(long)]
    pub metadata: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Commands without arguments besides the output mode
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `recent` command
#[derive(Args, Debug)]
pub struct RecentArgs {
    /// Number of records to list
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Commands addressing one record
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Record id
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `lock` command
#[derive(Args, Debug)]
pub struct LockArgs {
    /// Reason shown to refused producers
    #[arg(long)]
    pub reason: Option<String>,

    /// Release the lock automatically after this many seconds
    #[arg(long)]
    pub ttl_secs: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
