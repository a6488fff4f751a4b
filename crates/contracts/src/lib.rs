//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the board queue workspace.
//! Business crates depend only on this crate; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall-clock timestamps are `chrono::DateTime<Utc>` obtained from an injected [`Clock`]
//! - Dispatch order is decided by `priority` first, then creation time (oldest first)

mod board_config;
mod clock;
mod control;
mod error;
mod formatter;
mod grid;
mod message;
mod message_id;
mod metrics;
mod moderation;
mod retry;
mod transport;

pub use board_config::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use control::*;
pub use error::*;
pub use formatter::*;
pub use grid::*;
pub use message::*;
pub use message_id::MessageId;
pub use metrics::{NoopMetrics, QueueMetrics};
pub use moderation::*;
pub use retry::RetryPolicy;
pub use transport::*;
