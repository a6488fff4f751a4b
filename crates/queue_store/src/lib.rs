//! # Queue Store
//!
//! Durable message queue and control plane backed by SQLite.
//!
//! Responsibilities:
//! - Validate and persist records (`enqueue`)
//! - Select the next dispatchable record (`get_next_unsent`)
//! - Record outcomes (`mark_sent` / `mark_attempt`, with auto-eviction)
//! - Persist lock / pause flags and expose a consistent `StateSnapshot`
//!
//! The store exclusively owns record mutation. Counters are recomputed from
//! the tables on every mutation and never cached across calls.

mod schema;
mod store;

pub use contracts::{AttemptOutcome, MessageRecord, QueueError, StateSnapshot};
pub use store::PersistentQueueStore;
