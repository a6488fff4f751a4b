//! # Ingestion Pipeline
//!
//! Producer-side message ingestion.
//!
//! Responsibilities:
//! - Gate automated producers on the store lock before any external call
//! - Fail-open content moderation
//! - Format text / VBML layouts into a `Grid` via the compose service
//! - Enqueue into `PersistentQueueStore`
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{AcceptAll, IngestionPipeline, VbmlFormatter};
//!
//! let formatter = VbmlFormatter::new(&config.formatter, timeout)?;
//! let pipeline = IngestionPipeline::new(store, formatter, AcceptAll, metrics);
//!
//! let record = pipeline.submit_text("HELLO WORLD", Source::Custom, None).await?;
//! ```

mod error;
mod formatter;
mod moderation;
mod pipeline;
pub mod templates;

// Re-exports
pub use contracts::{ContentFilter, PayloadFormatter, VbmlMessage};
pub use error::{IngestionError, Result};
pub use formatter::VbmlFormatter;
pub use moderation::{moderate_fail_open, AcceptAll};
pub use pipeline::IngestionPipeline;
