//! QueueMetrics - injected telemetry interface
//!
//! Store, controller and ingestion report through this trait instead of
//! touching process-wide counters. `observability` provides the Prometheus
//! and in-memory implementations.

use crate::{QueueStats, Source};

/// Telemetry sink for queue events
pub trait QueueMetrics: Send + Sync {
    /// A record was persisted
    fn message_enqueued(&self, source: Source);

    /// Gated ingestion refused because the store is locked
    fn enqueue_locked_out(&self, source: Source);

    /// A record was delivered
    fn message_sent(&self, source: Source);

    /// One dispatch attempt failed after inline retries
    fn send_failed(&self, source: Source);

    /// A record exhausted its attempts
    fn message_evicted(&self, source: Source);

    /// The dispatcher was paused
    fn queue_paused(&self);

    /// An external collaborator call failed (`send`, `format`, `moderate`, ...)
    fn api_error(&self, operation: &str);

    /// Moderation verdict (`accepted = false` for rejections)
    fn content_filtered(&self, accepted: bool);

    /// Derived counters after a mutation
    fn queue_stats(&self, stats: &QueueStats);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl QueueMetrics for NoopMetrics {
    fn message_enqueued(&self, _source: Source) {}
    fn enqueue_locked_out(&self, _source: Source) {}
    fn message_sent(&self, _source: Source) {}
    fn send_failed(&self, _source: Source) {}
    fn message_evicted(&self, _source: Source) {}
    fn queue_paused(&self) {}
    fn api_error(&self, _operation: &str) {}
    fn content_filtered(&self, _accepted: bool) {}
    fn queue_stats(&self, _stats: &QueueStats) {}
}
