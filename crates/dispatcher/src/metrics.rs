//! Controller-local tick counters

use std::sync::atomic::{AtomicU64, Ordering};

use crate::controller::TickOutcome;

/// Per-controller counters, independent of the injected `QueueMetrics` sink
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    /// Ticks skipped because the queue was paused
    paused_count: AtomicU64,
    /// Ticks skipped because a delivery was in flight
    busy_count: AtomicU64,
    /// Ticks that found nothing to send
    idle_count: AtomicU64,
    /// Successful deliveries
    sent_count: AtomicU64,
    /// Failed attempts that left the record pending
    failure_count: AtomicU64,
    /// Failed attempts that evicted the record
    evicted_count: AtomicU64,
}

impl ControllerMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one tick outcome
    pub fn record(&self, outcome: &TickOutcome) {
        let counter = match outcome {
            TickOutcome::Paused => &self.paused_count,
            TickOutcome::Busy => &self.busy_count,
            TickOutcome::Idle => &self.idle_count,
            TickOutcome::Sent { .. } => &self.sent_count,
            TickOutcome::Failed { .. } => &self.failure_count,
            TickOutcome::Evicted { .. } => &self.evicted_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get successful delivery count
    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::Relaxed)
    }

    /// Get failed attempt count (evictions included)
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed) + self.evicted_count.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            paused: self.paused_count.load(Ordering::Relaxed),
            busy: self.busy_count.load(Ordering::Relaxed),
            idle: self.idle_count.load(Ordering::Relaxed),
            sent: self.sent_count.load(Ordering::Relaxed),
            failed: self.failure_count.load(Ordering::Relaxed),
            evicted: self.evicted_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of controller metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub paused: u64,
    pub busy: u64,
    pub idle: u64,
    pub sent: u64,
    pub failed: u64,
    pub evicted: u64,
}

impl ControllerSnapshot {
    /// Total ticks observed
    pub fn ticks(&self) -> u64 {
        self.paused + self.busy + self.idle + self.sent + self.failed + self.evicted
    }
}
