//! In-process metrics recorder
//!
//! Atomic counters plus a snapshot, for tests and for the `state` command.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use contracts::{QueueMetrics, QueueStats, Source};

const SOURCES: usize = Source::ALL.len();

fn slot(source: Source) -> usize {
    match source {
        Source::Webhook => 0,
        Source::Custom => 1,
        Source::Hello => 2,
        Source::Bluesky => 3,
    }
}

#[derive(Debug, Default)]
struct PerSource([AtomicU64; SOURCES]);

impl PerSource {
    fn inc(&self, source: Source) {
        self.0[slot(source)].fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, source: Source) -> u64 {
        self.0[slot(source)].load(Ordering::Relaxed)
    }

    fn total(&self) -> u64 {
        self.0.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

/// `QueueMetrics` that keeps everything in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    enqueued: PerSource,
    sent: PerSource,
    send_failures: PerSource,
    evicted: PerSource,
    lockouts: PerSource,
    pauses: AtomicU64,
    filter_accepted: AtomicU64,
    filter_rejected: AtomicU64,
    api_errors: Mutex<BTreeMap<String, u64>>,
    last_stats: Mutex<QueueStats>,
}

impl InMemoryMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages enqueued for one source
    pub fn enqueued(&self, source: Source) -> u64 {
        self.enqueued.get(source)
    }

    /// Messages sent for one source
    pub fn sent(&self, source: Source) -> u64 {
        self.sent.get(source)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.total(),
            sent: self.sent.total(),
            send_failures: self.send_failures.total(),
            evicted: self.evicted.total(),
            lockouts: self.lockouts.total(),
            pauses: self.pauses.load(Ordering::Relaxed),
            filter_accepted: self.filter_accepted.load(Ordering::Relaxed),
            filter_rejected: self.filter_rejected.load(Ordering::Relaxed),
            api_errors: self
                .api_errors
                .lock()
                .map(|errors| errors.clone())
                .unwrap_or_default(),
            stats: self
                .last_stats
                .lock()
                .map(|stats| *stats)
                .unwrap_or_default(),
        }
    }
}

impl QueueMetrics for InMemoryMetrics {
    fn message_enqueued(&self, source: Source) {
        self.enqueued.inc(source);
    }

    fn enqueue_locked_out(&self, source: Source) {
        self.lockouts.inc(source);
    }

    fn message_sent(&self, source: Source) {
        self.sent.inc(source);
    }

    fn send_failed(&self, source: Source) {
        self.send_failures.inc(source);
    }

    fn message_evicted(&self, source: Source) {
        self.evicted.inc(source);
    }

    fn queue_paused(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    fn api_error(&self, operation: &str) {
        if let Ok(mut errors) = self.api_errors.lock() {
            *errors.entry(operation.to_string()).or_default() += 1;
        }
    }

    fn content_filtered(&self, accepted: bool) {
        let counter = if accepted {
            &self.filter_accepted
        } else {
            &self.filter_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn queue_stats(&self, stats: &QueueStats) {
        if let Ok(mut last) = self.last_stats.lock() {
            *last = *stats;
        }
    }
}

/// Snapshot of in-memory metrics (for reporting)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub sent: u64,
    pub send_failures: u64,
    pub evicted: u64,
    pub lockouts: u64,
    pub pauses: u64,
    pub filter_accepted: u64,
    pub filter_rejected: u64,
    pub api_errors: BTreeMap<String, u64>,
    pub stats: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_source() {
        let metrics = InMemoryMetrics::new();
        metrics.message_enqueued(Source::Webhook);
        metrics.message_enqueued(Source::Webhook);
        metrics.message_enqueued(Source::Custom);
        metrics.message_sent(Source::Custom);

        assert_eq!(metrics.enqueued(Source::Webhook), 2);
        assert_eq!(metrics.enqueued(Source::Bluesky), 0);
        assert_eq!(metrics.sent(Source::Custom), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.enqueued, 3);
        assert_eq!(snapshot.sent, 1);
    }

    #[test]
    fn test_api_errors_and_filter() {
        let metrics = InMemoryMetrics::new();
        metrics.api_error("send");
        metrics.api_error("send");
        metrics.api_error("format");
        metrics.content_filtered(true);
        metrics.content_filtered(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.api_errors.get("send"), Some(&2));
        assert_eq!(snapshot.api_errors.get("format"), Some(&1));
        assert_eq!(snapshot.filter_accepted, 1);
        assert_eq!(snapshot.filter_rejected, 1);
    }

    #[test]
    fn test_last_stats_replaced() {
        let metrics = InMemoryMetrics::new();
        metrics.queue_stats(&QueueStats {
            total: 4,
            unsent: 2,
            evicted: 1,
            oldest_unsent_age_secs: Some(3.5),
        });
        assert_eq!(metrics.snapshot().stats.unsent, 2);
    }
}
