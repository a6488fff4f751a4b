//! Prometheus 指标
//!
//! `PrometheusMetrics` 通过 `metrics` facade 上报；exporter 由
//! [`crate::init_with_config`] 安装。未安装 recorder 时所有调用为空操作。

use contracts::{QueueMetrics, QueueStats, Source};
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

pub const MESSAGES_ENQUEUED: &str = "board_messages_enqueued_total";
pub const MESSAGES_SENT: &str = "board_messages_sent_total";
pub const SEND_FAILURES: &str = "board_message_send_failures_total";
pub const MESSAGES_EVICTED: &str = "board_messages_evicted_total";
pub const STORE_LOCKOUTS: &str = "board_store_lockouts_total";
pub const QUEUE_PAUSES: &str = "board_queue_pause_total";
pub const API_ERRORS: &str = "board_api_errors_total";
pub const CONTENT_FILTER: &str = "board_content_filter_total";
pub const STORE_SIZE: &str = "board_message_store_size";
pub const UNSENT_MESSAGES: &str = "board_unsent_messages";
pub const OLDEST_UNSENT_AGE: &str = "board_oldest_unsent_message_age_seconds";

/// `QueueMetrics` backed by the global `metrics` recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl PrometheusMetrics {
    /// Register help text for every metric
    pub fn describe() {
        describe_counter!(MESSAGES_ENQUEUED, "Messages persisted, by source");
        describe_counter!(MESSAGES_SENT, "Messages delivered to the board, by source");
        describe_counter!(SEND_FAILURES, "Failed dispatch attempts, by source");
        describe_counter!(MESSAGES_EVICTED, "Messages evicted after exhausting attempts");
        describe_counter!(STORE_LOCKOUTS, "Submissions refused while the store was locked");
        describe_counter!(QUEUE_PAUSES, "Times the dispatch queue was paused");
        describe_counter!(API_ERRORS, "External API errors, by operation");
        describe_counter!(CONTENT_FILTER, "Moderation verdicts, by result");
        describe_gauge!(STORE_SIZE, "Records in the store");
        describe_gauge!(UNSENT_MESSAGES, "Records awaiting dispatch");
        describe_gauge!(OLDEST_UNSENT_AGE, Unit::Seconds, "Age of the oldest record awaiting dispatch");
    }
}

impl QueueMetrics for PrometheusMetrics {
    fn message_enqueued(&self, source: Source) {
        counter!(MESSAGES_ENQUEUED, "source" => source.as_str()).increment(1);
    }

    fn enqueue_locked_out(&self, source: Source) {
        counter!(STORE_LOCKOUTS, "source" => source.as_str()).increment(1);
    }

    fn message_sent(&self, source: Source) {
        counter!(MESSAGES_SENT, "source" => source.as_str()).increment(1);
    }

    fn send_failed(&self, source: Source) {
        counter!(SEND_FAILURES, "source" => source.as_str()).increment(1);
    }

    fn message_evicted(&self, source: Source) {
        counter!(MESSAGES_EVICTED, "source" => source.as_str()).increment(1);
    }

    fn queue_paused(&self) {
        counter!(QUEUE_PAUSES).increment(1);
    }

    fn api_error(&self, operation: &str) {
        counter!(API_ERRORS, "operation" => operation.to_string()).increment(1);
    }

    fn content_filtered(&self, accepted: bool) {
        let result = if accepted { "accepted" } else { "rejected" };
        counter!(CONTENT_FILTER, "result" => result).increment(1);
    }

    fn queue_stats(&self, stats: &QueueStats) {
        gauge!(STORE_SIZE).set(stats.total as f64);
        gauge!(UNSENT_MESSAGES).set(stats.unsent as f64);
        gauge!(OLDEST_UNSENT_AGE).set(stats.oldest_unsent_age_secs.unwrap_or(0.0));
    }
}
