//! Control plane state and queue statistics
//!
//! `locked` gates automated ingestion, `queue_paused` gates dispatch. The two
//! flags are independent and persisted together as a single row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator-controlled flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    /// Ingestion gate for automated producers
    pub locked: bool,

    /// Free-text reason supplied with the lock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<String>,

    /// Lock expiry; `None` means the lock holds until `unlock`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,

    /// Dispatch gate
    pub queue_paused: bool,
}

impl ControlState {
    /// Whether the lock has an expiry strictly before `now`
    ///
    /// The lock still holds at the exact expiry instant.
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        self.locked && self.locked_until.is_some_and(|until| now > until)
    }

    /// Drop the lock and its metadata, leaving the pause flag alone
    pub fn clear_lock(&mut self) {
        self.locked = false;
        self.lock_reason = None;
        self.locked_until = None;
    }
}

/// Counters derived from the record table
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// All records ever stored
    pub total: u64,

    /// Records still eligible for dispatch
    pub unsent: u64,

    /// Records that became terminal by exhausting attempts
    pub evicted: u64,

    /// Age of the oldest eligible record in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_unsent_age_secs: Option<f64>,
}

/// Consistent view of control plane and queue, read in one critical section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Lock and pause flags
    #[serde(flatten)]
    pub control: ControlState,

    /// Derived counters
    pub stats: QueueStats,

    /// Attempt bound enforced by the store
    pub max_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lock_expiry() {
        let now = Utc::now();
        let mut state = ControlState {
            locked: true,
            lock_reason: Some("maintenance".into()),
            locked_until: Some(now + Duration::seconds(10)),
            queue_paused: true,
        };
        assert!(!state.lock_expired(now));
        assert!(!state.lock_expired(now + Duration::seconds(10)));
        assert!(state.lock_expired(now + Duration::seconds(10) + Duration::milliseconds(1)));

        state.clear_lock();
        assert!(!state.locked);
        assert!(state.lock_reason.is_none());
        assert!(state.queue_paused);
    }

    #[test]
    fn test_lock_without_expiry_never_expires() {
        let state = ControlState {
            locked: true,
            ..Default::default()
        };
        assert!(!state.lock_expired(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_snapshot_flattens_control() {
        let snapshot = StateSnapshot {
            control: ControlState {
                locked: true,
                lock_reason: Some("demo".into()),
                locked_until: None,
                queue_paused: false,
            },
            stats: QueueStats::default(),
            max_attempts: 3,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["locked"], true);
        assert_eq!(json["lock_reason"], "demo");
        assert_eq!(json["queue_paused"], false);
        assert_eq!(json["stats"]["evicted"], 0);
    }
}
