//! MessageRecord - one queued display payload and its lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Grid, MessageId};

/// Producer kind that created a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Repository webhook events
    Webhook,
    /// Operator-composed message
    Custom,
    /// Greeting / manual test frame
    Hello,
    /// Social stream matches
    Bluesky,
}

impl Source {
    /// Every known source, in declaration order
    pub const ALL: [Source; 4] = [Self::Webhook, Self::Custom, Self::Hello, Self::Bluesky];

    /// Stable string label (storage column and metric label)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Custom => "custom",
            Self::Hello => "hello",
            Self::Bluesky => "bluesky",
        }
    }

    /// Automated producers are refused while the control plane is locked.
    pub fn is_automated(self) -> bool {
        matches!(self, Self::Webhook | Self::Bluesky)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown source '{s}'"))
    }
}

/// A queued message with lifecycle metadata
///
/// Records are never deleted. `sent = true` is terminal; `evicted` tells a
/// delivered record apart from one that ran out of attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique id
    pub id: MessageId,

    /// Validated board payload
    pub payload: Grid,

    /// Creation time assigned by the store
    pub created_at: DateTime<Utc>,

    /// Producer kind
    pub source: Source,

    /// Opaque producer metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Terminal flag (delivered or evicted)
    pub sent: bool,

    /// Failed dispatch attempts so far
    pub attempts: u32,

    /// Dispatch priority, consulted before `created_at` (higher first)
    #[serde(default)]
    pub priority: i64,

    /// Became terminal by exhausting attempts
    #[serde(default)]
    pub evicted: bool,
}

impl MessageRecord {
    /// Whether the record can never be dispatched again
    pub fn is_terminal(&self) -> bool {
        self.sent
    }

    /// Lifecycle state derived from the flags
    pub fn state(&self) -> RecordState {
        match (self.sent, self.evicted) {
            (false, _) => RecordState::Pending,
            (true, false) => RecordState::Sent,
            (true, true) => RecordState::Evicted,
        }
    }
}

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Pending,
    Sent,
    Evicted,
}

/// Result of recording one failed dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Still eligible for dispatch
    Retry { attempts: u32 },
    /// Reached the attempt bound and became terminal
    Evicted { attempts: u32 },
    /// Record was already terminal; nothing changed
    AlreadyTerminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trip_str() {
        for source in Source::ALL {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert_eq!("WEBHOOK".parse::<Source>().unwrap(), Source::Webhook);
        assert!("rss".parse::<Source>().is_err());
    }

    #[test]
    fn test_automated_sources() {
        assert!(Source::Webhook.is_automated());
        assert!(Source::Bluesky.is_automated());
        assert!(!Source::Custom.is_automated());
        assert!(!Source::Hello.is_automated());
    }

    #[test]
    fn test_record_state() {
        let mut record = MessageRecord {
            id: MessageId::from("a"),
            payload: Grid::blank(),
            created_at: Utc::now(),
            source: Source::Custom,
            metadata: None,
            sent: false,
            attempts: 0,
            priority: 0,
            evicted: false,
        };
        assert_eq!(record.state(), RecordState::Pending);
        record.sent = true;
        assert_eq!(record.state(), RecordState::Sent);
        record.evicted = true;
        assert_eq!(record.state(), RecordState::Evicted);
        assert!(record.is_terminal());
    }
}
