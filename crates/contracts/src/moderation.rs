//! ContentFilter trait - acceptability check for producer text

use serde::{Deserialize, Serialize};

use crate::ModerationError;

/// Moderation decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ModerationVerdict {
    /// Display; `text` replaces the original when the filter rewrote it
    Accept { text: Option<String> },
    /// Do not display
    Reject { reason: String },
}

impl ModerationVerdict {
    /// Accept unchanged
    pub fn accept() -> Self {
        Self::Accept { text: None }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    /// Text to display, falling back to `original` when not rewritten
    pub fn display_text<'a>(&'a self, original: &'a str) -> Option<&'a str> {
        match self {
            Self::Accept { text } => Some(text.as_deref().unwrap_or(original)),
            Self::Reject { .. } => None,
        }
    }
}

/// Acceptability check
///
/// Callers must treat an error as "accept" (fail open) so a broken filter
/// never blocks the queue.
#[trait_variant::make(ContentFilter: Send)]
pub trait LocalContentFilter {
    /// Review text for public display
    async fn review(&self, text: &str) -> Result<ModerationVerdict, ModerationError>;
}
