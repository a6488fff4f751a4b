//! Fail-open moderation

use contracts::{ContentFilter, ModerationError, ModerationVerdict, QueueMetrics};
use tracing::{debug, warn};

/// Filter that accepts everything unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ContentFilter for AcceptAll {
    async fn review(&self, _text: &str) -> Result<ModerationVerdict, ModerationError> {
        Ok(ModerationVerdict::accept())
    }
}

/// Ask `filter` about `text`; any filter error counts as acceptance
pub async fn moderate_fail_open<C>(filter: &C, text: &str, metrics: &dyn QueueMetrics) -> ModerationVerdict
where
    C: ContentFilter + ?Sized,
{
    let verdict = match filter.review(text).await {
        Ok(verdict) => verdict,
        Err(err) => {
            metrics.api_error("moderate");
            warn!(error = %err, "Content filter failed, accepting text");
            ModerationVerdict::accept()
        }
    };

    metrics.content_filtered(verdict.is_accepted());
    if let ModerationVerdict::Reject { reason } = &verdict {
        debug!(reason = %reason, "Content rejected by filter");
    }
    verdict
}
