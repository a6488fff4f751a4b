//! Ingestion Pipeline main entry

use std::sync::Arc;

use contracts::{
    ContentFilter, Grid, MessageRecord, ModerationVerdict, PayloadFormatter, QueueError,
    QueueMetrics, Source, VbmlMessage,
};
use queue_store::PersistentQueueStore;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::error::{IngestionError, Result};
use crate::moderation::moderate_fail_open;

/// Ingestion Pipeline
///
/// Producer-side path into the store: lock gate, moderation, formatting,
/// enqueue. The lock is checked before any collaborator call.
pub struct IngestionPipeline<F, C> {
    store: Arc<PersistentQueueStore>,
    formatter: F,
    filter: C,
    metrics: Arc<dyn QueueMetrics>,
}

impl<F, C> IngestionPipeline<F, C>
where
    F: PayloadFormatter + Sync,
    C: ContentFilter + Sync,
{
    /// Create new Ingestion Pipeline
    pub fn new(
        store: Arc<PersistentQueueStore>,
        formatter: F,
        filter: C,
        metrics: Arc<dyn QueueMetrics>,
    ) -> Self {
        Self {
            store,
            formatter,
            filter,
            metrics,
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<PersistentQueueStore> {
        &self.store
    }

    /// Moderate, centre and enqueue free text
    #[instrument(name = "ingestion_submit_text", skip(self, text, metadata), fields(source = %source))]
    pub async fn submit_text(
        &self,
        text: &str,
        source: Source,
        metadata: Option<Value>,
    ) -> Result<MessageRecord> {
        self.ensure_open(source)?;

        let verdict = moderate_fail_open(&self.filter, text, self.metrics.as_ref()).await;
        let shown = match &verdict {
            ModerationVerdict::Accept { .. } => verdict.display_text(text).unwrap_or(text).to_string(),
            ModerationVerdict::Reject { reason } => {
                info!(reason = %reason, "Submission rejected by content filter");
                return Err(IngestionError::Rejected {
                    reason: reason.clone(),
                });
            }
        };

        let grid = self.format(&VbmlMessage::centered(shown.as_str())).await?;
        let metadata = with_moderation(metadata, text, &shown);
        Ok(self.store.enqueue(grid, source, metadata)?)
    }

    /// Format a prepared layout and enqueue it
    #[instrument(name = "ingestion_submit_message", skip(self, message, metadata), fields(source = %source))]
    pub async fn submit_message(
        &self,
        message: &VbmlMessage,
        source: Source,
        metadata: Option<Value>,
    ) -> Result<MessageRecord> {
        self.ensure_open(source)?;
        let grid = self.format(message).await?;
        Ok(self.store.enqueue(grid, source, metadata)?)
    }

    /// Enqueue an already formatted grid
    pub fn submit_grid(
        &self,
        grid: Grid,
        source: Source,
        metadata: Option<Value>,
    ) -> Result<MessageRecord> {
        Ok(self.store.enqueue(grid, source, metadata)?)
    }

    /// Validate raw rows and enqueue them
    pub fn submit_rows(
        &self,
        rows: Vec<Vec<i64>>,
        source: Source,
        metadata: Option<Value>,
    ) -> Result<MessageRecord> {
        Ok(self.store.enqueue_rows(rows, source, metadata)?)
    }

    /// Refuse gated sources while locked, before any external call
    fn ensure_open(&self, source: Source) -> Result<()> {
        if !source.is_automated() {
            return Ok(());
        }

        let state = self.store.get_state()?;
        if state.control.locked {
            self.metrics.enqueue_locked_out(source);
            debug!(source = %source, "Store locked, skipping submission");
            return Err(QueueError::Locked {
                reason: state.control.lock_reason,
            }
            .into());
        }
        Ok(())
    }

    async fn format(&self, message: &VbmlMessage) -> Result<Grid> {
        self.formatter.format(message).await.map_err(|err| {
            self.metrics.api_error("format");
            IngestionError::from(err)
        })
    }
}

/// Attach the original text when moderation rewrote it
fn with_moderation(metadata: Option<Value>, original: &str, shown: &str) -> Option<Value> {
    if original == shown {
        return metadata;
    }

    let note = json!({ "filtered": true, "original_text": original });
    match metadata {
        Some(Value::Object(mut map)) => {
            map.insert("moderation".to_string(), note);
            Some(Value::Object(map))
        }
        Some(other) => Some(json!({ "data": other, "moderation": note })),
        None => Some(json!({ "moderation": note })),
    }
}
