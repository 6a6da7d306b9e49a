//! Serial batch pipeline: dedup, hand off downstream, publish.
//!
//! A single task drains every session's batches so consumers and observers
//! see them in arrival order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use lpfeed_core::{UpdateBatch, dedup_batch};

use crate::consumer::UpdateConsumer;

/// What happened to one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    Published,
    /// Rejected-cursor batch, or persisting failed; observers never saw it.
    Dropped,
}

pub(crate) async fn run_pipeline(
    mut rx: mpsc::UnboundedReceiver<UpdateBatch>,
    consumer: Arc<dyn UpdateConsumer>,
    updates_tx: broadcast::Sender<UpdateBatch>,
) {
    while let Some(batch) = rx.recv().await {
        process_batch(consumer.as_ref(), &updates_tx, batch).await;
    }
    tracing::debug!("batch pipeline stopped");
}

pub(crate) async fn process_batch(
    consumer: &dyn UpdateConsumer,
    updates_tx: &broadcast::Sender<UpdateBatch>,
    mut batch: UpdateBatch,
) -> BatchOutcome {
    if batch.is_failed() {
        tracing::debug!(account = %batch.account_id, "dropping batch with rejected cursor");
        return BatchOutcome::Dropped;
    }

    let additions = dedup_batch(&mut batch);
    if !additions.is_empty() {
        consumer
            .on_messages_ready(batch.account_id, &additions)
            .await;
    }

    if !batch.is_only_add_messages() {
        if let Err(e) = consumer.persist(&batch).await {
            tracing::warn!(
                account = %batch.account_id,
                records = batch.len(),
                error = %e,
                "failed to persist batch, not publishing"
            );
            return BatchOutcome::Dropped;
        }
    }

    // No subscribers is not an error.
    let _ = updates_tx.send(batch);
    BatchOutcome::Published
}
