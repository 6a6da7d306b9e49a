//! Downstream seam of the batch pipeline.

use async_trait::async_trait;

use lpfeed_core::{AccountId, MessageAdded, UpdateBatch};

/// Failures reported by downstream consumers. They are external
/// collaborators, so their errors stay opaque.
pub type ConsumerError = anyhow::Error;

/// Called by the pipeline for every batch, one batch at a time, in arrival
/// order.
#[async_trait]
pub trait UpdateConsumer: Send + Sync + 'static {
    /// Deduplicated message additions of a batch. Not called when none
    /// remain.
    async fn on_messages_ready(&self, _account_id: AccountId, _messages: &[MessageAdded]) {}

    /// Store a batch that carries more than message additions. A failure
    /// keeps the batch from being published.
    async fn persist(&self, _batch: &UpdateBatch) -> Result<(), ConsumerError> {
        Ok(())
    }
}

/// Consumer that accepts everything and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConsumer;

#[async_trait]
impl UpdateConsumer for NoopConsumer {}
