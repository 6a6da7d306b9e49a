//! Removal of message additions superseded by reaction changes.
//!
//! When a batch carries both a message-added record and a reaction-changed
//! record for the same `(peer_id, conversation_message_id)`, the reaction
//! record is authoritative and the addition must not reach the per-message
//! processor (it would be counted twice).

use std::collections::HashSet;

use crate::update::{MessageAdded, UpdateBatch, UpdateRecord};

type MessageKey = (i64, i64);

/// Positions (in `records`) of message additions superseded by a reaction
/// change in the same slice. Ascending order, no duplicates.
pub fn superseded_positions(records: &[UpdateRecord]) -> Vec<usize> {
    let reacted: HashSet<MessageKey> = records
        .iter()
        .filter_map(UpdateRecord::as_reaction_changed)
        .map(|r| (r.peer_id, r.conversation_message_id))
        .collect();
    if reacted.is_empty() {
        return Vec::new();
    }

    records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let m = r.as_message_added()?;
            reacted
                .contains(&(m.peer_id, m.conversation_message_id))
                .then_some(i)
        })
        .collect()
}

/// Drop superseded additions from the batch in place and return the
/// additions that remain, in their original order.
///
/// Reaction records and every other record kind are kept.
pub fn dedup_batch(batch: &mut UpdateBatch) -> Vec<MessageAdded> {
    let positions = superseded_positions(&batch.records);
    if !positions.is_empty() {
        tracing::debug!(
            account = %batch.account_id,
            dropped = positions.len(),
            "dropping message additions superseded by reactions"
        );
    }
    // Descending so earlier indices stay valid.
    for &i in positions.iter().rev() {
        batch.records.remove(i);
    }
    batch.message_additions().cloned().collect()
}
