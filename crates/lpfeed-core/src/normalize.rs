//! Direction fix-ups applied to user-server batches.

use crate::types::AccountId;
use crate::update::{UpdateBatch, UpdateRecord};

/// Messages sent to the account's own dialog are outgoing, and every
/// outgoing message is authored by the account.
pub fn mark_outgoing(account_id: AccountId, batch: &mut UpdateBatch) {
    let own = account_id.get();
    for record in &mut batch.records {
        if let UpdateRecord::MessageAdded(m) = record {
            if m.peer_id == own {
                m.is_out = true;
            }
            if m.is_out {
                m.from_id = own;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::MessageAdded;

    fn message(peer: i64, from: i64, is_out: bool) -> UpdateRecord {
        UpdateRecord::MessageAdded(MessageAdded {
            message_id: 1,
            peer_id: peer,
            from_id: from,
            is_out,
            ..Default::default()
        })
    }

    #[test]
    fn self_dialog_becomes_outgoing() {
        let mut batch = UpdateBatch::new(AccountId(100), vec![message(100, 100, false)]);
        mark_outgoing(AccountId(100), &mut batch);
        let m = batch.message_additions().next().unwrap();
        assert!(m.is_out);
        assert_eq!(m.from_id, 100);
    }

    #[test]
    fn outgoing_author_is_account() {
        let mut batch = UpdateBatch::new(
            AccountId(100),
            vec![message(7, 0, true), message(8, 8, false)],
        );
        mark_outgoing(AccountId(100), &mut batch);
        let froms: Vec<i64> = batch.message_additions().map(|m| m.from_id).collect();
        assert_eq!(froms, vec![100, 8]);
    }
}
