//! The two server variants.
//!
//! A variant decides how a poll request is addressed and how raw events
//! become records. Everything else about a session is shared.

use lpfeed_core::normalize::mark_outgoing;
use lpfeed_core::wire::{parse_group_update, parse_user_update};
use lpfeed_core::{AccountId, AccountKind, FeedConfig, ServerDescriptor, UpdateBatch, UpdateRecord};
use serde_json::Value;

use crate::api::PollRequest;

/// Message events, attachments, extended events, random ids.
/// 2 + 8 + 64 + 128.
pub const USER_POLL_MODE: u32 = 202;

pub trait LongpollEndpoint: Send + Sync + 'static {
    const KIND: AccountKind;

    fn poll_request(
        account_id: AccountId,
        server: &ServerDescriptor,
        config: &FeedConfig,
    ) -> PollRequest;

    fn parse_event(event: &Value) -> Option<UpdateRecord>;

    /// Variant-specific fix-ups applied before the batch leaves the session.
    fn normalize(_account_id: AccountId, _batch: &mut UpdateBatch) {}
}

/// Personal-account server. The descriptor host comes without a scheme.
pub struct UserEndpoint;

impl LongpollEndpoint for UserEndpoint {
    const KIND: AccountKind = AccountKind::User;

    fn poll_request(
        account_id: AccountId,
        server: &ServerDescriptor,
        config: &FeedConfig,
    ) -> PollRequest {
        PollRequest {
            account_id,
            url: format!("https://{}", server.host),
            key: server.key.clone(),
            cursor: server.cursor.clone(),
            wait_secs: config.wait_secs,
            mode: Some(USER_POLL_MODE),
            version: Some(config.lp_version),
        }
    }

    fn parse_event(event: &Value) -> Option<UpdateRecord> {
        parse_user_update(event)
    }

    fn normalize(account_id: AccountId, batch: &mut UpdateBatch) {
        mark_outgoing(account_id, batch);
    }
}

/// Community server. The descriptor host is already an absolute URL.
pub struct GroupEndpoint;

impl LongpollEndpoint for GroupEndpoint {
    const KIND: AccountKind = AccountKind::Group;

    fn poll_request(
        account_id: AccountId,
        server: &ServerDescriptor,
        config: &FeedConfig,
    ) -> PollRequest {
        PollRequest {
            account_id,
            url: server.host.clone(),
            key: server.key.clone(),
            cursor: server.cursor.clone(),
            wait_secs: config.wait_secs,
            mode: None,
            version: None,
        }
    }

    fn parse_event(event: &Value) -> Option<UpdateRecord> {
        parse_group_update(event)
    }
}

/// Decode every event of a response, skipping the ones this variant does
/// not understand.
pub fn decode_events<E: LongpollEndpoint>(events: &[Value]) -> Vec<UpdateRecord> {
    let records: Vec<UpdateRecord> = events.iter().filter_map(E::parse_event).collect();
    let skipped = events.len() - records.len();
    if skipped > 0 {
        tracing::trace!(kind = %E::KIND, skipped, "ignored unrecognised events");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_request_adds_scheme_and_mode() {
        let server = ServerDescriptor::new("im.example/nim1", "k", 10_i64);
        let req = UserEndpoint::poll_request(AccountId(5), &server, &FeedConfig::default());
        assert_eq!(req.url, "https://im.example/nim1");
        assert_eq!(req.mode, Some(202));
        assert_eq!(req.version, Some(10));
        assert_eq!(req.wait_secs, 25);
    }

    #[test]
    fn group_request_keeps_host_verbatim() {
        let server = ServerDescriptor::new("https://lp.example/wh1", "k", "tok");
        let req = GroupEndpoint::poll_request(AccountId(-1), &server, &FeedConfig::default());
        assert_eq!(req.url, "https://lp.example/wh1");
        assert_eq!(req.mode, None);
        assert_eq!(req.version, None);
    }

    #[test]
    fn unknown_events_are_skipped() {
        let events = vec![json!([80, 4, 0]), json!([9999, 1]), json!("junk")];
        let records = decode_events::<UserEndpoint>(&events);
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], UpdateRecord::BadgeCount { count: 4 }));
    }
}
