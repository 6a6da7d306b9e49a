//! The network seam between a session and the remote service.

use async_trait::async_trait;

use lpfeed_core::{AccountId, Cursor, ServerDescriptor, UpdateResponse};

use crate::error::TransportError;

/// One long-poll request, fully resolved by the endpoint variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub account_id: AccountId,
    /// Absolute URL of the poll server, scheme included.
    pub url: String,
    pub key: String,
    pub cursor: Cursor,
    pub wait_secs: u64,
    /// Event-mode bitmask (user servers only).
    pub mode: Option<u32>,
    /// Protocol version (user servers only).
    pub version: Option<u32>,
}

/// Obtains server descriptors and performs polls.
///
/// Implementations pick the descriptor endpoint from
/// [`AccountId::kind`]. Neither call retries internally; retry policy lives
/// in the session.
#[async_trait]
pub trait LongpollApi: Send + Sync + 'static {
    async fn server_descriptor(&self, account_id: AccountId)
    -> Result<ServerDescriptor, TransportError>;

    async fn poll(&self, request: &PollRequest) -> Result<UpdateResponse, TransportError>;
}
