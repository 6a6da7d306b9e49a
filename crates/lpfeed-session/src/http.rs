//! reqwest-backed [`LongpollApi`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use lpfeed_core::wire::ApiEnvelope;
use lpfeed_core::{AccountId, AccountKind, FeedConfig, ServerDescriptor, UpdateResponse};

use crate::api::{LongpollApi, PollRequest};
use crate::error::TransportError;

const USER_DESCRIPTOR_METHOD: &str = "messages.getLongPollServer";
const GROUP_DESCRIPTOR_METHOD: &str = "groups.getLongPollServer";

/// Supplies access tokens per account.
pub trait TokenSource: Send + Sync + 'static {
    fn access_token(&self, account_id: AccountId) -> Option<String>;
}

impl TokenSource for HashMap<AccountId, String> {
    fn access_token(&self, account_id: AccountId) -> Option<String> {
        self.get(&account_id).cloned()
    }
}

pub struct HttpLongpollApi {
    client: reqwest::Client,
    config: Arc<FeedConfig>,
    tokens: Arc<dyn TokenSource>,
}

impl HttpLongpollApi {
    /// The client timeout is the poll hold time plus slack, so a held poll
    /// is never cut short client-side.
    pub fn new(
        config: Arc<FeedConfig>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    fn descriptor_query(
        &self,
        account_id: AccountId,
        token: String,
    ) -> (&'static str, Vec<(&'static str, String)>) {
        let (method, mut query) = match account_id.kind() {
            AccountKind::User => (
                USER_DESCRIPTOR_METHOD,
                vec![
                    ("need_pts", "1".to_owned()),
                    ("lp_version", self.config.lp_version.to_string()),
                ],
            ),
            AccountKind::Group => (
                GROUP_DESCRIPTOR_METHOD,
                vec![("group_id", account_id.unsigned().to_string())],
            ),
        };
        query.push(("access_token", token));
        query.push(("v", self.config.api_version.clone()));
        (method, query)
    }
}

#[async_trait]
impl LongpollApi for HttpLongpollApi {
    async fn server_descriptor(
        &self,
        account_id: AccountId,
    ) -> Result<ServerDescriptor, TransportError> {
        let token = self
            .tokens
            .access_token(account_id)
            .ok_or(TransportError::MissingToken(account_id))?;
        let (method, query) = self.descriptor_query(account_id, token);
        let url = format!("{}/{method}", self.config.api_base_url.trim_end_matches('/'));

        tracing::debug!(account = %account_id, method, "requesting long-poll server");
        let body = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        decode_descriptor(&body)
    }

    async fn poll(&self, request: &PollRequest) -> Result<UpdateResponse, TransportError> {
        let mut query: Vec<(&str, String)> = vec![
            ("act", "a_check".to_owned()),
            ("key", request.key.clone()),
            ("ts", request.cursor.as_query_value()),
            ("wait", request.wait_secs.to_string()),
        ];
        if let Some(mode) = request.mode {
            query.push(("mode", mode.to_string()));
        }
        if let Some(version) = request.version {
            query.push(("version", version.to_string()));
        }

        let body = self
            .client
            .get(&request.url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        UpdateResponse::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

fn decode_descriptor(body: &[u8]) -> Result<ServerDescriptor, TransportError> {
    let envelope: ApiEnvelope<Value> =
        serde_json::from_slice(body).map_err(|e| TransportError::Malformed(e.to_string()))?;
    if let Some(error) = envelope.error {
        return Err(if error.is_auth_failure() {
            TransportError::Auth {
                code: error.error_code,
                message: error.error_msg,
            }
        } else {
            TransportError::Api {
                code: error.error_code,
                message: error.error_msg,
            }
        });
    }
    let response = envelope
        .response
        .ok_or_else(|| TransportError::Malformed("envelope without response".to_owned()))?;
    serde_json::from_value(response).map_err(|e| TransportError::Malformed(e.to_string()))
}
