//! Scripted in-memory [`LongpollApi`] for tests.
//!
//! Responses are queued per call kind and consumed in order. With the
//! descriptor queue empty every account gets an idle server; with the poll
//! queue empty a poll is held forever, like a quiet server.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use lpfeed_core::{AccountId, Cursor, ServerDescriptor, UpdateResponse};

use crate::api::{LongpollApi, PollRequest};
use crate::error::TransportError;

pub const IDLE_HOST: &str = "lp.test/idle";
pub const IDLE_KEY: &str = "idle-key";

/// One observed call, in the order the sessions made them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Descriptor(AccountId),
    Poll {
        account_id: AccountId,
        key: String,
        cursor: Cursor,
    },
}

impl ApiCall {
    pub fn is_descriptor(&self) -> bool {
        matches!(self, Self::Descriptor(_))
    }
}

#[derive(Default)]
struct Script {
    descriptors: VecDeque<Result<ServerDescriptor, TransportError>>,
    polls: VecDeque<Result<UpdateResponse, TransportError>>,
    calls: Vec<ApiCall>,
}

#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_descriptor(&self, result: Result<ServerDescriptor, TransportError>) {
        self.script().descriptors.push_back(result);
    }

    pub fn push_poll(&self, result: Result<UpdateResponse, TransportError>) {
        self.script().polls.push_back(result);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.script().calls.clone()
    }

    pub fn descriptor_calls(&self, account_id: AccountId) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|c| **c == ApiCall::Descriptor(account_id))
            .count()
    }
}

#[async_trait]
impl LongpollApi for ScriptedApi {
    async fn server_descriptor(
        &self,
        account_id: AccountId,
    ) -> Result<ServerDescriptor, TransportError> {
        let mut script = self.script();
        script.calls.push(ApiCall::Descriptor(account_id));
        script
            .descriptors
            .pop_front()
            .unwrap_or_else(|| Ok(ServerDescriptor::new(IDLE_HOST, IDLE_KEY, 0_i64)))
    }

    async fn poll(&self, request: &PollRequest) -> Result<UpdateResponse, TransportError> {
        let next = {
            let mut script = self.script();
            script.calls.push(ApiCall::Poll {
                account_id: request.account_id,
                key: request.key.clone(),
                cursor: request.cursor.clone(),
            });
            script.polls.pop_front()
        };
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}
