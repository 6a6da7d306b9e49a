//! Per-account long-poll session.
//!
//! A session owns one background task that cycles
//! `NoServer -> AwaitingServer -> Polling -> Backoff` until shut down.
//! The loop is strictly sequential: at most one descriptor or poll call is
//! in flight per session. Every failure is retried after a fixed backoff and
//! never leaves the session.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lpfeed_core::{AccountId, AccountKind, Cursor, FeedConfig, ServerDescriptor, UpdateBatch};

use crate::api::LongpollApi;
use crate::endpoint::{GroupEndpoint, LongpollEndpoint, UserEndpoint, decode_events};
use crate::error::{LongpollError, TransportError};

// ─── Sink ─────────────────────────────────────────────────────────

/// Receives every non-empty batch a session decodes, in cursor order.
pub trait UpdateSink: Send + Sync + 'static {
    fn on_updates(&self, batch: UpdateBatch);
}

impl UpdateSink for mpsc::UnboundedSender<UpdateBatch> {
    fn on_updates(&self, batch: UpdateBatch) {
        if self.send(batch).is_err() {
            tracing::debug!("update receiver gone, dropping batch");
        }
    }
}

// ─── Phase ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Not listening.
    Idle,
    NoServer,
    AwaitingServer,
    Polling,
    Backoff,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::NoServer => "no_server",
            Self::AwaitingServer => "awaiting_server",
            Self::Polling => "polling",
            Self::Backoff => "backoff",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Longpoll trait ───────────────────────────────────────────────

/// Object-safe handle on one account's session.
pub trait Longpoll: Send + Sync {
    fn account_id(&self) -> AccountId;

    /// Start the loop. No-op while already listening.
    fn connect(&self);

    /// Cancel the in-flight call and any pending retry. Idempotent.
    fn shutdown(&self);

    /// True while a call is in flight or a retry is scheduled.
    fn is_listening(&self) -> bool;

    fn phase(&self) -> SessionPhase;
}

// ─── Session ──────────────────────────────────────────────────────

struct SessionState {
    server: Option<ServerDescriptor>,
    phase: SessionPhase,
}

struct Shared {
    account_id: AccountId,
    api: Arc<dyn LongpollApi>,
    sink: Arc<dyn UpdateSink>,
    config: Arc<FeedConfig>,
    state: Mutex<SessionState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.state().phase = phase;
    }

    fn current_server(&self) -> Option<ServerDescriptor> {
        self.state().server.clone()
    }

    fn adopt_server(&self, server: ServerDescriptor) {
        let mut state = self.state();
        state.server = Some(server);
        state.phase = SessionPhase::Polling;
    }

    fn clear_server(&self) {
        let mut state = self.state();
        state.server = None;
        state.phase = SessionPhase::NoServer;
    }

    fn advance_cursor(&self, polled: &ServerDescriptor, cursor: Cursor) {
        let mut state = self.state();
        if state.server.is_some() {
            state.server = Some(polled.with_cursor(cursor));
        }
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Long-poll session for one account, parameterized by server variant.
pub struct PollSession<E> {
    shared: Arc<Shared>,
    runtime: Handle,
    worker: Mutex<Option<Worker>>,
    _endpoint: PhantomData<fn() -> E>,
}

pub type UserLongpoll = PollSession<UserEndpoint>;
pub type GroupLongpoll = PollSession<GroupEndpoint>;

impl<E> PollSession<E> {
    pub fn new(
        account_id: AccountId,
        api: Arc<dyn LongpollApi>,
        sink: Arc<dyn UpdateSink>,
        config: Arc<FeedConfig>,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                account_id,
                api,
                sink,
                config,
                state: Mutex::new(SessionState {
                    server: None,
                    phase: SessionPhase::Idle,
                }),
            }),
            runtime,
            worker: Mutex::new(None),
            _endpoint: PhantomData,
        }
    }

    /// Descriptor currently held, if any.
    pub fn server(&self) -> Option<ServerDescriptor> {
        self.shared.current_server()
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        let Some(worker) = self.worker().take() else {
            return;
        };
        worker.cancel.cancel();
        worker.handle.abort();
        tracing::info!(account = %self.shared.account_id, "long-poll session shut down");
    }
}

impl<E: LongpollEndpoint> Longpoll for PollSession<E> {
    fn account_id(&self) -> AccountId {
        self.shared.account_id
    }

    fn connect(&self) {
        let mut worker = self.worker();
        if worker.as_ref().is_some_and(Worker::is_active) {
            tracing::trace!(
                account = %self.shared.account_id,
                "connect ignored, already listening"
            );
            return;
        }
        let cancel = CancellationToken::new();
        let handle = self
            .runtime
            .spawn(run::<E>(Arc::clone(&self.shared), cancel.clone()));
        *worker = Some(Worker { cancel, handle });
        tracing::info!(
            account = %self.shared.account_id,
            kind = %E::KIND,
            "long-poll session connected"
        );
    }

    fn shutdown(&self) {
        self.stop();
    }

    fn is_listening(&self) -> bool {
        self.worker().as_ref().is_some_and(Worker::is_active)
    }

    fn phase(&self) -> SessionPhase {
        if self.is_listening() {
            self.shared.state().phase
        } else {
            SessionPhase::Idle
        }
    }
}

impl<E> Drop for PollSession<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Loop ─────────────────────────────────────────────────────────

enum Step {
    Continue,
    Retry(LongpollError),
}

async fn run<E: LongpollEndpoint>(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            step = advance::<E>(&shared) => step,
        };
        let Step::Retry(err) = step else {
            continue;
        };

        match &err {
            LongpollError::CursorExpired { .. } => {
                tracing::info!(
                    account = %shared.account_id,
                    error = %err,
                    "re-negotiating long-poll server"
                );
            }
            _ => {
                tracing::warn!(
                    account = %shared.account_id,
                    error = %err,
                    "long-poll call failed, backing off"
                );
            }
        }
        shared.set_phase(SessionPhase::Backoff);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.config.backoff()) => {}
        }
    }
    tracing::debug!(account = %shared.account_id, "long-poll loop stopped");
}

async fn advance<E: LongpollEndpoint>(shared: &Shared) -> Step {
    match shared.current_server() {
        None => fetch_server(shared).await,
        Some(server) => poll_once::<E>(shared, &server).await,
    }
}

async fn fetch_server(shared: &Shared) -> Step {
    shared.set_phase(SessionPhase::AwaitingServer);
    match shared.api.server_descriptor(shared.account_id).await {
        Ok(server) if server.is_valid() => {
            tracing::info!(
                account = %shared.account_id,
                host = %server.host,
                cursor = %server.cursor,
                "long-poll server acquired"
            );
            shared.adopt_server(server);
            Step::Continue
        }
        Ok(_) => Step::Retry(LongpollError::ServerDescriptor(TransportError::Malformed(
            "descriptor without host or key".to_owned(),
        ))),
        Err(e) => Step::Retry(LongpollError::ServerDescriptor(e)),
    }
}

async fn poll_once<E: LongpollEndpoint>(shared: &Shared, server: &ServerDescriptor) -> Step {
    shared.set_phase(SessionPhase::Polling);
    let request = E::poll_request(shared.account_id, server, &shared.config);
    let response = match shared.api.poll(&request).await {
        Ok(response) => response,
        Err(e) => return Step::Retry(LongpollError::Poll(e)),
    };

    // Events riding along with a failed response are discarded.
    if response.failed > 0 {
        shared.clear_server();
        return Step::Retry(LongpollError::CursorExpired {
            failed: response.failed,
        });
    }
    let Some(next) = response.next_cursor().cloned() else {
        return Step::Retry(LongpollError::Poll(TransportError::Malformed(
            "response without ts".to_owned(),
        )));
    };

    let records = decode_events::<E>(&response.updates);
    shared.advance_cursor(server, next);
    if !records.is_empty() {
        let mut batch = UpdateBatch::new(shared.account_id, records);
        E::normalize(shared.account_id, &mut batch);
        tracing::debug!(account = %shared.account_id, records = batch.len(), "batch received");
        shared.sink.on_updates(batch);
    }
    Step::Continue
}

// ─── Factory ──────────────────────────────────────────────────────

/// Pick the session variant from the sign of the account id.
pub fn create_session(
    account_id: AccountId,
    api: Arc<dyn LongpollApi>,
    sink: Arc<dyn UpdateSink>,
    config: Arc<FeedConfig>,
    runtime: Handle,
) -> Box<dyn Longpoll> {
    match account_id.kind() {
        AccountKind::User => Box::new(UserLongpoll::new(account_id, api, sink, config, runtime)),
        AccountKind::Group => Box::new(GroupLongpoll::new(account_id, api, sink, config, runtime)),
    }
}

/// Creates sessions for the manager.
pub trait SessionFactory: Send + Sync + 'static {
    fn create(&self, account_id: AccountId, sink: Arc<dyn UpdateSink>) -> Box<dyn Longpoll>;
}

/// [`SessionFactory`] backed by [`create_session`].
pub struct LongpollSessionFactory {
    api: Arc<dyn LongpollApi>,
    config: Arc<FeedConfig>,
    runtime: Handle,
}

impl LongpollSessionFactory {
    pub fn new(api: Arc<dyn LongpollApi>, config: Arc<FeedConfig>, runtime: Handle) -> Self {
        Self {
            api,
            config,
            runtime,
        }
    }
}

impl SessionFactory for LongpollSessionFactory {
    fn create(&self, account_id: AccountId, sink: Arc<dyn UpdateSink>) -> Box<dyn Longpoll> {
        create_session(
            account_id,
            Arc::clone(&self.api),
            sink,
            Arc::clone(&self.config),
            self.runtime.clone(),
        )
    }
}
