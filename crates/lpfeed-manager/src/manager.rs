//! Supervisor of per-account sessions.
//!
//! All map reads and writes happen under one lock. Sessions do their
//! network IO on their own tasks, so holding the lock never blocks on the
//! network. Idle timers get an explicit `Arc<Registry>` handle; the
//! manager aborts every timer on shutdown, which breaks the cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use lpfeed_core::{AccountId, FeedConfig, UpdateBatch};
use lpfeed_session::{SessionFactory, SessionPhase, UpdateSink};

use crate::consumer::UpdateConsumer;
use crate::entry::{Entry, TimerPhase};
use crate::pipeline::run_pipeline;

// ─── Registry ─────────────────────────────────────────────────────

struct Table {
    entries: HashMap<AccountId, Entry>,
    next_generation: u64,
}

impl Table {
    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

struct Registry {
    table: Mutex<Table>,
    factory: Arc<dyn SessionFactory>,
    sink: Arc<dyn UpdateSink>,
    keep_alive_tx: broadcast::Sender<AccountId>,
    runtime: Handle,
    idle_window: Duration,
}

impl Registry {
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn keep_alive(self: &Arc<Self>, account_id: AccountId) {
        let mut table = self.table();
        let generation = table.bump_generation();
        match table.entries.get_mut(&account_id) {
            Some(entry) => {
                tracing::debug!(account = %account_id, "renewing idle timer");
                if !entry.session().is_listening() {
                    tracing::warn!(account = %account_id, "session loop stopped, reconnecting");
                    entry.session().connect();
                }
                self.arm(entry, account_id, TimerPhase::PreDestroy, generation);
            }
            None => {
                tracing::info!(account = %account_id, "creating long-poll session");
                let session = self.factory.create(account_id, Arc::clone(&self.sink));
                session.connect();
                let mut entry = Entry::new(session);
                self.arm(&mut entry, account_id, TimerPhase::PreDestroy, generation);
                table.entries.insert(account_id, entry);
            }
        }
    }

    fn arm(
        self: &Arc<Self>,
        entry: &mut Entry,
        account_id: AccountId,
        phase: TimerPhase,
        generation: u64,
    ) {
        let registry = Arc::clone(self);
        let window = self.idle_window;
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            registry.on_timer(account_id, phase, generation);
        });
        entry.arm(phase, generation, handle);
    }

    fn on_timer(self: &Arc<Self>, account_id: AccountId, phase: TimerPhase, generation: u64) {
        let mut table = self.table();
        let current = table
            .entries
            .get(&account_id)
            .is_some_and(|entry| entry.is_current(phase, generation));
        if !current {
            tracing::trace!(account = %account_id, %phase, "stale idle timer ignored");
            return;
        }

        match phase {
            TimerPhase::PreDestroy => {
                let next = table.bump_generation();
                if let Some(entry) = table.entries.get_mut(&account_id) {
                    entry.disarm_fired();
                    self.arm(entry, account_id, TimerPhase::Destroy, next);
                }
                drop(table);
                tracing::debug!(
                    account = %account_id,
                    "idle window elapsed, requesting keep-alive"
                );
                // Nobody listening is fine; the destroy timer still runs.
                let _ = self.keep_alive_tx.send(account_id);
            }
            TimerPhase::Destroy => {
                let removed = table.entries.remove(&account_id);
                drop(table);
                if let Some(mut entry) = removed {
                    entry.disarm_fired();
                    entry.release();
                    tracing::info!(account = %account_id, "idle session destroyed");
                }
            }
        }
    }

    fn force_destroy(&self, account_id: AccountId) -> bool {
        let removed = self.table().entries.remove(&account_id);
        match removed {
            Some(mut entry) => {
                entry.release();
                tracing::info!(account = %account_id, "session force-destroyed");
                true
            }
            None => {
                tracing::debug!(account = %account_id, "force_destroy on unknown account");
                false
            }
        }
    }

    fn destroy_all(&self) -> usize {
        let drained: Vec<(AccountId, Entry)> = self.table().entries.drain().collect();
        let count = drained.len();
        for (_, mut entry) in drained {
            entry.release();
        }
        count
    }
}

// ─── Manager ──────────────────────────────────────────────────────

/// Keeps one long-poll session per account alive while someone is
/// interested in it, and fans their batches out to observers.
pub struct LongpollManager {
    inner: Arc<Registry>,
    updates_tx: broadcast::Sender<UpdateBatch>,
    pipeline: JoinHandle<()>,
}

impl LongpollManager {
    /// Build a manager on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        consumer: Arc<dyn UpdateConsumer>,
        config: &FeedConfig,
    ) -> Self {
        Self::with_runtime(factory, consumer, config, Handle::current())
    }

    pub fn with_runtime(
        factory: Arc<dyn SessionFactory>,
        consumer: Arc<dyn UpdateConsumer>,
        config: &FeedConfig,
        runtime: Handle,
    ) -> Self {
        let (batch_tx, batch_rx) = mpsc::unbounded_channel::<UpdateBatch>();
        let (updates_tx, _) = broadcast::channel(config.channel_capacity);
        let (keep_alive_tx, _) = broadcast::channel(config.channel_capacity);

        let pipeline = runtime.spawn(run_pipeline(batch_rx, consumer, updates_tx.clone()));
        let inner = Arc::new(Registry {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                next_generation: 0,
            }),
            factory,
            sink: Arc::new(batch_tx),
            keep_alive_tx,
            runtime,
            idle_window: config.idle_window(),
        });
        Self {
            inner,
            updates_tx,
            pipeline,
        }
    }

    /// Create and connect the account's session if absent, otherwise renew
    /// its idle timer.
    pub fn keep_alive(&self, account_id: AccountId) {
        self.inner.keep_alive(account_id);
    }

    /// Shut down and forget the account's session. Returns whether one
    /// existed; repeated calls are no-ops.
    pub fn force_destroy(&self, account_id: AccountId) -> bool {
        self.inner.force_destroy(account_id)
    }

    /// Every published batch, deduplicated, from the moment of the call.
    /// A subscriber that falls behind skips the batches it missed.
    pub fn observe(&self) -> impl Stream<Item = UpdateBatch> + Send + 'static {
        BroadcastStream::new(self.updates_tx.subscribe()).filter_map(|item| match item {
            Ok(batch) => Some(batch),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "update observer lagged");
                None
            }
        })
    }

    /// Account ids whose pre-destroy timer fired. Answering with
    /// [`keep_alive`](Self::keep_alive) keeps the session.
    pub fn observe_keep_alive(&self) -> impl Stream<Item = AccountId> + Send + 'static {
        BroadcastStream::new(self.inner.keep_alive_tx.subscribe()).filter_map(|item| match item {
            Ok(account_id) => Some(account_id),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "keep-alive observer lagged");
                None
            }
        })
    }

    pub fn active_accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.inner.table().entries.keys().copied().collect();
        accounts.sort();
        accounts
    }

    pub fn is_listening(&self, account_id: AccountId) -> bool {
        self.inner
            .table()
            .entries
            .get(&account_id)
            .is_some_and(|entry| !entry.is_released() && entry.session().is_listening())
    }

    pub fn session_phase(&self, account_id: AccountId) -> Option<SessionPhase> {
        self.inner
            .table()
            .entries
            .get(&account_id)
            .map(|entry| entry.session().phase())
    }

    pub fn idle_timer_phase(&self, account_id: AccountId) -> Option<TimerPhase> {
        self.inner
            .table()
            .entries
            .get(&account_id)
            .and_then(Entry::armed_phase)
    }

    /// Destroy every session. The manager stays usable.
    pub fn shutdown(&self) {
        let count = self.inner.destroy_all();
        if count > 0 {
            tracing::info!(sessions = count, "long-poll manager shut down");
        }
    }
}

impl Drop for LongpollManager {
    fn drop(&mut self) {
        self.shutdown();
        self.pipeline.abort();
    }
}
