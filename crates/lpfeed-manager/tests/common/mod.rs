#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lpfeed_core::{AccountId, FeedConfig, MessageAdded, UpdateBatch};
use lpfeed_manager::{ConsumerError, LongpollManager, NoopConsumer, UpdateConsumer};
use lpfeed_session::{Longpoll, SessionFactory, SessionPhase, UpdateSink};

// ── counting factory ──

/// Side effects observed across every session a factory created.
#[derive(Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub connects: AtomicUsize,
    pub shutdowns: AtomicUsize,
    /// Makes every session report its loop as stopped until reconnected.
    pub stalled: AtomicBool,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    account_id: AccountId,
    listening: AtomicBool,
    counters: Arc<Counters>,
}

impl Longpoll for FakeSession {
    fn account_id(&self) -> AccountId {
        self.account_id
    }

    fn connect(&self) {
        if self.is_listening() {
            return;
        }
        self.listening.store(true, Ordering::SeqCst);
        self.counters.stalled.store(false, Ordering::SeqCst);
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst) && !self.counters.stalled.load(Ordering::SeqCst)
    }

    fn phase(&self) -> SessionPhase {
        if self.is_listening() {
            SessionPhase::Polling
        } else {
            SessionPhase::Idle
        }
    }
}

#[derive(Default)]
pub struct CountingFactory {
    pub counters: Arc<Counters>,
}

impl SessionFactory for CountingFactory {
    fn create(&self, account_id: AccountId, _sink: Arc<dyn UpdateSink>) -> Box<dyn Longpoll> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeSession {
            account_id,
            listening: AtomicBool::new(false),
            counters: Arc::clone(&self.counters),
        })
    }
}

pub fn counting_manager() -> (LongpollManager, Arc<Counters>) {
    let factory = CountingFactory::default();
    let counters = Arc::clone(&factory.counters);
    let manager = LongpollManager::new(
        Arc::new(factory),
        Arc::new(NoopConsumer),
        &FeedConfig::default(),
    );
    (manager, counters)
}

// ── recording consumer ──

#[derive(Default)]
pub struct RecordingConsumer {
    pub ready: Mutex<Vec<(AccountId, Vec<MessageAdded>)>>,
    pub persisted: Mutex<Vec<UpdateBatch>>,
    pub fail_persist: AtomicBool,
}

#[async_trait]
impl UpdateConsumer for RecordingConsumer {
    async fn on_messages_ready(&self, account_id: AccountId, messages: &[MessageAdded]) {
        self.ready
            .lock()
            .unwrap()
            .push((account_id, messages.to_vec()));
    }

    async fn persist(&self, batch: &UpdateBatch) -> Result<(), ConsumerError> {
        if self.fail_persist.swap(false, Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        self.persisted.lock().unwrap().push(batch.clone());
        Ok(())
    }
}
