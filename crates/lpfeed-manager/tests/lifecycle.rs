mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;

use lpfeed_core::{AccountId, FeedConfig};
use lpfeed_manager::{LongpollManager, NoopConsumer, TimerPhase};

use common::{CountingFactory, counting_manager};

const A: AccountId = AccountId(100);
const B: AccountId = AccountId(-7);

// ── creation ──

#[tokio::test(start_paused = true)]
async fn keep_alive_creates_one_session() {
    let (manager, counters) = counting_manager();

    manager.keep_alive(A);
    manager.keep_alive(A);
    manager.keep_alive(A);

    assert_eq!(counters.created(), 1);
    assert_eq!(counters.connects(), 1);
    assert_eq!(manager.active_accounts(), vec![A]);
    assert!(manager.is_listening(A));
}

#[tokio::test(start_paused = true)]
async fn accounts_are_independent() {
    let (manager, counters) = counting_manager();

    manager.keep_alive(A);
    manager.keep_alive(B);
    assert_eq!(counters.created(), 2);
    assert_eq!(manager.active_accounts(), vec![B, A]);

    manager.force_destroy(B);
    assert!(manager.is_listening(A));
    assert!(!manager.is_listening(B));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_keep_alive_yields_single_session() {
    let (manager, counters) = counting_manager();
    let manager = Arc::new(manager);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            scope.spawn(move || {
                for _ in 0..50 {
                    manager.keep_alive(A);
                }
            });
        }
    });

    assert_eq!(counters.created(), 1);
    assert_eq!(counters.connects(), 1);
    assert_eq!(manager.active_accounts(), vec![A]);
}

#[tokio::test(start_paused = true)]
async fn renewal_restarts_stopped_session() {
    let (manager, counters) = counting_manager();
    manager.keep_alive(A);
    counters.stalled.store(true, Ordering::SeqCst);
    assert!(!manager.is_listening(A));

    manager.keep_alive(A);

    assert_eq!(counters.created(), 1);
    assert_eq!(counters.connects(), 2);
    assert!(manager.is_listening(A));
}

// ── timer law ──

#[tokio::test(start_paused = true)]
async fn idle_session_pings_once_then_dies() {
    let (manager, counters) = counting_manager();
    let mut pings = Box::pin(manager.observe_keep_alive());

    manager.keep_alive(A);

    // Nothing before the first window closes.
    assert!(timeout(Duration::from_secs(29), pings.next()).await.is_err());
    assert_eq!(pings.next().await, Some(A));
    assert_eq!(manager.idle_timer_phase(A), Some(TimerPhase::Destroy));

    sleep(Duration::from_secs(29)).await;
    assert_eq!(manager.active_accounts(), vec![A]);

    sleep(Duration::from_secs(2)).await;
    assert!(manager.active_accounts().is_empty());
    assert_eq!(counters.shutdowns(), 1);

    // Exactly one ping per idle period.
    assert!(timeout(Duration::from_secs(120), pings.next()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn renewal_in_second_window_keeps_session() {
    let (manager, counters) = counting_manager();
    let mut pings = Box::pin(manager.observe_keep_alive());

    manager.keep_alive(A);
    assert_eq!(pings.next().await, Some(A)); // t = 30

    sleep(Duration::from_secs(15)).await; // t = 45
    manager.keep_alive(A);
    assert_eq!(manager.idle_timer_phase(A), Some(TimerPhase::PreDestroy));

    sleep(Duration::from_secs(20)).await; // t = 65, old destroy deadline passed
    assert_eq!(manager.active_accounts(), vec![A]);
    assert_eq!(counters.created(), 1);

    assert_eq!(pings.next().await, Some(A)); // t = 75
    sleep(Duration::from_secs(31)).await; // t = 106
    assert!(manager.active_accounts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn renewal_in_first_window_defers_ping() {
    let (manager, _counters) = counting_manager();
    let mut pings = Box::pin(manager.observe_keep_alive());

    manager.keep_alive(A);
    sleep(Duration::from_secs(20)).await;
    manager.keep_alive(A);

    // The original deadline at t = 30 must not fire.
    assert!(timeout(Duration::from_secs(29), pings.next()).await.is_err());
    assert_eq!(pings.next().await, Some(A)); // t = 50
}

#[tokio::test(start_paused = true)]
async fn idle_window_follows_config() {
    let factory = CountingFactory::default();
    let config = FeedConfig {
        idle_window_secs: 5,
        ..FeedConfig::default()
    };
    let manager = LongpollManager::new(Arc::new(factory), Arc::new(NoopConsumer), &config);

    manager.keep_alive(A);
    sleep(Duration::from_secs(11)).await;
    assert!(manager.active_accounts().is_empty());
}

// ── destroy ──

#[tokio::test(start_paused = true)]
async fn force_destroy_is_idempotent() {
    let (manager, counters) = counting_manager();
    let mut pings = Box::pin(manager.observe_keep_alive());

    manager.keep_alive(A);
    assert!(manager.force_destroy(A));
    assert!(!manager.force_destroy(A));
    assert!(!manager.force_destroy(B));

    assert_eq!(counters.shutdowns(), 1);
    assert!(manager.active_accounts().is_empty());
    assert!(!manager.is_listening(A));

    // Cancelled timers never fire.
    assert!(timeout(Duration::from_secs(120), pings.next()).await.is_err());
    assert_eq!(counters.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_after_destroy_recreates() {
    let (manager, counters) = counting_manager();

    manager.keep_alive(A);
    manager.force_destroy(A);
    manager.keep_alive(A);

    assert_eq!(counters.created(), 2);
    assert_eq!(counters.connects(), 2);
    assert!(manager.is_listening(A));
}

#[tokio::test(start_paused = true)]
async fn stale_timer_of_previous_entry_is_ignored() {
    let (manager, counters) = counting_manager();

    manager.keep_alive(A); // first entry, ping due at t = 30
    sleep(Duration::from_secs(10)).await;
    manager.force_destroy(A);
    manager.keep_alive(A); // second entry, ping due at t = 40

    sleep(Duration::from_secs(55)).await; // t = 65: second entry in destroy phase
    assert_eq!(manager.active_accounts(), vec![A]);
    sleep(Duration::from_secs(10)).await; // t = 75: second entry destroyed at t = 70
    assert!(manager.active_accounts().is_empty());
    assert_eq!(counters.shutdowns(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_destroys_everything() {
    let (manager, counters) = counting_manager();

    manager.keep_alive(A);
    manager.keep_alive(B);
    manager.shutdown();

    assert!(manager.active_accounts().is_empty());
    assert_eq!(counters.shutdowns(), 2);

    // Still usable afterwards.
    manager.keep_alive(A);
    assert_eq!(manager.active_accounts(), vec![A]);
}

#[tokio::test(start_paused = true)]
async fn dropping_manager_shuts_sessions_down() {
    let (manager, counters) = counting_manager();
    manager.keep_alive(A);
    drop(manager);
    assert_eq!(counters.shutdowns(), 1);
}
