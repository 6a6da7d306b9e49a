//! lpfeed-manager: supervisor for many per-account long-poll sessions.
//!
//! Sessions are created lazily on `keep_alive`, torn down after two idle
//! windows without renewal, and their batches are deduplicated and fanned
//! out to every observer.

pub mod consumer;
mod entry;
pub mod manager;
mod pipeline;

pub use consumer::{ConsumerError, NoopConsumer, UpdateConsumer};
pub use entry::TimerPhase;
pub use manager::LongpollManager;
