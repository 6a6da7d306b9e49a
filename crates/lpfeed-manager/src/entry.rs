//! Per-account bookkeeping: one session plus its idle timer.

use std::fmt;

use tokio::task::JoinHandle;

use lpfeed_session::Longpoll;

/// Which half of the two-phase idle teardown a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Fires after one idle window; emits a keep-alive ping.
    PreDestroy,
    /// Fires one window later; tears the entry down.
    Destroy,
}

impl TimerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreDestroy => "pre_destroy",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ArmedTimer {
    phase: TimerPhase,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns exactly one session. At most one timer is armed at a time: arming
/// the pre-destroy timer supersedes a pending destroy timer.
pub(crate) struct Entry {
    session: Box<dyn Longpoll>,
    timer: Option<ArmedTimer>,
    released: bool,
}

impl Entry {
    pub(crate) fn new(session: Box<dyn Longpoll>) -> Self {
        Self {
            session,
            timer: None,
            released: false,
        }
    }

    pub(crate) fn session(&self) -> &dyn Longpoll {
        self.session.as_ref()
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn armed_phase(&self) -> Option<TimerPhase> {
        self.timer.as_ref().map(|t| t.phase)
    }

    /// True when a firing timer is still the one this entry expects.
    pub(crate) fn is_current(&self, phase: TimerPhase, generation: u64) -> bool {
        !self.released
            && self
                .timer
                .as_ref()
                .is_some_and(|t| t.phase == phase && t.generation == generation)
    }

    /// Replace the armed timer, aborting the previous one.
    pub(crate) fn arm(&mut self, phase: TimerPhase, generation: u64, handle: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(ArmedTimer {
            phase,
            generation,
            handle,
        }) {
            previous.handle.abort();
        }
    }

    /// Forget the armed timer without aborting it. Used by the timer task
    /// itself when it fires.
    pub(crate) fn disarm_fired(&mut self) {
        self.timer = None;
    }

    /// Cancel the timer and shut the session down. Idempotent.
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
        self.session.shutdown();
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.release();
    }
}
