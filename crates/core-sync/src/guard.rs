//! Reentrancy guard for propagated scroll writes.
//!
//! Writing a pane's scroll position makes that pane report a scroll of its
//! own, sometimes only after the write returned. The guard is held for a
//! settle delay after each write; while held, further writes are dropped and
//! observations from the written pane are echoes.
//!
//! The hold is a release deadline rather than a flag, so it clears by itself
//! even when the guarded write fails or panics.

use core_events::PaneRole;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hold {
    written: PaneRole,
    release_at: Instant,
}

#[derive(Debug)]
pub struct ReentrancyGuard {
    settle: Duration,
    hold: Option<Hold>,
}

impl ReentrancyGuard {
    pub fn new(settle: Duration) -> Self {
        Self { settle, hold: None }
    }

    /// Run `f` as the write to `written` unless a hold is active. While held
    /// the call is dropped and `None` is returned.
    pub fn run_exclusive<R>(
        &mut self,
        written: PaneRole,
        now: Instant,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        if self.is_locked(now) {
            tracing::trace!(target: "sync.guard", pane = written.as_str(), "write_dropped_locked");
            return None;
        }
        self.hold = Some(Hold {
            written,
            release_at: now + self.settle,
        });
        Some(f())
    }

    pub fn is_locked(&self, now: Instant) -> bool {
        self.hold.is_some_and(|h| now < h.release_at)
    }

    /// Pane written under the active hold.
    pub fn holder(&self, now: Instant) -> Option<PaneRole> {
        self.hold
            .filter(|h| now < h.release_at)
            .map(|h| h.written)
    }

    /// Whether an observation from `role` is an echo of the active write.
    pub fn suppresses(&self, role: PaneRole, now: Instant) -> bool {
        self.holder(now) == Some(role)
    }

    /// Release instant of the active hold.
    pub fn release_at(&self, now: Instant) -> Option<Instant> {
        self.hold
            .filter(|h| now < h.release_at)
            .map(|h| h.release_at)
    }

    pub fn clear(&mut self) {
        self.hold = None;
    }
}
