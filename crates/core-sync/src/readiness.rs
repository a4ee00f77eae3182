//! Waits for both frames to finish loading before probing starts.

use crate::pane::Pane;
use core_config::SyncConfig;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, sleep_until, timeout_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Both load signals fired (followed by the settle delay).
    Ready,
    /// The bound elapsed first. Callers probe anyway.
    Timeout,
}

/// Bounded wait on both panes' load signals.
///
/// The settle delay lets layout finish after load and runs inside the same
/// bound: a wait never takes longer than `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessWaiter {
    timeout: Duration,
    settle: Duration,
}

impl ReadinessWaiter {
    pub fn new(timeout: Duration, settle: Duration) -> Self {
        Self { timeout, settle }
    }

    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self::new(cfg.readiness_timeout, cfg.readiness_settle)
    }

    pub async fn wait(&self, panes: &[Pane; 2]) -> Readiness {
        let start = Instant::now();
        let deadline = start + self.timeout;
        // Receivers only; a frame dropped mid-wait simply never loads.
        let [a, b] = panes.each_ref().map(|p| p.frame().ok().map(|f| f.load_signal()));
        let both = async {
            tokio::join!(loaded(a), loaded(b));
        };
        if timeout_at(deadline, both).await.is_err() {
            tracing::warn!(
                target: "sync.readiness",
                timeout_ms = self.timeout.as_millis() as u64,
                "readiness_timeout"
            );
            return Readiness::Timeout;
        }
        let settled = (Instant::now() + self.settle).min(deadline);
        sleep_until(settled).await;
        tracing::debug!(
            target: "sync.readiness",
            elapsed_ms = start.elapsed().as_millis() as u64,
            "frames_ready"
        );
        Readiness::Ready
    }
}

async fn loaded(signal: Option<watch::Receiver<bool>>) {
    match signal {
        Some(mut rx) => {
            if rx.wait_for(|loaded| *loaded).await.is_err() {
                // Sender gone before load: the frame was destroyed.
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
