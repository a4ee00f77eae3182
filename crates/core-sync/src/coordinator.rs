//! Host-facing entry point.
//!
//! The host owns both frames and one [`SyncCoordinator`]. Entering dual-pane
//! mode starts a session task; leaving it (or dropping the coordinator) tears
//! the session down synchronously: listeners are removed, pending deliveries
//! are discarded, and exactly one final `TornDown` status is reported before
//! the call returns.

use crate::session::{ListenerSet, SyncSession};
use crate::status::{StatusCallback, StatusReporter, SyncPhase, SyncStatus};
use core_config::SyncConfig;
use core_frame::FrameHost;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

struct SessionHandle {
    id: u64,
    task: JoinHandle<()>,
    reporter: Arc<StatusReporter>,
    listeners: Arc<ListenerSet>,
}

impl SessionHandle {
    fn teardown(self) {
        self.reporter.finish(SyncStatus::stopped());
        self.listeners.close();
        self.task.abort();
        tracing::info!(target: "sync.coordinator", session = self.id, "session_torn_down");
    }
}

pub struct SyncCoordinator {
    config: SyncConfig,
    on_status: StatusCallback,
    session: Option<SessionHandle>,
}

impl SyncCoordinator {
    /// `on_status` runs on every phase transition. It must not call back into
    /// the coordinator.
    pub fn new(config: SyncConfig, on_status: impl Fn(&SyncStatus) + Send + Sync + 'static) -> Self {
        Self {
            config,
            on_status: Arc::new(on_status),
            session: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start synchronizing `source` and `target`, replacing any running
    /// session. Must be called from within a tokio runtime.
    ///
    /// Frames are held weakly; destroying one makes the session degrade and
    /// eventually report itself unavailable.
    pub fn enter_dual_pane_mode(
        &mut self,
        source: Weak<dyn FrameHost>,
        target: Weak<dyn FrameHost>,
    ) -> watch::Receiver<SyncPhase> {
        self.exit_dual_pane_mode();
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let reporter = Arc::new(StatusReporter::new(id, self.on_status.clone()));
        let listeners = Arc::new(ListenerSet::default());
        let phases = reporter.subscribe();
        tracing::info!(target: "sync.coordinator", session = id, "session_started");
        reporter.report(SyncStatus::awaiting_readiness());
        let session = SyncSession::new(
            id,
            self.config,
            source,
            target,
            listeners.clone(),
            reporter.clone(),
        );
        let task = tokio::spawn(session.run());
        self.session = Some(SessionHandle {
            id,
            task,
            reporter,
            listeners,
        });
        phases
    }

    /// Tear down the running session, if any. Idempotent.
    pub fn exit_dual_pane_mode(&mut self) {
        if let Some(handle) = self.session.take() {
            handle.teardown();
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.session
            .as_ref()
            .map(|s| s.reporter.phase())
            .unwrap_or(SyncPhase::Idle)
    }

    pub fn is_active(&self) -> bool {
        self.phase() == SyncPhase::Active
    }

    /// Phase watch for the running session.
    pub fn phase_changes(&self) -> Option<watch::Receiver<SyncPhase>> {
        self.session.as_ref().map(|s| s.reporter.subscribe())
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.exit_dual_pane_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_frame::SimulatedFrame;
    use std::sync::Mutex;

    #[test]
    fn idle_without_session() {
        let mut c = SyncCoordinator::new(SyncConfig::default(), |_| {});
        assert_eq!(c.phase(), SyncPhase::Idle);
        assert!(c.phase_changes().is_none());
        c.exit_dual_pane_mode();
        assert_eq!(c.phase(), SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reentering_replaces_previous_session() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut c = SyncCoordinator::new(SyncConfig::default(), move |s| {
            sink.lock().unwrap().push(s.phase)
        });
        let a = SimulatedFrame::builder("a").document(2000.0, 500.0).build();
        let b = SimulatedFrame::builder("b").document(2000.0, 500.0).build();
        c.enter_dual_pane_mode(
            Arc::downgrade(&a) as Weak<dyn FrameHost>,
            Arc::downgrade(&b) as Weak<dyn FrameHost>,
        );
        c.enter_dual_pane_mode(
            Arc::downgrade(&a) as Weak<dyn FrameHost>,
            Arc::downgrade(&b) as Weak<dyn FrameHost>,
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SyncPhase::AwaitingReadiness,
                SyncPhase::TornDown,
                SyncPhase::AwaitingReadiness
            ]
        );
        drop(c);
        assert_eq!(seen.lock().unwrap().last(), Some(&SyncPhase::TornDown));
    }
}
