//! Session phases and the status record handed to the host.

use crate::error::SyncError;
use crate::strategy::StrategyKind;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    AwaitingReadiness,
    ProbingStrategy,
    Active,
    Degraded,
    TornDown,
}

impl SyncPhase {
    /// Allowed edges of the session state machine. `TornDown` is reachable
    /// from every other phase and has no way out.
    pub fn can_transition_to(self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        match (self, next) {
            (TornDown, _) => false,
            (_, TornDown) => true,
            (Idle, AwaitingReadiness) => true,
            (AwaitingReadiness, ProbingStrategy) => true,
            (ProbingStrategy, ProbingStrategy | Active) => true,
            (Active, Degraded) => true,
            (Degraded, Active) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::AwaitingReadiness => "awaiting_readiness",
            SyncPhase::ProbingStrategy => "probing_strategy",
            SyncPhase::Active => "active",
            SyncPhase::Degraded => "degraded",
            SyncPhase::TornDown => "torn_down",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host shows the user about syncing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub active: bool,
    pub degraded: bool,
    pub message: String,
    pub phase: SyncPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
}

impl SyncStatus {
    fn new(phase: SyncPhase, message: impl Into<String>) -> Self {
        Self {
            active: false,
            degraded: false,
            message: message.into(),
            phase,
            strategy: None,
        }
    }

    pub fn awaiting_readiness() -> Self {
        Self::new(SyncPhase::AwaitingReadiness, "waiting for frames to load")
    }

    pub fn probing(attempt: u32) -> Self {
        let message = if attempt == 0 {
            "probing scroll access".to_string()
        } else {
            format!("probing scroll access (retry {attempt})")
        };
        Self::new(SyncPhase::ProbingStrategy, message)
    }

    pub fn active(strategy: StrategyKind) -> Self {
        Self {
            active: true,
            strategy: Some(strategy),
            ..Self::new(SyncPhase::Active, format!("synchronized ({strategy})"))
        }
    }

    pub fn degraded(failed: StrategyKind, cause: &SyncError) -> Self {
        Self {
            degraded: true,
            strategy: Some(failed),
            ..Self::new(SyncPhase::Degraded, format!("{failed} access lost: {cause}"))
        }
    }

    /// Terminal status of a session that found no usable strategy.
    pub fn unavailable(cause: &SyncError) -> Self {
        Self {
            degraded: true,
            ..Self::new(SyncPhase::TornDown, format!("unavailable: {cause}"))
        }
    }

    /// Final status of a session ended by the host.
    pub fn stopped() -> Self {
        Self::new(SyncPhase::TornDown, "sync stopped")
    }
}

pub type StatusCallback = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

// ---------------------------------------------------------------------------
// StatusReporter
// ---------------------------------------------------------------------------
// Shared by the coordinator and its session task. Every report and the final
// teardown report pass through one lock, so once `finish` returns the host
// callback can never run again for this session.

pub(crate) struct StatusReporter {
    callback: StatusCallback,
    cancelled: Mutex<bool>,
    phase: watch::Sender<SyncPhase>,
    session: u64,
}

impl StatusReporter {
    pub(crate) fn new(session: u64, callback: StatusCallback) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            callback,
            cancelled: Mutex::new(false),
            phase,
            session,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub(crate) fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `f` while holding the teardown lock, unless teardown already
    /// happened. `finish` blocks until `f` returns.
    pub(crate) fn unless_cancelled<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let cancelled = self.cancelled.lock().unwrap_or_else(|p| p.into_inner());
        if *cancelled {
            return None;
        }
        Some(f())
    }

    /// Apply a transition and notify the host. Returns false when the
    /// session was torn down or the transition is not allowed.
    pub(crate) fn report(&self, status: SyncStatus) -> bool {
        let cancelled = self.cancelled.lock().unwrap_or_else(|p| p.into_inner());
        if *cancelled {
            return false;
        }
        self.emit(status)
    }

    /// Host-requested teardown. Emits `status` unless the session already
    /// reached `TornDown`; afterwards every `report` is a no-op.
    pub(crate) fn finish(&self, status: SyncStatus) {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(|p| p.into_inner());
        if *cancelled {
            return;
        }
        *cancelled = true;
        if self.phase() != SyncPhase::TornDown {
            self.emit(status);
        }
    }

    fn emit(&self, status: SyncStatus) -> bool {
        let from = self.phase();
        if !from.can_transition_to(status.phase) {
            tracing::warn!(
                target: "sync.status",
                session = self.session,
                from = from.as_str(),
                to = status.phase.as_str(),
                "invalid_transition"
            );
            return false;
        }
        self.phase.send_replace(status.phase);
        tracing::info!(
            target: "sync.status",
            session = self.session,
            phase = status.phase.as_str(),
            active = status.active,
            degraded = status.degraded,
            message = status.message.as_str(),
            "status"
        );
        (self.callback)(&status);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use pretty_assertions::assert_eq;

    fn recorder() -> (StatusCallback, Arc<Mutex<Vec<SyncStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: StatusCallback = Arc::new(move |s: &SyncStatus| sink.lock().unwrap().push(s.clone()));
        (cb, seen)
    }

    #[test]
    fn transition_table() {
        use SyncPhase::*;
        assert!(Idle.can_transition_to(AwaitingReadiness));
        assert!(AwaitingReadiness.can_transition_to(ProbingStrategy));
        assert!(ProbingStrategy.can_transition_to(ProbingStrategy));
        assert!(ProbingStrategy.can_transition_to(Active));
        assert!(Active.can_transition_to(Degraded));
        assert!(Degraded.can_transition_to(Active));
        for p in [Idle, AwaitingReadiness, ProbingStrategy, Active, Degraded] {
            assert!(p.can_transition_to(TornDown), "{p} -> torn_down");
        }
        assert!(!TornDown.can_transition_to(Active));
        assert!(!TornDown.can_transition_to(TornDown));
        assert!(!Idle.can_transition_to(Active));
        assert!(!Active.can_transition_to(ProbingStrategy));
    }

    #[test]
    fn status_flags() {
        let a = SyncStatus::active(StrategyKind::Direct);
        assert!(a.active && !a.degraded);
        let d = SyncStatus::degraded(StrategyKind::Direct, &SyncError::StrategyExhausted);
        assert!(!d.active && d.degraded);
        let u = SyncStatus::unavailable(&SyncError::StrategyExhausted);
        assert!(!u.active && u.degraded);
        assert!(u.message.starts_with("unavailable"));
        let s = SyncStatus::stopped();
        assert!(!s.active && !s.degraded);
        assert_eq!(s.phase, SyncPhase::TornDown);
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_value(SyncStatus::active(StrategyKind::Proxied)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "active": true,
                "degraded": false,
                "message": "synchronized (proxied)",
                "phase": "active",
                "strategy": "proxied"
            })
        );
        let stopped = serde_json::to_value(SyncStatus::stopped()).unwrap();
        assert!(stopped.get("strategy").is_none());
    }

    #[test]
    fn reporter_rejects_invalid_transition() {
        let (cb, seen) = recorder();
        let r = StatusReporter::new(1, cb);
        assert!(!r.report(SyncStatus::active(StrategyKind::Direct)));
        assert!(r.report(SyncStatus::awaiting_readiness()));
        assert_eq!(r.phase(), SyncPhase::AwaitingReadiness);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn finish_emits_once_and_silences_reports() {
        let (cb, seen) = recorder();
        let r = StatusReporter::new(2, cb);
        let mut phases = r.subscribe();
        r.report(SyncStatus::awaiting_readiness());
        r.finish(SyncStatus::stopped());
        r.finish(SyncStatus::stopped());
        assert!(!r.report(SyncStatus::probing(0)));
        assert!(r.is_cancelled());
        let got: Vec<SyncPhase> = seen.lock().unwrap().iter().map(|s| s.phase).collect();
        assert_eq!(got, vec![SyncPhase::AwaitingReadiness, SyncPhase::TornDown]);
        assert_eq!(*phases.borrow_and_update(), SyncPhase::TornDown);
    }

    #[test]
    fn guarded_work_stops_after_finish() {
        let (cb, _seen) = recorder();
        let r = Arc::new(StatusReporter::new(4, cb));
        assert_eq!(r.unless_cancelled(|| 7), Some(7));

        // A teardown racing with guarded work waits for it to complete.
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let worker = {
            let r = r.clone();
            std::thread::spawn(move || {
                r.unless_cancelled(|| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    "written"
                })
            })
        };
        entered_rx.recv().unwrap();
        r.finish(SyncStatus::stopped());
        assert_eq!(worker.join().unwrap(), Some("written"));

        let mut ran = false;
        assert_eq!(r.unless_cancelled(|| ran = true), None);
        assert!(!ran);
    }

    #[test]
    fn finish_after_terminal_status_is_silent() {
        let (cb, seen) = recorder();
        let r = StatusReporter::new(3, cb);
        r.report(SyncStatus::awaiting_readiness());
        r.report(SyncStatus::probing(0));
        r.report(SyncStatus::unavailable(&SyncError::NoScrollableContainer));
        r.finish(SyncStatus::stopped());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[2].message.starts_with("unavailable"));
    }
}
