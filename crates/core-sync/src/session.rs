//! The sync session task.
//!
//! One task owns all mutable session state. Frame callbacks only enqueue
//! [`SyncEvent`]s through their [`EventNotifier`]; the task drains the queue,
//! runs the throttles and the reentrancy guard, and writes through the active
//! strategy. Nothing here is shared except the listener set and the status
//! reporter, which the coordinator needs for synchronous teardown.

use crate::error::SyncError;
use crate::guard::ReentrancyGuard;
use crate::pane::{AccessState, Pane};
use crate::readiness::{Readiness, ReadinessWaiter};
use crate::status::{StatusReporter, SyncPhase, SyncStatus};
use crate::strategy::{AccessStrategy, StrategyKind, probe_chain};
use crate::throttle::Throttle;
use core_config::SyncConfig;
use core_events::{
    ECHOES_SUPPRESSED, EVENT_CHANNEL_CAP, EventNotifier, EventSourceRegistry, FOREIGN_MESSAGES,
    PaneRole, PollEventSource, SCROLL_EVENTS, STRATEGY_DOWNGRADES, SYNC_WRITES, ScrollSurface,
    SyncEvent, bump,
};
use core_frame::protocol::{self, Inbound};
use core_frame::{FrameHost, Subscription};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// ListenerSet
// ---------------------------------------------------------------------------

/// Frame subscriptions of the active strategy. Closing drops (and therefore
/// unsubscribes) them synchronously; a closed set refuses new entries.
#[derive(Debug, Default)]
pub(crate) struct ListenerSet {
    inner: Mutex<ListenerSetInner>,
}

#[derive(Debug, Default)]
struct ListenerSetInner {
    subs: Vec<Subscription>,
    closed: bool,
}

impl ListenerSet {
    fn lock(&self) -> std::sync::MutexGuard<'_, ListenerSetInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn push(&self, sub: Subscription) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.subs.push(sub);
        true
    }

    /// Remove every listener, keeping the set usable.
    pub(crate) fn clear(&self) {
        let drained = std::mem::take(&mut self.lock().subs);
        drop(drained);
    }

    pub(crate) fn close(&self) {
        let drained = {
            let mut inner = self.lock();
            inner.closed = true;
            std::mem::take(&mut inner.subs)
        };
        drop(drained);
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().subs.len()
    }
}

// ---------------------------------------------------------------------------
// SyncSession
// ---------------------------------------------------------------------------

enum Wake {
    Event(Option<SyncEvent>),
    Deadline,
}

pub(crate) struct SyncSession {
    id: u64,
    config: SyncConfig,
    panes: [Pane; 2],
    strategy: Option<Box<dyn AccessStrategy>>,
    guard: ReentrancyGuard,
    /// Indexed by the role of the pane the scroll came from.
    throttles: [Throttle<f64>; 2],
    retry_count: u32,
    max_retries: u32,
    listeners: Arc<ListenerSet>,
    reporter: Arc<StatusReporter>,
    sources: Vec<JoinHandle<()>>,
    tx: mpsc::Sender<SyncEvent>,
    rx: mpsc::Receiver<SyncEvent>,
}

impl SyncSession {
    pub(crate) fn new(
        id: u64,
        config: SyncConfig,
        source: Weak<dyn FrameHost>,
        target: Weak<dyn FrameHost>,
        listeners: Arc<ListenerSet>,
        reporter: Arc<StatusReporter>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAP);
        Self {
            id,
            config,
            panes: [
                Pane::new(PaneRole::Source, source),
                Pane::new(PaneRole::Target, target),
            ],
            strategy: None,
            guard: ReentrancyGuard::new(config.settle),
            throttles: [Throttle::new(config.throttle), Throttle::new(config.throttle)],
            retry_count: 0,
            max_retries: config.max_retries,
            listeners,
            reporter,
            sources: Vec::new(),
            tx,
            rx,
        }
    }

    /// Drive the session until it ends on its own. Host teardown aborts the
    /// task instead.
    pub(crate) async fn run(mut self) {
        let waiter = ReadinessWaiter::from_config(&self.config);
        if waiter.wait(&self.panes).await == Readiness::Timeout {
            let err = SyncError::ReadinessTimeout(self.config.readiness_timeout);
            info!(target: "sync.session", session = self.id, error = %err, "probing_without_readiness");
        }
        match self.probe_with_retries().await {
            Ok(()) => self.align_initial(),
            Err(err) => {
                self.finish_unavailable(&err);
                return;
            }
        }
        self.event_loop().await;
    }

    async fn probe_with_retries(&mut self) -> Result<(), SyncError> {
        loop {
            if !self.reporter.report(SyncStatus::probing(self.retry_count)) {
                return Err(SyncError::StrategyExhausted);
            }
            match self.establish(None) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && self.retry_count < self.max_retries => {
                    self.retry_count += 1;
                    debug!(
                        target: "sync.session",
                        session = self.id,
                        attempt = self.retry_count,
                        max = self.max_retries,
                        error = %err,
                        "probe_retry_scheduled"
                    );
                    sleep(self.config.probe_retry).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Probe strategies ranked below `failed` and attach the first one whose
    /// listeners can be registered on both panes.
    fn establish(&mut self, mut failed: Option<StrategyKind>) -> Result<(), SyncError> {
        loop {
            let strategy = probe_chain(&self.panes, failed)?;
            let kind = strategy.kind();
            match self.attach(strategy) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(target: "sync.session", session = self.id, strategy = kind.as_str(), error = %err, "attach_failed");
                    failed = Some(kind);
                }
            }
        }
    }

    fn attach(&mut self, strategy: Box<dyn AccessStrategy>) -> Result<(), SyncError> {
        for pane in &self.panes {
            let notifier = EventNotifier::new(pane.role(), self.tx.clone());
            match strategy.observe(pane, notifier) {
                Ok(sub) => {
                    if !self.listeners.push(sub) {
                        return Err(SyncError::StrategyExhausted);
                    }
                }
                Err(err) => {
                    self.listeners.clear();
                    return Err(err.into());
                }
            }
        }
        let kind = strategy.kind();
        for pane in &mut self.panes {
            if let Ok(ratio) = strategy.read(pane) {
                pane.record_ratio(ratio);
            }
            pane.set_access_state(kind.access_state());
        }
        if strategy.wants_poll() {
            let mut registry = EventSourceRegistry::new();
            registry.register(PollEventSource::new(self.config.poll_interval));
            self.sources = registry.spawn_all(&self.tx);
        }
        self.strategy = Some(strategy);
        info!(
            target: "sync.session",
            session = self.id,
            strategy = kind.as_str(),
            source = self.panes[0].label().as_str(),
            target_pane = self.panes[1].label().as_str(),
            "strategy_attached"
        );
        self.reporter.report(SyncStatus::active(kind));
        Ok(())
    }

    /// Drop listeners, poll sources, pending deliveries and the guard hold.
    fn detach(&mut self) {
        self.listeners.clear();
        for handle in self.sources.drain(..) {
            handle.abort();
        }
        for throttle in &mut self.throttles {
            throttle.cancel();
        }
        self.guard.clear();
    }

    /// Bring the target to the source position once on activation.
    fn align_initial(&mut self) {
        let ratio = self.panes[PaneRole::Source.index()].last_known_ratio();
        let current = self.panes[PaneRole::Target.index()].last_known_ratio();
        if (ratio - current).abs() > self.config.epsilon {
            self.propagate(PaneRole::Source, ratio, Instant::now());
        }
    }

    async fn event_loop(&mut self) {
        loop {
            let deadline = self.next_deadline();
            let wake = tokio::select! {
                biased;
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Deadline,
                ev = self.rx.recv() => Wake::Event(ev),
            };
            match wake {
                Wake::Deadline => self.flush_due(Instant::now()),
                Wake::Event(Some(ev)) => self.handle_event(ev, Instant::now()),
                Wake::Event(None) => break,
            }
            if self.reporter.phase() == SyncPhase::TornDown {
                break;
            }
        }
        trace!(target: "sync.session", session = self.id, "event_loop_exit");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.throttles.iter().filter_map(Throttle::deadline).min()
    }

    pub(crate) fn handle_event(&mut self, ev: SyncEvent, now: Instant) {
        match ev {
            SyncEvent::Scroll { role, surface } => self.on_scroll(role, surface, now),
            SyncEvent::Message { role, payload } => self.on_message(role, &payload),
            SyncEvent::PollTick => self.on_poll_tick(now),
        }
    }

    fn on_scroll(&mut self, role: PaneRole, surface: ScrollSurface, now: Instant) {
        bump(&SCROLL_EVENTS);
        let Some(strategy) = self.strategy.as_deref() else {
            return;
        };
        if self.guard.suppresses(role, now) {
            bump(&ECHOES_SUPPRESSED);
            trace!(target: "sync.session", pane = role.as_str(), surface = surface.as_str(), "echo_suppressed");
            return;
        }
        let pane = &self.panes[role.index()];
        match strategy.read(pane) {
            Ok(ratio) => self.observe_ratio(role, ratio, now),
            Err(err) => self.degrade(err.into()),
        }
    }

    fn on_message(&mut self, role: PaneRole, payload: &str) {
        match protocol::classify(payload) {
            Inbound::Ratio(ratio) => {
                trace!(target: "sync.session", pane = role.as_str(), ratio, "position_reported");
                self.panes[role.index()].record_report(ratio);
            }
            Inbound::Foreign | Inbound::Malformed => {
                bump(&FOREIGN_MESSAGES);
                trace!(target: "sync.session", pane = role.as_str(), "message_ignored");
            }
        }
    }

    fn on_poll_tick(&mut self, now: Instant) {
        let Some(strategy) = self.strategy.as_deref() else {
            return;
        };
        if self.guard.is_locked(now) {
            return;
        }
        let mut seen = [0.0; 2];
        for pane in &self.panes {
            match strategy.read(pane) {
                Ok(ratio) => seen[pane.role().index()] = ratio,
                Err(err) => {
                    self.degrade(err.into());
                    return;
                }
            }
        }
        // The pane that moved furthest since the last sample is the source.
        let mut moved: Option<(PaneRole, f64, f64)> = None;
        for role in PaneRole::BOTH {
            let ratio = seen[role.index()];
            let delta = (ratio - self.panes[role.index()].last_known_ratio()).abs();
            if delta > self.config.epsilon && moved.is_none_or(|(_, _, d)| delta > d) {
                moved = Some((role, ratio, delta));
            }
        }
        if let Some((role, ratio, _)) = moved {
            self.observe_ratio(role, ratio, now);
        }
    }

    /// A pane was seen at `ratio`; schedule propagation to its peer.
    fn observe_ratio(&mut self, role: PaneRole, ratio: f64, now: Instant) {
        let pane = &mut self.panes[role.index()];
        if (ratio - pane.last_known_ratio()).abs() <= self.config.epsilon {
            return;
        }
        pane.record_ratio(ratio);
        self.throttles[role.index()].offer(ratio, now);
    }

    fn flush_due(&mut self, now: Instant) {
        for role in PaneRole::BOTH {
            if let Some(ratio) = self.throttles[role.index()].take_due(now) {
                self.propagate(role, ratio, now);
            }
            if self.strategy.is_none() {
                return;
            }
        }
    }

    /// Write `ratio` (observed on `from`) to the other pane under the guard.
    fn propagate(&mut self, from: PaneRole, ratio: f64, now: Instant) {
        let to = from.other();
        if self.reporter.is_cancelled() {
            return;
        }
        if let Some(holder) = self.guard.holder(now) {
            if holder == to {
                // Same direction still settling: retry with the newest value
                // once the hold releases.
                if let Some(release) = self.guard.release_at(now) {
                    let throttle = &mut self.throttles[from.index()];
                    throttle.offer(ratio, now);
                    throttle.defer_until(release);
                }
            } else {
                trace!(target: "sync.session", from = from.as_str(), "write_dropped_opposite_hold");
            }
            return;
        }
        let Some(strategy) = self.strategy.as_deref() else {
            return;
        };
        let peer = &self.panes[to.index()];
        let guard = &mut self.guard;
        // Checked and written under the reporter lock so a concurrent host
        // teardown either happens first or waits for the write to finish.
        let result = self
            .reporter
            .unless_cancelled(|| guard.run_exclusive(to, now, || strategy.write(peer, ratio)))
            .flatten();
        match result {
            Some(Ok(())) => {
                bump(&SYNC_WRITES);
                self.panes[to.index()].record_write(ratio);
                debug!(target: "sync.session", from = from.as_str(), to = to.as_str(), ratio, "scroll_synced");
            }
            Some(Err(err)) => self.degrade(err.into()),
            None => {}
        }
    }

    /// Replace a failing strategy with the next lower-ranked one, or end the
    /// session when none is left.
    fn degrade(&mut self, cause: SyncError) {
        let Some(failed) = self.strategy.take().map(|s| s.kind()) else {
            return;
        };
        bump(&STRATEGY_DOWNGRADES);
        self.detach();
        warn!(
            target: "sync.session",
            session = self.id,
            strategy = failed.as_str(),
            error = %cause,
            "strategy_degraded"
        );
        if !self.reporter.report(SyncStatus::degraded(failed, &cause)) {
            return;
        }
        if let Err(err) = self.establish(Some(failed)) {
            self.finish_unavailable(&err);
        }
    }

    fn finish_unavailable(&mut self, err: &SyncError) {
        self.detach();
        for pane in &mut self.panes {
            pane.set_access_state(AccessState::Unavailable);
        }
        warn!(target: "sync.session", session = self.id, error = %err, "sync_unavailable");
        self.reporter.report(SyncStatus::unavailable(err));
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        for handle in self.sources.drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCallback;
    use core_frame::SimulatedFrame;
    use std::time::Duration;

    #[test]
    fn closed_listener_set_refuses_and_unsubscribes() {
        let frame = SimulatedFrame::builder("f").document(2000.0, 500.0).build();
        let (tx, _rx) = mpsc::channel(4);
        let set = ListenerSet::default();
        let sub = frame
            .listen(ScrollSurface::Document, EventNotifier::new(PaneRole::Source, tx.clone()))
            .unwrap();
        assert!(set.push(sub));
        assert_eq!(frame.listener_count(), 1);
        set.close();
        assert_eq!(frame.listener_count(), 0);
        let late = frame
            .listen(ScrollSurface::Document, EventNotifier::new(PaneRole::Source, tx))
            .unwrap();
        assert!(!set.push(late));
        assert_eq!(set.len(), 0);
        assert_eq!(frame.listener_count(), 0);
    }

    fn session(a: &Arc<SimulatedFrame>, b: &Arc<SimulatedFrame>) -> SyncSession {
        let cb: StatusCallback = Arc::new(|_: &SyncStatus| {});
        let reporter = Arc::new(StatusReporter::new(0, cb));
        reporter.report(SyncStatus::awaiting_readiness());
        reporter.report(SyncStatus::probing(0));
        SyncSession::new(
            0,
            SyncConfig::default(),
            Arc::downgrade(a) as Weak<dyn FrameHost>,
            Arc::downgrade(b) as Weak<dyn FrameHost>,
            Arc::new(ListenerSet::default()),
            reporter,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn same_direction_write_is_deferred_to_guard_release() {
        let a = SimulatedFrame::builder("a").document(2000.0, 1000.0).silent_writes().build();
        let b = SimulatedFrame::builder("b").document(2000.0, 1000.0).silent_writes().build();
        let mut s = session(&a, &b);
        s.establish(None).unwrap();
        let t0 = Instant::now();

        a.user_scroll(ScrollSurface::Document, 200.0);
        s.handle_event(SyncEvent::Scroll { role: PaneRole::Source, surface: ScrollSurface::Document }, t0);
        let first = t0 + s.config.throttle;
        s.flush_due(first);
        assert_eq!(b.offset(ScrollSurface::Document), Some(200.0));

        a.user_scroll(ScrollSurface::Document, 600.0);
        let t1 = first + Duration::from_millis(1);
        s.handle_event(SyncEvent::Scroll { role: PaneRole::Source, surface: ScrollSurface::Document }, t1);
        s.flush_due(t1 + s.config.throttle);
        assert_eq!(b.offset(ScrollSurface::Document), Some(200.0), "held by guard");
        let release = first + s.config.settle;
        assert_eq!(s.next_deadline(), Some(release));
        s.flush_due(release);
        assert_eq!(b.offset(ScrollSurface::Document), Some(600.0));
    }

    #[tokio::test(start_paused = true)]
    async fn due_write_after_teardown_is_discarded() {
        let a = SimulatedFrame::builder("a").document(2000.0, 1000.0).build();
        let b = SimulatedFrame::builder("b").document(2000.0, 1000.0).build();
        let mut s = session(&a, &b);
        s.establish(None).unwrap();
        let t0 = Instant::now();
        a.user_scroll(ScrollSurface::Document, 400.0);
        s.handle_event(SyncEvent::Scroll { role: PaneRole::Source, surface: ScrollSurface::Document }, t0);

        s.reporter.finish(SyncStatus::stopped());
        s.flush_due(t0 + s.config.throttle);
        assert_eq!(b.write_count(), 0);
        assert_eq!(b.offset(ScrollSurface::Document), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn echo_from_written_pane_is_dropped() {
        let a = SimulatedFrame::builder("a").document(2000.0, 1000.0).build();
        let b = SimulatedFrame::builder("b").document(2000.0, 1000.0).build();
        let mut s = session(&a, &b);
        s.establish(None).unwrap();
        let t0 = Instant::now();
        a.user_scroll(ScrollSurface::Document, 500.0);
        s.handle_event(SyncEvent::Scroll { role: PaneRole::Source, surface: ScrollSurface::Document }, t0);
        let at = t0 + s.config.throttle;
        s.flush_due(at);
        // The write echoed a Target scroll into the queue.
        let mut echoed = 0;
        while let Ok(ev) = s.rx.try_recv() {
            if matches!(ev, SyncEvent::Scroll { role: PaneRole::Target, .. }) {
                echoed += 1;
            }
            s.handle_event(ev, at);
        }
        assert!(echoed >= 1);
        assert_eq!(s.next_deadline(), None, "no reverse propagation scheduled");
        assert_eq!(a.write_count(), 0);
    }
}
