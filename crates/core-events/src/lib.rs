//! Core event types and channel helpers for the scroll sync runtime.
//!
//! Frames report scroll and message activity from synchronous callbacks, so
//! they never await: they push into a bounded channel through an
//! [`EventNotifier`] and the session task drains it in order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// One bounded mpsc channel per session. Producers are frame callbacks (scroll + message) and the
// poll tick source. Frame callbacks use `try_send`: a full channel drops the notification instead
// of stalling the host. A scroll notification carries no position; the
// consumer re-reads the pane, so the newest position still wins once the backlog drains.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 1024;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters. Inspected by tests and logged by the binary on exit.
// -------------------------------------------------------------------------------------------------
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0); // consumer gone
pub static CHANNEL_FULL_DROPS: AtomicU64 = AtomicU64::new(0); // backlog full, notification dropped
pub static SCROLL_EVENTS: AtomicU64 = AtomicU64::new(0);
pub static ECHOES_SUPPRESSED: AtomicU64 = AtomicU64::new(0);
pub static SYNC_WRITES: AtomicU64 = AtomicU64::new(0);
pub static STRATEGY_DOWNGRADES: AtomicU64 = AtomicU64::new(0);
pub static FOREIGN_MESSAGES: AtomicU64 = AtomicU64::new(0);
pub static POLL_TICKS: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Which of the two panes an event belongs to.
///
/// Roles are symmetric: whichever pane the user last moved acts as the source
/// for that propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneRole {
    Source,
    Target,
}

impl PaneRole {
    pub const BOTH: [PaneRole; 2] = [PaneRole::Source, PaneRole::Target];

    pub fn other(self) -> PaneRole {
        match self {
            PaneRole::Source => PaneRole::Target,
            PaneRole::Target => PaneRole::Source,
        }
    }

    /// Stable slot index used by fixed-size pane arrays.
    pub fn index(self) -> usize {
        match self {
            PaneRole::Source => 0,
            PaneRole::Target => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaneRole::Source => "source",
            PaneRole::Target => "target",
        }
    }
}

impl fmt::Display for PaneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The element whose scroll position is observed: the frame's own document or
/// the outer viewport hosting the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollSurface {
    Document,
    Container,
}

impl ScrollSurface {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollSurface::Document => "document",
            ScrollSurface::Container => "container",
        }
    }
}

impl fmt::Display for ScrollSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events consumed by a sync session task.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A pane's scroll position changed. The position itself is read back by
    /// the consumer through the active access strategy.
    Scroll { role: PaneRole, surface: ScrollSurface },
    /// Raw cross-frame message posted by hosted content. May be foreign or
    /// malformed; parsing happens in the consumer.
    Message { role: PaneRole, payload: String },
    /// Periodic sample request driving the polling strategy.
    PollTick,
}

/// Handle given to a frame so its callbacks can report activity for one pane.
///
/// Never blocks. Once the session is gone every call is a silent no-op.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    role: PaneRole,
    tx: Sender<SyncEvent>,
}

impl EventNotifier {
    pub fn new(role: PaneRole, tx: Sender<SyncEvent>) -> Self {
        Self { role, tx }
    }

    pub fn role(&self) -> PaneRole {
        self.role
    }

    /// Report that `surface` scrolled. Returns whether the event was queued.
    pub fn scrolled(&self, surface: ScrollSurface) -> bool {
        self.deliver(SyncEvent::Scroll {
            role: self.role,
            surface,
        })
    }

    /// Forward a raw message received from the hosted content.
    pub fn message(&self, payload: impl Into<String>) -> bool {
        self.deliver(SyncEvent::Message {
            role: self.role,
            payload: payload.into(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn deliver(&self, event: SyncEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                bump(&CHANNEL_FULL_DROPS);
                tracing::trace!(target: "runtime.events", role = self.role.as_str(), "event_dropped_full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                bump(&CHANNEL_SEND_FAILURES);
                false
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Async Event Sources
// -------------------------------------------------------------------------------------------------
// Timer-driven producers register uniformly. Each source owns its task; on channel send failure
// (consumer dropped) it must terminate promptly. The session keeps the JoinHandles and aborts them
// on teardown so no tick outlives its session.

/// Trait implemented by any async event producer. Implementors usually hold configuration and
/// spawn one background task that pushes `SyncEvent`s into the session channel.
pub trait AsyncEventSource: Send + 'static {
    /// Human-readable stable identifier (used for logging / diagnostics).
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task, returning a JoinHandle. Implementors should
    /// stop when `tx.send(..).await` returns Err (channel closed).
    fn spawn(self: Box<Self>, tx: Sender<SyncEvent>) -> JoinHandle<()>;
}

/// Registry of event sources spawned together when a session activates.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Spawn all registered sources, returning their JoinHandles. Each source receives its own
    /// clone of `tx`; the registry is drained so a second call spawns nothing.
    pub fn spawn_all(&mut self, tx: &Sender<SyncEvent>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Emits `SyncEvent::PollTick` every configured interval. The first tick fires one full interval
/// after spawning so a freshly attached session is not sampled before its baseline is recorded.
pub struct PollEventSource {
    interval: Duration,
}

impl PollEventSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for PollEventSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn spawn(self: Box<Self>, tx: Sender<SyncEvent>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + dur;
            let mut interval = tokio::time::interval_at(start, dur);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                bump(&POLL_TICKS);
                if tx.send(SyncEvent::PollTick).await.is_err() {
                    break;
                }
            }
        })
    }
}
