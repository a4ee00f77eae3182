//! Access strategies and ranked probing.
//!
//! A strategy is one way of observing and moving both panes' scroll
//! positions. Strategies are tried best-first; the first whose probe succeeds
//! on both panes wins, and a strategy that fails later is replaced by the
//! next lower-ranked one.

mod direct;
mod polling;
mod proxied;

pub use direct::Direct;
pub use polling::Polling;
pub use proxied::Proxied;

use crate::error::SyncError;
use crate::pane::{AccessState, Pane};
use core_events::{EventNotifier, ScrollSurface};
use core_frame::{AccessError, Subscription};
use serde::Serialize;
use std::fmt;

/// Strategy identity, ordered by rank (best first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Direct,
    Proxied,
    Polling,
}

impl StrategyKind {
    pub const RANKED: [StrategyKind; 3] = [
        StrategyKind::Direct,
        StrategyKind::Proxied,
        StrategyKind::Polling,
    ];

    pub fn rank(self) -> u8 {
        match self {
            StrategyKind::Direct => 0,
            StrategyKind::Proxied => 1,
            StrategyKind::Polling => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Proxied => "proxied",
            StrategyKind::Polling => "polling",
        }
    }

    pub fn access_state(self) -> AccessState {
        match self {
            StrategyKind::Direct => AccessState::Direct,
            StrategyKind::Proxied => AccessState::Proxied,
            StrategyKind::Polling => AccessState::Polling,
        }
    }

    pub fn build(self) -> Box<dyn AccessStrategy> {
        match self {
            StrategyKind::Direct => Box::new(Direct),
            StrategyKind::Proxied => Box::new(Proxied),
            StrategyKind::Polling => Box::new(Polling),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of reaching both panes' scroll positions.
pub trait AccessStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Check that the strategy can reach both panes.
    fn probe(&self, panes: &[Pane; 2]) -> Result<(), AccessError>;

    /// Register change listeners for `pane`. Strategies that sample instead
    /// of listening may return [`Subscription::noop`].
    fn observe(&self, pane: &Pane, notifier: EventNotifier) -> Result<Subscription, AccessError>;

    /// Current proportional position of `pane`.
    fn read(&self, pane: &Pane) -> Result<f64, AccessError>;

    /// Move `pane` to `ratio`.
    fn write(&self, pane: &Pane, ratio: f64) -> Result<(), AccessError>;

    /// Whether the session must drive this strategy with poll ticks.
    fn wants_poll(&self) -> bool {
        false
    }
}

/// Probe `candidates` in the given order and return the first that works on
/// both panes.
///
/// When every candidate fails for lack of a scrollable element and neither
/// pane offers anything to scroll, the result is
/// [`SyncError::NoScrollableContainer`]; any other outcome (or no candidates
/// at all) is [`SyncError::StrategyExhausted`].
pub fn probe_in_order(
    candidates: impl IntoIterator<Item = Box<dyn AccessStrategy>>,
    panes: &[Pane; 2],
) -> Result<Box<dyn AccessStrategy>, SyncError> {
    let mut failures = 0usize;
    let mut all_unscrollable = true;
    for strategy in candidates {
        match strategy.probe(panes) {
            Ok(()) => {
                tracing::debug!(target: "sync.strategy", strategy = strategy.kind().as_str(), "probe_ok");
                return Ok(strategy);
            }
            Err(err) => {
                tracing::debug!(
                    target: "sync.strategy",
                    strategy = strategy.kind().as_str(),
                    reason = err.kind(),
                    error = %err,
                    "probe_failed"
                );
                failures += 1;
                all_unscrollable &= err.is_not_scrollable();
            }
        }
    }
    if failures > 0 && all_unscrollable && panes.iter().all(offers_nothing) {
        Err(SyncError::NoScrollableContainer)
    } else {
        Err(SyncError::StrategyExhausted)
    }
}

/// No surface exists (a denied document still exists) and no message channel.
fn offers_nothing(pane: &Pane) -> bool {
    let Ok(frame) = pane.frame() else {
        return false;
    };
    !frame.supports_messaging()
        && [ScrollSurface::Document, ScrollSurface::Container]
            .into_iter()
            .all(|s| matches!(frame.metrics(s), Err(e) if e.is_not_scrollable()))
}

/// Probe the built-in strategies ranked below `failed` (all of them when
/// `failed` is `None`).
pub fn probe_chain(
    panes: &[Pane; 2],
    failed: Option<StrategyKind>,
) -> Result<Box<dyn AccessStrategy>, SyncError> {
    let candidates = StrategyKind::RANKED
        .into_iter()
        .filter(|k| failed.is_none_or(|f| k.rank() > f.rank()))
        .map(StrategyKind::build);
    probe_in_order(candidates, panes)
}

// ---------------------------------------------------------------------------
// Shared single-surface access used by Direct and Proxied
// ---------------------------------------------------------------------------

fn probe_surface(panes: &[Pane; 2], surface: ScrollSurface) -> Result<(), AccessError> {
    for pane in panes {
        pane.frame()?.metrics(surface)?;
    }
    Ok(())
}

fn read_surface(pane: &Pane, surface: ScrollSurface) -> Result<f64, AccessError> {
    Ok(pane.frame()?.metrics(surface)?.ratio())
}

fn write_surface(pane: &Pane, surface: ScrollSurface, ratio: f64) -> Result<(), AccessError> {
    let frame = pane.frame()?;
    let metrics = frame.metrics(surface)?;
    frame.scroll_to(surface, metrics.offset_for(ratio))
}

fn observe_surface(
    pane: &Pane,
    surface: ScrollSurface,
    notifier: EventNotifier,
) -> Result<Subscription, AccessError> {
    pane.frame()?.listen(surface, notifier)
}
