use super::{AccessStrategy, StrategyKind, observe_surface, probe_surface, read_surface, write_surface};
use crate::pane::Pane;
use core_events::{EventNotifier, ScrollSurface};
use core_frame::{AccessError, Subscription};

/// Same-origin access to each frame's own document scroll position.
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct;

impl AccessStrategy for Direct {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn probe(&self, panes: &[Pane; 2]) -> Result<(), AccessError> {
        probe_surface(panes, ScrollSurface::Document)
    }

    fn observe(&self, pane: &Pane, notifier: EventNotifier) -> Result<Subscription, AccessError> {
        observe_surface(pane, ScrollSurface::Document, notifier)
    }

    fn read(&self, pane: &Pane) -> Result<f64, AccessError> {
        read_surface(pane, ScrollSurface::Document)
    }

    fn write(&self, pane: &Pane, ratio: f64) -> Result<(), AccessError> {
        write_surface(pane, ScrollSurface::Document, ratio)
    }
}
