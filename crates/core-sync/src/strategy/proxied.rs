use super::{AccessStrategy, StrategyKind, observe_surface, probe_surface, read_surface, write_surface};
use crate::pane::Pane;
use core_events::{EventNotifier, ScrollSurface};
use core_frame::{AccessError, Subscription};

/// Scrolls the outer container hosting each frame instead of its document.
/// Works regardless of the content's origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct Proxied;

impl AccessStrategy for Proxied {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Proxied
    }

    fn probe(&self, panes: &[Pane; 2]) -> Result<(), AccessError> {
        probe_surface(panes, ScrollSurface::Container)
    }

    fn observe(&self, pane: &Pane, notifier: EventNotifier) -> Result<Subscription, AccessError> {
        observe_surface(pane, ScrollSurface::Container, notifier)
    }

    fn read(&self, pane: &Pane) -> Result<f64, AccessError> {
        read_surface(pane, ScrollSurface::Container)
    }

    fn write(&self, pane: &Pane, ratio: f64) -> Result<(), AccessError> {
        write_surface(pane, ScrollSurface::Container, ratio)
    }
}
