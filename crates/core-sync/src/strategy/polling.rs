//! Last-resort strategy: sample both panes on a timer.
//!
//! Each pane is reached through the best indicator it offers: its document,
//! its outer container, or (for cooperative content) the position it reports
//! through the message protocol. Writes to message-only panes are posted as
//! protocol messages.

use super::{AccessStrategy, StrategyKind};
use crate::pane::Pane;
use core_events::{EventNotifier, ScrollSurface};
use core_frame::{AccessError, FrameHost, Subscription, protocol};

#[derive(Debug, Default, Clone, Copy)]
pub struct Polling;

/// How one pane is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Indicator {
    Surface(ScrollSurface),
    Messages,
}

const SURFACES: [ScrollSurface; 2] = [ScrollSurface::Document, ScrollSurface::Container];

fn indicator(frame: &dyn FrameHost) -> Result<Indicator, AccessError> {
    let mut denied = None;
    let mut missing = None;
    for surface in SURFACES {
        match frame.metrics(surface) {
            Ok(_) => return Ok(Indicator::Surface(surface)),
            Err(e) if e.is_access_denied() => denied = denied.or(Some(e)),
            Err(e) => missing = missing.or(Some(e)),
        }
    }
    if frame.supports_messaging() {
        return Ok(Indicator::Messages);
    }
    Err(denied.or(missing).unwrap_or(AccessError::NoScrollableElement {
        frame: frame.label().to_string(),
        surface: ScrollSurface::Document,
    }))
}

impl AccessStrategy for Polling {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Polling
    }

    fn probe(&self, panes: &[Pane; 2]) -> Result<(), AccessError> {
        for pane in panes {
            let frame = pane.frame()?;
            let found = indicator(frame.as_ref())?;
            tracing::trace!(target: "sync.strategy", pane = pane.role().as_str(), indicator = ?found, "poll_indicator");
        }
        Ok(())
    }

    fn observe(&self, pane: &Pane, notifier: EventNotifier) -> Result<Subscription, AccessError> {
        let frame = pane.frame()?;
        if frame.supports_messaging() {
            frame.listen_messages(notifier)
        } else {
            Ok(Subscription::noop())
        }
    }

    fn read(&self, pane: &Pane) -> Result<f64, AccessError> {
        let frame = pane.frame()?;
        match indicator(frame.as_ref())? {
            Indicator::Surface(surface) => Ok(frame.metrics(surface)?.ratio()),
            // No report yet means no movement.
            Indicator::Messages => Ok(pane
                .reported_ratio()
                .unwrap_or_else(|| pane.last_known_ratio())),
        }
    }

    fn write(&self, pane: &Pane, ratio: f64) -> Result<(), AccessError> {
        let frame = pane.frame()?;
        match indicator(frame.as_ref())? {
            Indicator::Surface(surface) => {
                let metrics = frame.metrics(surface)?;
                frame.scroll_to(surface, metrics.offset_for(ratio))
            }
            Indicator::Messages => frame.post_message(&protocol::encode(ratio)),
        }
    }

    fn wants_poll(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{PaneRole, SyncEvent};
    use core_frame::SimulatedFrame;
    use std::sync::{Arc, Weak};
    use tokio::sync::mpsc;

    fn pane(role: PaneRole, f: &Arc<SimulatedFrame>) -> Pane {
        Pane::new(role, Arc::downgrade(f) as Weak<dyn FrameHost>)
    }

    #[test]
    fn mixed_indicators_probe_ok() {
        let plain = SimulatedFrame::builder("plain").document(2000.0, 1000.0).build();
        let coop = SimulatedFrame::builder("coop")
            .document(4000.0, 1000.0)
            .cross_origin()
            .cooperative()
            .build();
        let panes = [pane(PaneRole::Source, &plain), pane(PaneRole::Target, &coop)];
        Polling.probe(&panes).unwrap();
        assert!(Polling.wants_poll());
    }

    #[test]
    fn denied_without_messaging_reports_denial() {
        let sealed = SimulatedFrame::builder("sealed")
            .document(2000.0, 1000.0)
            .cross_origin()
            .build();
        let panes = [pane(PaneRole::Source, &sealed), pane(PaneRole::Target, &sealed)];
        assert!(Polling.probe(&panes).unwrap_err().is_access_denied());
    }

    #[test]
    fn message_only_pane_reads_report_and_writes_by_message() {
        let coop = SimulatedFrame::builder("coop")
            .document(4000.0, 1000.0)
            .cross_origin()
            .cooperative()
            .build();
        let mut p = pane(PaneRole::Target, &coop);
        p.record_ratio(0.2);
        assert_eq!(Polling.read(&p).unwrap(), 0.2);
        p.record_report(0.7);
        assert_eq!(Polling.read(&p).unwrap(), 0.7);

        Polling.write(&p, 0.5).unwrap();
        assert_eq!(coop.posted_messages(), vec![protocol::encode(0.5)]);
        assert_eq!(coop.offset(ScrollSurface::Document), Some(1500.0));
    }

    #[test]
    fn observe_subscribes_to_messages_only_when_supported() {
        let (tx, mut rx) = mpsc::channel(8);
        let coop = SimulatedFrame::builder("coop")
            .document(4000.0, 1000.0)
            .cross_origin()
            .cooperative()
            .build();
        let plain = SimulatedFrame::builder("plain").document(2000.0, 1000.0).build();
        let sub = Polling
            .observe(&pane(PaneRole::Target, &coop), EventNotifier::new(PaneRole::Target, tx.clone()))
            .unwrap();
        let _noop = Polling
            .observe(&pane(PaneRole::Source, &plain), EventNotifier::new(PaneRole::Source, tx))
            .unwrap();
        assert_eq!(coop.listener_count(), 1);
        assert_eq!(plain.listener_count(), 0);

        coop.emit_message("hello");
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncEvent::Message {
                role: PaneRole::Target,
                payload: "hello".into()
            }
        );
        drop(sub);
        assert_eq!(coop.listener_count(), 0);
    }
}
