use core_events::PaneRole;
use core_frame::{AccessError, FrameHost};
use serde::Serialize;
use std::sync::{Arc, Weak};

/// How a pane's scroll position is currently reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Unresolved,
    Direct,
    Proxied,
    Polling,
    Unavailable,
}

/// One of the two panes of a session.
///
/// The frame belongs to the host; the pane only keeps a weak reference, so a
/// frame destroyed by the host shows up as [`AccessError::Detached`].
#[derive(Debug)]
pub struct Pane {
    role: PaneRole,
    frame: Weak<dyn FrameHost>,
    access_state: AccessState,
    last_known_ratio: f64,
    reported_ratio: Option<f64>,
}

impl Pane {
    pub fn new(role: PaneRole, frame: Weak<dyn FrameHost>) -> Self {
        Self {
            role,
            frame,
            access_state: AccessState::Unresolved,
            last_known_ratio: 0.0,
            reported_ratio: None,
        }
    }

    pub fn role(&self) -> PaneRole {
        self.role
    }

    pub fn frame(&self) -> Result<Arc<dyn FrameHost>, AccessError> {
        self.frame.upgrade().ok_or(AccessError::Detached)
    }

    pub fn label(&self) -> String {
        self.frame
            .upgrade()
            .map(|f| f.label().to_string())
            .unwrap_or_else(|| "<detached>".to_string())
    }

    pub fn access_state(&self) -> AccessState {
        self.access_state
    }

    pub fn set_access_state(&mut self, state: AccessState) {
        self.access_state = state;
    }

    pub fn last_known_ratio(&self) -> f64 {
        self.last_known_ratio
    }

    /// Record an observed or applied position.
    pub fn record_ratio(&mut self, ratio: f64) {
        self.last_known_ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Last position reported by cooperative content, if any.
    pub fn reported_ratio(&self) -> Option<f64> {
        self.reported_ratio
    }

    pub fn record_report(&mut self, ratio: f64) {
        self.reported_ratio = Some(ratio.clamp(0.0, 1.0));
    }

    /// Record a position the session just applied. An earlier report from
    /// the content is superseded, since content may not confirm the write.
    pub fn record_write(&mut self, ratio: f64) {
        self.record_ratio(ratio);
        if self.reported_ratio.is_some() {
            self.reported_ratio = Some(self.last_known_ratio);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_frame::SimulatedFrame;

    #[test]
    fn dropped_frame_is_detached() {
        let frame = SimulatedFrame::builder("original").document(2000.0, 500.0).build();
        let pane = Pane::new(PaneRole::Source, Arc::downgrade(&frame) as Weak<dyn FrameHost>);
        assert_eq!(pane.label(), "original");
        assert!(pane.frame().is_ok());
        drop(frame);
        assert_eq!(pane.frame().map(|_| ()).unwrap_err(), AccessError::Detached);
        assert_eq!(pane.label(), "<detached>");
    }

    #[test]
    fn recorded_ratios_are_clamped() {
        let frame = SimulatedFrame::builder("t").build();
        let mut pane = Pane::new(PaneRole::Target, Arc::downgrade(&frame) as Weak<dyn FrameHost>);
        assert_eq!(pane.access_state(), AccessState::Unresolved);
        pane.record_ratio(1.5);
        assert_eq!(pane.last_known_ratio(), 1.0);
        pane.record_ratio(f64::NAN);
        assert_eq!(pane.last_known_ratio(), 0.0);
        pane.record_report(-0.1);
        assert_eq!(pane.reported_ratio(), Some(0.0));
    }

    #[test]
    fn applied_write_supersedes_stale_report() {
        let frame = SimulatedFrame::builder("t").build();
        let mut pane = Pane::new(PaneRole::Target, Arc::downgrade(&frame) as Weak<dyn FrameHost>);
        pane.record_write(0.4);
        assert_eq!(pane.reported_ratio(), None);
        pane.record_report(1.0);
        pane.record_write(0.5);
        assert_eq!(pane.last_known_ratio(), 0.5);
        assert_eq!(pane.reported_ratio(), Some(0.5));
    }
}
