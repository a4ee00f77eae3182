#![allow(dead_code)] // Shared across integration tests; each test binary uses a subset of helpers.

use core_config::SyncConfig;
use core_frame::{FrameHost, SimulatedFrame};
use core_sync::{SyncCoordinator, SyncPhase, SyncStatus};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;

pub struct Harness {
    pub coordinator: SyncCoordinator,
    pub statuses: Arc<Mutex<Vec<SyncStatus>>>,
    pub phases: watch::Receiver<SyncPhase>,
}

impl Harness {
    pub fn start(config: SyncConfig, source: &Arc<SimulatedFrame>, target: &Arc<SimulatedFrame>) -> Self {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let mut coordinator = SyncCoordinator::new(config, move |s: &SyncStatus| {
            sink.lock().unwrap().push(s.clone());
        });
        let phases = coordinator.enter_dual_pane_mode(weak(source), weak(target));
        Self {
            coordinator,
            statuses,
            phases,
        }
    }

    pub async fn wait_for(&mut self, phase: SyncPhase) {
        self.phases
            .wait_for(|p| *p == phase)
            .await
            .expect("phase channel closed");
    }

    pub fn statuses(&self) -> Vec<SyncStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn phases_seen(&self) -> Vec<SyncPhase> {
        self.statuses().iter().map(|s| s.phase).collect()
    }

    pub fn last(&self) -> SyncStatus {
        self.statuses().last().cloned().expect("no status reported")
    }
}

pub fn weak(frame: &Arc<SimulatedFrame>) -> Weak<dyn FrameHost> {
    Arc::downgrade(frame) as Weak<dyn FrameHost>
}

pub fn same_origin(label: &str, content: f64, viewport: f64) -> Arc<SimulatedFrame> {
    SimulatedFrame::builder(label)
        .document(content, viewport)
        .loaded()
        .build()
}

/// Let the session run for `ms` of (paused) time.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
