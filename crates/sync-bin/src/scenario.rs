//! Scripted dual-pane sessions against simulated frames.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use core_config::SyncConfig;
use core_events::ScrollSurface;
use core_frame::{FrameHost, SimulatedFrame};
use core_sync::{SyncCoordinator, SyncPhase, SyncStatus};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Both documents readable: direct access.
    SameOrigin,
    /// Documents refuse access; the outer containers are synchronized.
    CrossOrigin,
    /// One pane only reports its position through messages: polling.
    Cooperative,
    /// Load signals never fire; probing starts after the readiness bound.
    NeverLoads,
    /// Nothing scrollable in either pane.
    Unscrollable,
    /// Document access is lost mid-session and sync falls back.
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaneReport {
    pub label: String,
    pub surface: &'static str,
    pub offset: Option<f64>,
    pub writes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub final_phase: SyncPhase,
    pub source: PaneReport,
    pub target: PaneReport,
}

fn weak(frame: &Arc<SimulatedFrame>) -> Weak<dyn FrameHost> {
    Arc::downgrade(frame) as Weak<dyn FrameHost>
}

fn pane_report(frame: &SimulatedFrame, surface: ScrollSurface) -> PaneReport {
    PaneReport {
        label: frame.label().to_string(),
        surface: surface.as_str(),
        offset: frame.offset(surface),
        writes: frame.write_count(),
    }
}

async fn wait_phase(
    phases: &mut watch::Receiver<SyncPhase>,
    wanted: SyncPhase,
    limit: Duration,
) -> Result<()> {
    let reached = timeout(limit, phases.wait_for(|p| *p == wanted || *p == SyncPhase::TornDown))
        .await
        .with_context(|| format!("phase {wanted} not reached within {limit:?}"))?
        .context("session dropped its phase channel")?;
    if *reached != wanted {
        bail!("session ended in {} while waiting for {wanted}", *reached);
    }
    Ok(())
}

/// Run `scenario`, handing every status transition to `on_status`.
pub async fn run(
    scenario: Scenario,
    config: SyncConfig,
    on_status: impl Fn(&SyncStatus) + Send + Sync + 'static,
) -> Result<ScenarioReport> {
    let (source, target, surface) = frames(scenario);
    let mut coordinator = SyncCoordinator::new(config, on_status);
    let mut phases = coordinator.enter_dual_pane_mode(weak(&source), weak(&target));
    // Long enough for readiness, every probe retry and one round of writes.
    let startup = config.readiness_timeout
        + (config.probe_retry + Duration::from_millis(50)) * (config.max_retries + 1);
    let round = config.throttle + config.settle + config.poll_interval * 2;

    info!(target: "runtime.scenario", scenario = ?scenario, "scenario_start");
    match scenario {
        Scenario::Unscrollable => {
            wait_phase(&mut phases, SyncPhase::TornDown, startup).await?;
        }
        Scenario::Revoked => {
            wait_phase(&mut phases, SyncPhase::Active, startup).await?;
            source.user_scroll(ScrollSurface::Document, 600.0);
            sleep(round).await;
            source.revoke_document_access();
            source.user_scroll(ScrollSurface::Document, 900.0);
            sleep(round).await;
            source.user_scroll(ScrollSurface::Container, 450.0);
            sleep(round).await;
        }
        _ => {
            wait_phase(&mut phases, SyncPhase::Active, startup).await?;
            source.user_scroll(surface, 1000.0);
            sleep(round).await;
            target.user_scroll(surface, 250.0);
            sleep(round).await;
        }
    }

    let final_phase = coordinator.phase();
    coordinator.exit_dual_pane_mode();
    let report = ScenarioReport {
        scenario,
        final_phase,
        source: pane_report(&source, surface),
        target: pane_report(&target, surface),
    };
    info!(target: "runtime.scenario", scenario = ?scenario, final_phase = final_phase.as_str(), "scenario_done");
    Ok(report)
}

/// Source pane, target pane and the surface the script scrolls.
fn frames(scenario: Scenario) -> (Arc<SimulatedFrame>, Arc<SimulatedFrame>, ScrollSurface) {
    match scenario {
        Scenario::SameOrigin => (
            SimulatedFrame::builder("original").document(3000.0, 1000.0).loaded().build(),
            SimulatedFrame::builder("translated").document(1500.0, 500.0).loaded().build(),
            ScrollSurface::Document,
        ),
        Scenario::CrossOrigin => {
            let sealed = |label: &str, content: f64| {
                SimulatedFrame::builder(label)
                    .document(content, 1000.0)
                    .container(content, 1000.0)
                    .cross_origin()
                    .loaded()
                    .build()
            };
            (
                sealed("original", 3000.0),
                sealed("translated", 2000.0),
                ScrollSurface::Container,
            )
        }
        Scenario::Cooperative => (
            SimulatedFrame::builder("original").document(3000.0, 1000.0).loaded().build(),
            SimulatedFrame::builder("translated")
                .document(2000.0, 1000.0)
                .cross_origin()
                .cooperative()
                .loaded()
                .build(),
            ScrollSurface::Document,
        ),
        Scenario::NeverLoads => (
            SimulatedFrame::builder("original").document(3000.0, 1000.0).build(),
            SimulatedFrame::builder("translated").document(1500.0, 500.0).build(),
            ScrollSurface::Document,
        ),
        Scenario::Unscrollable => (
            SimulatedFrame::builder("original").loaded().build(),
            SimulatedFrame::builder("translated").loaded().build(),
            ScrollSurface::Document,
        ),
        Scenario::Revoked => {
            let open = |label: &str| {
                SimulatedFrame::builder(label)
                    .document(2000.0, 1000.0)
                    .container(1900.0, 1000.0)
                    .loaded()
                    .build()
            };
            (open("original"), open("translated"), ScrollSurface::Container)
        }
    }
}
