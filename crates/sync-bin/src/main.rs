//! scrollsync entrypoint: runs a scripted dual-pane session and prints every
//! status transition as a JSON line.
use anyhow::{Context, Result};
use clap::Parser;
use core_events::{
    CHANNEL_FULL_DROPS, CHANNEL_SEND_FAILURES, ECHOES_SUPPRESSED, FOREIGN_MESSAGES, POLL_TICKS,
    SCROLL_EVENTS, STRATEGY_DOWNGRADES, SYNC_WRITES,
};
use core_sync::SyncStatus;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod scenario;

use scenario::Scenario;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "scrollsync", version, about = "Dual-pane scroll sync scenario runner")]
struct Args {
    /// Scripted session to run.
    #[arg(long, value_enum, default_value_t = Scenario::SameOrigin)]
    scenario: Scenario,
    /// Optional configuration file path (overrides discovery of `scrollsync.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Log file; replaced on every run. Filter with `RUST_LOG`.
    #[arg(long = "log-file", default_value = "scrollsync.log")]
    log_file: PathBuf,
}

fn configure_logging(log_path: &Path) -> Result<Option<WorkerGuard>> {
    if log_path.exists() {
        let _ = std::fs::remove_file(log_path);
    }
    let dir = match log_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = log_path
        .file_name()
        .context("log file path has no file name")?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Ok(Some(guard)),
        // Global subscriber already installed; drop guard so the writer shuts down.
        Err(_err) => Ok(None),
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn print_status(status: &SyncStatus) {
    match serde_json::to_string(status) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(target: "runtime", ?e, "status_encode_failed"),
    }
}

fn log_telemetry() {
    let load = |c: &std::sync::atomic::AtomicU64| c.load(Ordering::Relaxed);
    info!(
        target: "runtime.telemetry",
        scroll_events = load(&SCROLL_EVENTS),
        echoes_suppressed = load(&ECHOES_SUPPRESSED),
        sync_writes = load(&SYNC_WRITES),
        strategy_downgrades = load(&STRATEGY_DOWNGRADES),
        foreign_messages = load(&FOREIGN_MESSAGES),
        poll_ticks = load(&POLL_TICKS),
        channel_full_drops = load(&CHANNEL_FULL_DROPS),
        channel_send_failures = load(&CHANNEL_SEND_FAILURES),
        "counters"
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(&args.log_file)?;
    install_panic_hook();
    info!(target: "runtime", "startup");

    let config_path = args.config.clone().unwrap_or_else(core_config::discover);
    let config = core_config::load_from(Some(config_path))?;
    let sync = config.sync();
    let config_source = config.source.as_ref().map(|p| p.display().to_string());
    info!(
        target: "runtime.startup",
        config_source = config_source.as_deref(),
        config_override = args.config.is_some(),
        throttle_ms = sync.throttle.as_millis() as u64,
        settle_ms = sync.settle.as_millis() as u64,
        "bootstrap_complete"
    );

    let report = scenario::run(args.scenario, sync, print_status).await?;
    println!("{}", serde_json::to_string(&report)?);

    log_telemetry();
    info!(target: "runtime", "shutdown");
    Ok(())
}
