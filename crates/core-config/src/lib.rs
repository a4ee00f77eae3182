//! Configuration loading and parsing.
//!
//! Parses `scrollsync.toml` (or an override path provided by the binary)
//! extracting the `[sync]` table. Every key is optional and falls back to its
//! default. The raw parsed values are kept as written; [`Config::sync`]
//! produces the sanitized [`SyncConfig`] consumed by the runtime, clamping
//! values that would stall or disable synchronization.
//!
//! Unknown fields are ignored (TOML deserialization tolerance) so a config
//! file written for a newer build still loads.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "scrollsync.toml";

/// Largest ratio delta that can be configured as "no change". Anything larger
/// would swallow real half-page scrolls.
pub const MAX_EPSILON: f64 = 0.5;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SyncSection {
    /// Throttle window per propagation direction.
    #[serde(default = "SyncSection::default_throttle_ms")]
    pub throttle_ms: u64,
    /// How long the reentrancy guard stays held after a propagated write.
    #[serde(default = "SyncSection::default_settle_ms")]
    pub settle_ms: u64,
    /// Upper bound for waiting on both frames to load.
    #[serde(default = "SyncSection::default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
    /// Layout settle delay after both frames report load.
    #[serde(default = "SyncSection::default_readiness_settle_ms")]
    pub readiness_settle_ms: u64,
    /// Sample interval of the polling strategy.
    #[serde(default = "SyncSection::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extra probing rounds when no strategy is usable at setup.
    #[serde(default = "SyncSection::default_max_retries")]
    pub max_retries: u32,
    /// Delay between probing rounds.
    #[serde(default = "SyncSection::default_probe_retry_ms")]
    pub probe_retry_ms: u64,
    /// Ratio changes smaller than this are treated as no movement.
    #[serde(default = "SyncSection::default_epsilon")]
    pub epsilon: f64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            throttle_ms: Self::default_throttle_ms(),
            settle_ms: Self::default_settle_ms(),
            readiness_timeout_ms: Self::default_readiness_timeout_ms(),
            readiness_settle_ms: Self::default_readiness_settle_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            max_retries: Self::default_max_retries(),
            probe_retry_ms: Self::default_probe_retry_ms(),
            epsilon: Self::default_epsilon(),
        }
    }
}

impl SyncSection {
    const fn default_throttle_ms() -> u64 {
        16 // roughly one frame at 60Hz
    }
    const fn default_settle_ms() -> u64 {
        50
    }
    const fn default_readiness_timeout_ms() -> u64 {
        10_000
    }
    const fn default_readiness_settle_ms() -> u64 {
        300
    }
    const fn default_poll_interval_ms() -> u64 {
        100
    }
    const fn default_max_retries() -> u32 {
        3
    }
    const fn default_probe_retry_ms() -> u64 {
        250
    }
    const fn default_epsilon() -> f64 {
        0.001
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>,      // original file string (optional)
    pub source: Option<PathBuf>,  // path the file was read from
    pub file: ConfigFile,         // parsed (or default) data
}

/// Effective runtime settings derived from [`SyncSection`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    pub throttle: Duration,
    pub settle: Duration,
    pub readiness_timeout: Duration,
    pub readiness_settle: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub probe_retry: Duration,
    pub epsilon: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncSection::default().sanitize()
    }
}

/// Best-effort config path following platform conventions (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("scrollsync").join(CONFIG_FILE_NAME);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            info!(target: "config", path = %path.display(), "config_loaded");
            Ok(Config {
                raw: Some(content),
                source: Some(path),
                file,
            })
        }
        Err(e) => {
            // Fall back to defaults.
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Sanitized runtime settings.
    pub fn sync(&self) -> SyncConfig {
        self.file.sync.sanitize()
    }
}

fn at_least_one_ms(name: &'static str, raw: u64) -> Duration {
    if raw == 0 {
        info!(target: "config", key = name, raw, clamped = 1u64, "sync_value_clamped");
        Duration::from_millis(1)
    } else {
        Duration::from_millis(raw)
    }
}

impl SyncSection {
    /// Clamp raw values into their usable ranges. Zero-length intervals would
    /// turn timers into busy loops, so they are raised to 1ms.
    pub fn sanitize(&self) -> SyncConfig {
        let epsilon = if self.epsilon.is_finite() {
            self.epsilon.clamp(0.0, MAX_EPSILON)
        } else {
            Self::default_epsilon()
        };
        if epsilon != self.epsilon {
            info!(target: "config", key = "epsilon", raw = self.epsilon, clamped = epsilon, "sync_value_clamped");
        }
        SyncConfig {
            throttle: at_least_one_ms("throttle_ms", self.throttle_ms),
            settle: at_least_one_ms("settle_ms", self.settle_ms),
            readiness_timeout: at_least_one_ms("readiness_timeout_ms", self.readiness_timeout_ms),
            readiness_settle: Duration::from_millis(self.readiness_settle_ms),
            poll_interval: at_least_one_ms("poll_interval_ms", self.poll_interval_ms),
            max_retries: self.max_retries,
            probe_retry: at_least_one_ms("probe_retry_ms", self.probe_retry_ms),
            epsilon,
        }
    }
}
