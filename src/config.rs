//! Configuration for the memory-health monitor.
//!
//! The on-disk [`Config`] keeps every field optional so that partial files
//! merge cleanly with the defaults. [`MonitorSettings`] is the resolved,
//! typed view the monitor runs with.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::actions::SnapshotSettings;
use crate::error::MonitorError;
use crate::pressure::PressureThresholds;
use crate::trend::TrendSettings;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;
pub const DEFAULT_ALERT_CAPACITY: usize = 50;
pub const DEFAULT_EVENT_CAPACITY: usize = 50;
pub const DEFAULT_REPORT_RECENT: usize = 10;
pub const DEFAULT_SNAPSHOT_DIR: &str = "/var/tmp/herakles-mem-health";

/// Default config file locations, searched in order.
pub const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/herakles/mem-health.yaml",
    "/etc/herakles/mem-health.yml",
    "/etc/herakles/mem-health.json",
    "./herakles-mem-health.yaml",
    "./herakles-mem-health.yml",
    "./herakles-mem-health.json",
];

/// Configuration as read from file and CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Sampling loop
    #[serde(alias = "interval")]
    pub interval_secs: Option<u64>,
    #[serde(alias = "history-capacity")]
    pub history_capacity: Option<usize>,
    #[serde(alias = "alert-capacity")]
    pub alert_capacity: Option<usize>,
    #[serde(alias = "event-capacity")]
    pub event_capacity: Option<usize>,
    /// Number of alerts/events included in a health report
    #[serde(alias = "report-recent")]
    pub report_recent: Option<usize>,

    // Trend analysis
    #[serde(alias = "min-samples")]
    pub min_samples: Option<usize>,
    #[serde(alias = "leak-subwindows")]
    pub leak_subwindows: Option<usize>,
    #[serde(alias = "full-confidence-samples")]
    pub full_confidence_samples: Option<usize>,
    pub stable_growth_bytes_per_min: Option<f64>,
    pub leak_growth_bytes_per_min: Option<f64>,

    // Pressure tiers (percent of the memory budget)
    pub warning_percent: Option<f64>,
    pub critical_percent: Option<f64>,
    pub emergency_percent: Option<f64>,
    /// Memory budget in bytes; defaults to the cgroup limit or MemTotal
    pub memory_limit_bytes: Option<u64>,

    /// "auto" | "malloc-trim" | "none"
    pub collector: Option<String>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,
    pub enable_admin: Option<bool>,
    pub enable_heap_snapshots: Option<bool>,
    pub snapshot_dir: Option<PathBuf>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let trend = TrendSettings::default();
        let thresholds = PressureThresholds::default();
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            interval_secs: Some(DEFAULT_INTERVAL_SECS),
            history_capacity: Some(DEFAULT_HISTORY_CAPACITY),
            alert_capacity: Some(DEFAULT_ALERT_CAPACITY),
            event_capacity: Some(DEFAULT_EVENT_CAPACITY),
            report_recent: Some(DEFAULT_REPORT_RECENT),
            min_samples: Some(trend.min_samples),
            leak_subwindows: Some(trend.subwindows),
            full_confidence_samples: Some(trend.full_confidence_samples),
            stable_growth_bytes_per_min: Some(trend.stable_growth_bytes_per_min),
            leak_growth_bytes_per_min: Some(trend.leak_growth_bytes_per_min),
            warning_percent: Some(thresholds.warning),
            critical_percent: Some(thresholds.critical),
            emergency_percent: Some(thresholds.emergency),
            memory_limit_bytes: None,
            collector: Some("auto".into()),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            enable_admin: Some(true),
            enable_heap_snapshots: Some(false),
            snapshot_dir: Some(PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            log_level: Some("info".into()),
        }
    }
}

/// Resolved settings the monitor runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub history_capacity: usize,
    pub alert_capacity: usize,
    pub event_capacity: usize,
    pub report_recent: usize,
    pub trend: TrendSettings,
    pub thresholds: PressureThresholds,
    pub snapshots: SnapshotSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Config::default().monitor_settings()
    }
}

impl Config {
    /// Resolves the typed settings, filling gaps with defaults.
    pub fn monitor_settings(&self) -> MonitorSettings {
        let trend_defaults = TrendSettings::default();
        let threshold_defaults = PressureThresholds::default();

        MonitorSettings {
            interval: Duration::from_secs(self.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS)),
            history_capacity: self.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY),
            alert_capacity: self.alert_capacity.unwrap_or(DEFAULT_ALERT_CAPACITY),
            event_capacity: self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
            report_recent: self.report_recent.unwrap_or(DEFAULT_REPORT_RECENT),
            trend: TrendSettings {
                min_samples: self.min_samples.unwrap_or(trend_defaults.min_samples),
                subwindows: self.leak_subwindows.unwrap_or(trend_defaults.subwindows),
                full_confidence_samples: self
                    .full_confidence_samples
                    .unwrap_or(trend_defaults.full_confidence_samples),
                stable_growth_bytes_per_min: self
                    .stable_growth_bytes_per_min
                    .unwrap_or(trend_defaults.stable_growth_bytes_per_min),
                leak_growth_bytes_per_min: self
                    .leak_growth_bytes_per_min
                    .unwrap_or(trend_defaults.leak_growth_bytes_per_min),
            },
            thresholds: PressureThresholds {
                warning: self.warning_percent.unwrap_or(threshold_defaults.warning),
                critical: self.critical_percent.unwrap_or(threshold_defaults.critical),
                emergency: self
                    .emergency_percent
                    .unwrap_or(threshold_defaults.emergency),
            },
            snapshots: SnapshotSettings {
                enabled: self.enable_heap_snapshots.unwrap_or(false),
                dir: self
                    .snapshot_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            },
        }
    }
}

/// Validate effective config (used by --check-config and at startup).
pub fn validate_effective_config(cfg: &Config) -> Result<(), MonitorError> {
    let settings = cfg.monitor_settings();

    if settings.interval.is_zero() {
        return Err(MonitorError::InvalidConfig(
            "interval_secs must be greater than 0".into(),
        ));
    }

    for (name, value) in [
        ("history_capacity", settings.history_capacity),
        ("alert_capacity", settings.alert_capacity),
        ("event_capacity", settings.event_capacity),
        ("leak_subwindows", settings.trend.subwindows),
    ] {
        if value == 0 {
            return Err(MonitorError::InvalidConfig(format!(
                "{name} must be greater than 0"
            )));
        }
    }

    if settings.trend.min_samples < 2 {
        return Err(MonitorError::InvalidConfig(
            "min_samples must be at least 2".into(),
        ));
    }
    if settings.trend.min_samples > settings.history_capacity {
        return Err(MonitorError::InvalidConfig(format!(
            "min_samples ({}) exceeds history_capacity ({})",
            settings.trend.min_samples, settings.history_capacity
        )));
    }
    if settings.trend.leak_growth_bytes_per_min <= 0.0
        || settings.trend.stable_growth_bytes_per_min < 0.0
    {
        return Err(MonitorError::InvalidConfig(
            "growth thresholds must be positive".into(),
        ));
    }

    let t = settings.thresholds;
    if !(0.0 < t.warning && t.warning < t.critical && t.critical < t.emergency && t.emergency <= 100.0)
    {
        return Err(MonitorError::InvalidConfig(format!(
            "thresholds must satisfy 0 < warning ({}) < critical ({}) < emergency ({}) <= 100",
            t.warning, t.critical, t.emergency
        )));
    }

    if let Some(mode) = cfg.collector.as_deref() {
        if !matches!(mode, "auto" | "malloc-trim" | "none") {
            return Err(MonitorError::InvalidConfig(format!(
                "Invalid collector '{}', expected 'auto', 'malloc-trim' or 'none'",
                mode
            )));
        }
    }

    Ok(())
}

/// Loads configuration from `path`, or from the first default location that
/// exists. Missing files yield the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, MonitorError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
        {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path).map_err(|source| MonitorError::ConfigRead {
        path: path.clone(),
        source,
    })?;

    let parse_err = |reason: String| MonitorError::ConfigParse {
        path: path.clone(),
        reason,
    };

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        // Default to YAML
        _ => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(merge_with_defaults(config))
}

/// Fills every unset field of `config` with its default.
fn merge_with_defaults(config: Config) -> Config {
    let d = Config::default();
    Config {
        port: config.port.or(d.port),
        bind: config.bind.or(d.bind),
        interval_secs: config.interval_secs.or(d.interval_secs),
        history_capacity: config.history_capacity.or(d.history_capacity),
        alert_capacity: config.alert_capacity.or(d.alert_capacity),
        event_capacity: config.event_capacity.or(d.event_capacity),
        report_recent: config.report_recent.or(d.report_recent),
        min_samples: config.min_samples.or(d.min_samples),
        leak_subwindows: config.leak_subwindows.or(d.leak_subwindows),
        full_confidence_samples: config.full_confidence_samples.or(d.full_confidence_samples),
        stable_growth_bytes_per_min: config
            .stable_growth_bytes_per_min
            .or(d.stable_growth_bytes_per_min),
        leak_growth_bytes_per_min: config
            .leak_growth_bytes_per_min
            .or(d.leak_growth_bytes_per_min),
        warning_percent: config.warning_percent.or(d.warning_percent),
        critical_percent: config.critical_percent.or(d.critical_percent),
        emergency_percent: config.emergency_percent.or(d.emergency_percent),
        memory_limit_bytes: config.memory_limit_bytes.or(d.memory_limit_bytes),
        collector: config.collector.or(d.collector),
        enable_health: config.enable_health.or(d.enable_health),
        enable_telemetry: config.enable_telemetry.or(d.enable_telemetry),
        enable_admin: config.enable_admin.or(d.enable_admin),
        enable_heap_snapshots: config.enable_heap_snapshots.or(d.enable_heap_snapshots),
        snapshot_dir: config.snapshot_dir.or(d.snapshot_dir),
        log_level: config.log_level.or(d.log_level),
    }
}
