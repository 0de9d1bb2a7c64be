//! Config command implementation.

use herakles_mem_health::Config;
use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::commands::render;

/// Generates configuration files
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-mem-health.yaml"));

    let mut content = render(&config, format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Memory Health Monitor Configuration
# ============================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"                  # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                       # HTTP port
#
# Sampling
# --------
# interval_secs: 30                # Seconds between samples
# history_capacity: 60             # Samples kept for trend analysis
# alert_capacity: 50               # Alerts kept
# event_capacity: 50               # Pressure events kept
# report_recent: 10                # Alerts/events shown in the report
# memory_limit_bytes: null         # Budget (null = cgroup memory.max, then MemTotal)
#
# Trend Analysis
# --------------
# min_samples: 5                   # Samples needed before any verdict
# leak_subwindows: 3               # Sub-windows checked for sustained growth
# full_confidence_samples: 20      # Samples for full confidence weight
# stable_growth_bytes_per_min: 65536   # Below this the trend is stable
# leak_growth_bytes_per_min: 1048576   # At or above this growth is suspicious
#
# Pressure Tiers (percent of budget)
# ----------------------------------
# warning_percent: 80.0            # Forced collection
# critical_percent: 90.0           # Emergency cleanup
# emergency_percent: 95.0          # Emergency cleanup
#
# Actions
# -------
# collector: "auto"                # auto, malloc-trim, none
# enable_heap_snapshots: false     # Allow POST /admin/snapshot
# snapshot_dir: "/var/tmp/herakles-mem-health"
#
# Feature Flags
# -------------
# enable_health: true              # /health and /status endpoints
# enable_telemetry: true           # /metrics endpoint
# enable_admin: true               # /admin endpoints
#
# Logging
# -------
# log_level: "info"                # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
