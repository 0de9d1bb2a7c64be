//! Consolidated health report.
//!
//! A [`HealthReport`] is rebuilt from scratch on every request; nothing in it
//! is cached. Recommendations are a deterministic function of the tier, the
//! leak verdict and the trend.

use serde::Serialize;
use std::fmt::Write as FmtWrite;

use crate::actions::GcStats;
use crate::monitor::MemoryAlert;
use crate::pressure::{HealthTier, PressureEvent};
use crate::sample::MemorySample;
use crate::trend::{LeakDetectionResult, MemoryTrend, TrendDirection};

/// State of the periodic loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub history_len: usize,
    pub history_capacity: usize,
    pub ticks: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthTier,
    pub current_usage: MemorySample,
    pub trend: MemoryTrend,
    pub gc_stats: GcStats,
    pub leak_detection: LeakDetectionResult,
    pub recent_alerts: Vec<MemoryAlert>,
    pub recent_pressure_events: Vec<PressureEvent>,
    pub recommendations: Vec<String>,
    pub monitoring: MonitoringStatus,
}

/// Recommendations for the given situation, most urgent first, without
/// duplicates.
pub fn recommendations(
    tier: HealthTier,
    leak: &LeakDetectionResult,
    trend: &MemoryTrend,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !out.iter().any(|existing| existing == s) {
            out.push(s.to_string());
        }
    };

    match tier {
        HealthTier::Emergency => {
            if leak.detected {
                push("Restart the process: sustained heap growth with emergency memory pressure");
            }
            push("Shed load immediately and run emergency cleanup");
        }
        HealthTier::Critical => {
            push("Run emergency cleanup and defer non-critical background work");
        }
        HealthTier::Warning => push("Review cache TTLs and sizes"),
        HealthTier::Healthy => {}
    }

    if leak.detected {
        push("Investigate sustained heap growth; capture a heap snapshot if enabled");
    } else if trend.trend == TrendDirection::Increasing {
        push("Monitor heap growth over the next intervals");
    } else if tier.is_healthy() {
        push("Memory usage is healthy");
    }

    for rec in &trend.recommendations {
        push(rec.as_str());
    }
    out
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

impl HealthReport {
    /// Renders the report as plain-text tables.
    pub fn render_text(&self) -> String {
        let left = 22usize;
        let col = 14usize;
        let mut out = String::new();

        writeln!(out, "MEMORY HEALTH: {}", self.status.as_str().to_uppercase()).ok();
        writeln!(out, "==============").ok();
        writeln!(out).ok();

        let u = &self.current_usage;
        writeln!(out, "{:left$} | {:>col$}", "metric", "value", left = left, col = col).ok();
        writeln!(out, "{}", "-".repeat(left + 3 + col)).ok();
        for (name, value) in [
            ("usage", format!("{:.1}%", u.usage_percentage)),
            ("heap used", format_bytes(u.heap_used)),
            ("heap total", format_bytes(u.heap_total)),
            ("rss", format_bytes(u.rss)),
            ("external", format_bytes(u.external)),
            ("trend", self.trend.trend.to_string()),
            (
                "growth / min",
                format!(
                    "{}{}",
                    if self.trend.growth_rate < 0.0 { "-" } else { "" },
                    format_bytes(self.trend.growth_rate.abs() as u64)
                ),
            ),
            (
                "leak suspected",
                format!(
                    "{} ({:.0}%)",
                    if self.leak_detection.detected { "yes" } else { "no" },
                    self.leak_detection.confidence * 100.0
                ),
            ),
        ] {
            writeln!(out, "{:left$} | {:>col$}", name, value, left = left, col = col).ok();
        }

        writeln!(out).ok();
        writeln!(out, "COLLECTIONS").ok();
        writeln!(out, "===========").ok();
        let gc = &self.gc_stats;
        writeln!(
            out,
            "collector: {} ({})",
            gc.collector,
            if gc.available { "available" } else { "unavailable" }
        )
        .ok();
        writeln!(
            out,
            "collections: {}  failures: {}  skipped: {}  coalesced: {}  freed: {}",
            gc.collections,
            gc.failures,
            gc.skipped,
            gc.coalesced,
            format_bytes(gc.total_freed_bytes)
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "RECENT PRESSURE EVENTS").ok();
        writeln!(out, "======================").ok();
        if self.recent_pressure_events.is_empty() {
            writeln!(out, "(none)").ok();
        }
        for e in &self.recent_pressure_events {
            writeln!(
                out,
                "{} {:>9} {:>6.1}% actions={} freed={} {}",
                e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                e.level,
                e.memory_usage,
                e.actions_performed.len(),
                format_bytes(e.memory_freed),
                if e.success { "ok" } else { "FAILED" }
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "RECENT ALERTS").ok();
        writeln!(out, "=============").ok();
        if self.recent_alerts.is_empty() {
            writeln!(out, "(none)").ok();
        }
        for a in &self.recent_alerts {
            writeln!(
                out,
                "{} {:>9} {}",
                a.timestamp.format("%Y-%m-%d %H:%M:%S"),
                a.level,
                a.message
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "RECOMMENDATIONS").ok();
        writeln!(out, "===============").ok();
        for r in &self.recommendations {
            writeln!(out, "- {}", r).ok();
        }

        writeln!(out).ok();
        let m = &self.monitoring;
        writeln!(
            out,
            "monitor: {} every {}s, {}/{} samples, {} ticks",
            if m.running { "running" } else { "stopped" },
            m.interval_secs,
            m.history_len,
            m.history_capacity,
            m.ticks
        )
        .ok();
        out
    }
}
