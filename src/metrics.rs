//! Prometheus metrics for herakles-mem-health.
//!
//! Gauges are refreshed from a fresh [`HealthReport`] on every scrape.
//! Counters mirror totals kept by the monitor and only ever move forward; a
//! monitor cleanup resets the source totals, after which counters resume once
//! the source passes the exported value again.

use herakles_mem_health::{HealthReport, HealthTier, MemoryMonitor};
use prometheus::{Gauge, IntCounter, IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct HealthMetrics {
    pub rss: Gauge,
    pub heap_used: Gauge,
    pub heap_total: Gauge,
    pub external: Gauge,
    pub usage_percent: Gauge,
    pub tier: Gauge,
    pub growth_rate: Gauge,
    pub leak_suspected: Gauge,
    pub leak_confidence: Gauge,
    pub monitor_running: Gauge,
    pub history_samples: Gauge,
    pub tick_duration: Gauge,
    pub scrape_duration: Gauge,

    pub pressure_events: IntCounterVec,
    pub collections: IntCounterVec,
    pub freed_bytes: IntCounter,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<Gauge> {
    let g = Gauge::new(name, help)?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

/// Advances `counter` to `total` if the source is ahead.
fn sync_counter(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl HealthMetrics {
    /// Creates and registers all metrics with the registry.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let pressure_events = IntCounterVec::new(
            Opts::new(
                "herakles_mem_health_pressure_events_total",
                "Pressure response cycles run by the monitor, per tier",
            ),
            &["tier"],
        )?;
        let collections = IntCounterVec::new(
            Opts::new(
                "herakles_mem_health_collections_total",
                "Forced collection requests, per outcome",
            ),
            &["outcome"],
        )?;
        let freed_bytes = IntCounter::new(
            "herakles_mem_health_freed_bytes_total",
            "Bytes released by forced collections",
        )?;
        registry.register(Box::new(pressure_events.clone()))?;
        registry.register(Box::new(collections.clone()))?;
        registry.register(Box::new(freed_bytes.clone()))?;

        Ok(Self {
            rss: gauge(registry, "herakles_mem_health_rss_bytes", "Resident set size of the process")?,
            heap_used: gauge(registry, "herakles_mem_health_heap_used_bytes", "Anonymous resident memory of the process")?,
            heap_total: gauge(registry, "herakles_mem_health_heap_total_bytes", "Memory budget the usage percentage is computed against")?,
            external: gauge(registry, "herakles_mem_health_external_bytes", "File-backed and shared resident memory")?,
            usage_percent: gauge(registry, "herakles_mem_health_usage_percent", "Heap used as percent of the budget")?,
            tier: gauge(registry, "herakles_mem_health_tier", "Health tier (0=healthy, 1=warning, 2=critical, 3=emergency)")?,
            growth_rate: gauge(registry, "herakles_mem_health_growth_bytes_per_minute", "Heap growth rate over the sample history")?,
            leak_suspected: gauge(registry, "herakles_mem_health_leak_suspected", "Whether sustained heap growth is detected (1) or not (0)")?,
            leak_confidence: gauge(registry, "herakles_mem_health_leak_confidence", "Confidence of the leak verdict (0..1)")?,
            monitor_running: gauge(registry, "herakles_mem_health_monitor_running", "Whether the periodic loop is running (1) or stopped (0)")?,
            history_samples: gauge(registry, "herakles_mem_health_history_samples", "Samples currently held in the history")?,
            tick_duration: gauge(registry, "herakles_mem_health_tick_duration_seconds", "Duration of the last monitor tick")?,
            scrape_duration: gauge(registry, "herakles_mem_health_scrape_duration_seconds", "Time spent serving the /metrics request")?,
            pressure_events,
            collections,
            freed_bytes,
        })
    }

    /// Refreshes every metric from `report` and the monitor's totals.
    pub fn update(&self, report: &HealthReport, monitor: &MemoryMonitor) {
        let u = &report.current_usage;
        self.rss.set(u.rss as f64);
        self.heap_used.set(u.heap_used as f64);
        self.heap_total.set(u.heap_total as f64);
        self.external.set(u.external as f64);
        self.usage_percent.set(u.usage_percentage);
        self.tier.set(report.status.as_gauge());
        self.growth_rate.set(report.trend.growth_rate);
        self.leak_suspected
            .set(if report.leak_detection.detected { 1.0 } else { 0.0 });
        self.leak_confidence.set(report.leak_detection.confidence);
        self.monitor_running
            .set(if report.monitoring.running { 1.0 } else { 0.0 });
        self.history_samples.set(report.monitoring.history_len as f64);
        self.tick_duration.set(monitor.tick_duration_ms().last / 1000.0);

        for (tier, total) in monitor.pressure_event_totals() {
            if tier == HealthTier::Healthy {
                continue;
            }
            sync_counter(&self.pressure_events.with_label_values(&[tier.as_str()]), total);
        }

        let gc = &report.gc_stats;
        for (outcome, total) in [
            ("success", gc.collections.saturating_sub(gc.failures)),
            ("failure", gc.failures),
            ("skipped", gc.skipped),
            ("coalesced", gc.coalesced),
        ] {
            sync_counter(&self.collections.with_label_values(&[outcome]), total);
        }
        sync_counter(&self.freed_bytes, gc.total_freed_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_mem_health::{MemorySample, MonitorSettings, NullCollector, ReplaySampler};
    use prometheus::{Encoder, TextEncoder};
    use std::sync::Arc;

    fn monitor_at(percent: f64) -> MemoryMonitor {
        let sample = MemorySample::with_usage(1 << 30, percent, chrono::Utc::now());
        MemoryMonitor::new(
            MonitorSettings::default(),
            Arc::new(ReplaySampler::new(vec![sample])),
            Arc::new(NullCollector),
        )
    }

    fn encode(registry: &Registry) -> String {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_update_exports_report() {
        let registry = Registry::new();
        let metrics = HealthMetrics::new(&registry).unwrap();
        let monitor = monitor_at(92.0);
        monitor.tick();
        monitor.tick();

        metrics.update(&monitor.report(), &monitor);
        assert_eq!(metrics.tier.get(), 2.0);
        assert_eq!(metrics.usage_percent.get(), 92.0);
        assert_eq!(
            metrics.pressure_events.with_label_values(&["critical"]).get(),
            2
        );
        assert_eq!(metrics.collections.with_label_values(&["skipped"]).get(), 2);

        let text = encode(&registry);
        assert!(text.contains("herakles_mem_health_usage_percent 92"));
        assert!(text.contains("herakles_mem_health_pressure_events_total{tier=\"critical\"} 2"));
    }

    #[test]
    fn test_counters_never_go_backwards() {
        let registry = Registry::new();
        let metrics = HealthMetrics::new(&registry).unwrap();
        let monitor = monitor_at(85.0);
        monitor.tick();
        metrics.update(&monitor.report(), &monitor);
        assert_eq!(metrics.pressure_events.with_label_values(&["warning"]).get(), 1);

        monitor.cleanup();
        metrics.update(&monitor.report(), &monitor);
        assert_eq!(metrics.pressure_events.with_label_values(&["warning"]).get(), 1);
    }
}
