//! HTTP endpoint handlers.
//!
//! - `/health`: health report as JSON, status code follows the tier
//! - `/status`: health report as plain text
//! - `/metrics`: Prometheus metrics endpoint
//! - `/config`: effective configuration
//! - `/doc`: documentation
//! - `/admin/*`: operator actions

pub mod admin;
pub mod config;
pub mod doc;
pub mod health;
pub mod metrics;

pub use admin::{cleanup_handler, gc_handler, snapshot_handler};
pub use config::config_handler;
pub use doc::doc_handler;
pub use health::{health_handler, status_handler};
pub use metrics::metrics_handler;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str =
    "Project: https://github.com/herakles-io/herakles-mem-health - More info: https://www.herakles.io";

#[cfg(test)]
pub(crate) fn test_state(usage_percent: f64, snapshot_dir: Option<std::path::PathBuf>) -> crate::state::SharedState {
    use herakles_mem_health::{
        Config, MemoryMonitor, MemorySample, NullCollector, ReplaySampler,
    };
    use std::sync::Arc;

    let config = Config {
        enable_heap_snapshots: Some(snapshot_dir.is_some()),
        snapshot_dir,
        ..Config::default()
    };
    let sample = MemorySample::with_usage(1 << 30, usage_percent, chrono::Utc::now());
    let monitor = MemoryMonitor::new(
        config.monitor_settings(),
        Arc::new(ReplaySampler::new(vec![sample])),
        Arc::new(NullCollector),
    );
    let registry = prometheus::Registry::new();
    let metrics = crate::metrics::HealthMetrics::new(&registry).unwrap();
    Arc::new(crate::state::AppState {
        monitor,
        registry,
        metrics,
        config: Arc::new(config),
    })
}
