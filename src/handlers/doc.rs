//! Documentation endpoint handler.

use axum::{http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::handlers::FOOTER_TEXT;

/// Handler for the /doc endpoint.
#[instrument]
pub async fn doc_handler() -> impl IntoResponse {
    debug!("Processing /doc request");

    let version = env!("CARGO_PKG_VERSION");
    let doc = format!(
        r#"HERAKLES MEMORY HEALTH MONITOR - DOCUMENTATION
==============================================

VERSION: {}
DESCRIPTION: Adaptive memory-health monitor with leak detection and pressure response

HTTP ENDPOINTS
--------------
GET  /health          - Health report as JSON (200 healthy/warning, 503 critical/emergency)
GET  /status          - Health report as plain text
GET  /metrics         - Prometheus metrics endpoint
GET  /config          - Effective configuration (YAML)
GET  /doc             - This documentation (plain text)
POST /admin/gc        - Force a collection (?reason=...)
POST /admin/cleanup   - Run the emergency cleanup sequence
POST /admin/snapshot  - Write a heap snapshot document (403 unless enabled)

HEALTH TIERS
------------
healthy    usage <  warning_percent   (default 80)
warning    usage >= warning_percent   -> forced collection
critical   usage >= critical_percent  (default 90) -> emergency cleanup
emergency  usage >= emergency_percent (default 95) -> emergency cleanup

Usage is anonymous resident memory (RssAnon) as percent of the budget:
memory_limit_bytes if set, else the cgroup v2 memory.max, else MemTotal.

AVAILABLE METRICS
-----------------
herakles_mem_health_rss_bytes                  - Resident set size
herakles_mem_health_heap_used_bytes            - Anonymous resident memory
herakles_mem_health_heap_total_bytes           - Memory budget
herakles_mem_health_external_bytes             - File-backed and shared resident memory
herakles_mem_health_usage_percent              - Heap used in percent of budget
herakles_mem_health_tier                       - 0=healthy .. 3=emergency
herakles_mem_health_growth_bytes_per_minute    - Heap growth over the history
herakles_mem_health_leak_suspected             - Sustained growth detected (0/1)
herakles_mem_health_leak_confidence            - Confidence of the leak verdict
herakles_mem_health_monitor_running            - Periodic loop running (0/1)
herakles_mem_health_history_samples            - Samples in the history
herakles_mem_health_pressure_events_total      - Pressure responses per tier
herakles_mem_health_collections_total          - Collection requests per outcome
herakles_mem_health_freed_bytes_total          - Bytes released by collections

CONFIGURATION
-------------
Config file locations (first match wins):
1. CLI specified: -c /path/to/config.yaml
2. /etc/herakles/mem-health.yaml|yml|json
3. ./herakles-mem-health.yaml|yml|json

Key configuration options:
- port: HTTP listen port (default: 9216)
- bind: Bind address (default: 0.0.0.0)
- interval_secs: Sampling interval (default: 30)
- history_capacity: Samples kept for trend analysis (default: 60)
- warning_percent / critical_percent / emergency_percent
- memory_limit_bytes: Explicit memory budget
- collector: auto | malloc-trim | none
- enable_admin: /admin endpoints (default: true)
- enable_heap_snapshots: POST /admin/snapshot (default: false)

CLI COMMANDS
------------
herakles-mem-health                         - Start the monitor and HTTP server
herakles-mem-health check                   - Validate system requirements
herakles-mem-health config -o config.yaml   - Generate config file
herakles-mem-health sample -n 5             - Capture samples and print the report
herakles-mem-health generate-testdata       - Write a synthetic sample series
herakles-mem-health --help                  - Show all CLI options

EXAMPLE USAGE
-------------
# Replay a synthetic leak
herakles-mem-health generate-testdata -n 30 --growth-percent 5 -o leak.json
herakles-mem-health -t leak.json --interval 1

# Check health
curl http://localhost:9216/health

# Trigger a collection
curl -X POST 'http://localhost:9216/admin/gc?reason=deploy'

{}
"#,
        version, FOOTER_TEXT
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}
