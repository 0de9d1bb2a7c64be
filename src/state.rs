//! Application state shared with the HTTP handlers.

use herakles_mem_health::{Config, MemoryMonitor};
use prometheus::Registry;
use std::sync::Arc;

use crate::metrics::HealthMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub monitor: MemoryMonitor,
    pub registry: Registry,
    pub metrics: HealthMetrics,
    /// Effective configuration after CLI overrides.
    pub config: Arc<Config>,
}
