//! herakles-mem-health - adaptive memory-health monitoring for a single process.
//!
//! The library samples the process' memory counters, keeps a bounded history to
//! derive growth trends and leak suspicion, classifies the current usage into a
//! health tier and runs a graduated ladder of mitigation actions. Everything is
//! process-local and in-memory; nothing survives a restart.
//!
//! The main entry point is [`MemoryMonitor`]:
//!
//! ```no_run
//! use herakles_mem_health::{Config, MemoryMonitor};
//!
//! # async fn run() -> Result<(), herakles_mem_health::MonitorError> {
//! let monitor = MemoryMonitor::from_config(&Config::default())?;
//! monitor.start()?;
//! let report = monitor.report();
//! println!("status: {}", report.status);
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod collector;
pub mod config;
pub mod error;
pub mod monitor;
pub mod pressure;
pub mod report;
pub mod ring;
pub mod sample;
pub mod stats;
pub mod system;
pub mod trend;

pub use actions::{
    ActionExecutor, ActionKind, GcStats, HeapSnapshot, MemoryReleaser, OptimizationAction,
};
pub use collector::{Collector, MallocTrimCollector, NullCollector};
pub use config::{Config, MonitorSettings};
pub use error::MonitorError;
pub use monitor::{AlertKind, MemoryAlert, MemoryMonitor};
pub use pressure::{HealthTier, PressureController, PressureEvent, PressureThresholds};
pub use report::{HealthReport, MonitoringStatus};
pub use ring::RingBuffer;
pub use sample::{MemorySample, MemorySampler, ProcSampler, ReplaySampler};
pub use trend::{LeakDetectionResult, MemoryTrend, TrendAnalyzer, TrendDirection, TrendSettings};
