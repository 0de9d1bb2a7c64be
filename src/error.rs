//! Error types for the memory-health monitor.
//!
//! Only hard failures live here. Soft failures of mitigation steps are
//! recorded on the corresponding [`OptimizationAction`](crate::OptimizationAction)
//! and never surface as an error.

use std::path::PathBuf;
use thiserror::Error;

/// Hard failures of the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Heap snapshots are an opt-in diagnostic and are currently disabled.
    #[error("heap snapshots are disabled (enable_heap_snapshots = false)")]
    SnapshotDisabled,

    /// Writing the snapshot document failed.
    #[error("failed to write heap snapshot {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding the snapshot document failed.
    #[error("failed to encode heap snapshot: {0}")]
    SnapshotEncode(#[from] serde_json::Error),

    /// `start()` was called without a tokio runtime.
    #[error("monitor loop requires a tokio runtime: {0}")]
    NoRuntime(String),

    /// The process-wide instance was already installed.
    #[error("a global memory monitor is already installed")]
    AlreadyInstalled,

    /// Reading a configuration file failed.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parsing a configuration file failed.
    #[error("failed to parse config {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    /// The effective configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
