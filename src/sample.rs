//! Point-in-time memory samples.
//!
//! A [`MemorySampler`] produces a [`MemorySample`] on demand. Sampling never
//! fails: if the counters cannot be read the sample is zeroed and the problem
//! is logged at debug level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::system;

/// Memory counters of the process at one instant. All byte counts are in
/// bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Resident set size.
    pub rss: u64,
    /// Memory budget the heap is measured against.
    pub heap_total: u64,
    /// Anonymous resident memory, never above `heap_total`.
    pub heap_used: u64,
    /// File-backed and shared resident memory.
    pub external: u64,
    /// `heap_used / heap_total` in percent, within [0, 100].
    pub usage_percentage: f64,
    pub timestamp: DateTime<Utc>,
}

impl MemorySample {
    /// Builds a sample, enforcing `heap_used <= heap_total` and the
    /// percentage range.
    pub fn new(
        rss: u64,
        heap_total: u64,
        heap_used: u64,
        external: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let heap_used = heap_used.min(heap_total);
        let usage_percentage = if heap_total == 0 {
            0.0
        } else {
            (heap_used as f64 / heap_total as f64 * 100.0).clamp(0.0, 100.0)
        };
        Self {
            rss,
            heap_total,
            heap_used,
            external,
            usage_percentage,
            timestamp,
        }
    }

    /// Re-applies the invariants to a sample that did not come from
    /// [`MemorySample::new`], e.g. one read from a file. The recorded
    /// percentage is kept only when it agrees with the counters.
    pub fn normalized(self) -> Self {
        let recorded = self.usage_percentage;
        let mut sample = Self::new(
            self.rss,
            self.heap_total,
            self.heap_used,
            self.external,
            self.timestamp,
        );
        if recorded.is_finite() && (recorded - sample.usage_percentage).abs() < 0.01 {
            sample.usage_percentage = recorded.clamp(0.0, 100.0);
        }
        sample
    }

    /// A sample whose usage is exactly `percent` of `heap_total`.
    pub fn with_usage(heap_total: u64, percent: f64, timestamp: DateTime<Utc>) -> Self {
        let heap_used = (heap_total as f64 * percent.clamp(0.0, 100.0) / 100.0).round() as u64;
        let mut sample = Self::new(heap_used, heap_total, heap_used, 0, timestamp);
        sample.usage_percentage = percent.clamp(0.0, 100.0);
        sample
    }
}

/// Source of memory samples.
pub trait MemorySampler: Send + Sync {
    fn capture(&self) -> MemorySample;
}

/// Samples the current process through /proc.
#[derive(Debug, Clone)]
pub struct ProcSampler {
    budget: u64,
}

impl ProcSampler {
    /// Creates a sampler measuring against `memory_limit_bytes`, or the cgroup
    /// limit / MemTotal when unset.
    pub fn new(memory_limit_bytes: Option<u64>) -> Self {
        let budget = system::resolve_memory_budget(memory_limit_bytes);
        debug!("ProcSampler using memory budget of {} bytes", budget);
        Self { budget }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }
}

impl MemorySampler for ProcSampler {
    fn capture(&self) -> MemorySample {
        let status = match system::read_self_status() {
            Ok(status) => status,
            Err(e) => {
                debug!("Sampling failed, using zeroed counters: {}", e);
                system::ProcStatus::default()
            }
        };

        MemorySample::new(
            status.vm_rss,
            self.budget,
            status.rss_anon,
            status.rss_file.saturating_add(status.rss_shmem),
            Utc::now(),
        )
    }
}

/// Replays a recorded series of samples, repeating the last one once the
/// series is exhausted.
#[derive(Debug)]
pub struct ReplaySampler {
    samples: Vec<MemorySample>,
    cursor: AtomicUsize,
}

impl ReplaySampler {
    pub fn new(samples: Vec<MemorySample>) -> Self {
        Self {
            samples: samples.into_iter().map(MemorySample::normalized).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of samples not yet replayed.
    pub fn remaining(&self) -> usize {
        self.samples
            .len()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }
}

impl MemorySampler for ReplaySampler {
    fn capture(&self) -> MemorySample {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        match self.samples.get(idx).or_else(|| self.samples.last()) {
            Some(sample) => sample.clone(),
            None => MemorySample::new(0, 0, 0, 0, Utc::now()),
        }
    }
}
