//! Growth trend and leak suspicion over the bounded sample history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ring::RingBuffer;
use crate::sample::MemorySample;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Per-sample relative heap growth that alone earns full magnitude.
const FULL_RELATIVE_GROWTH: f64 = 0.05;

/// Tuning knobs for trend and leak analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSettings {
    /// Samples required before any trend is derived.
    pub min_samples: usize,
    /// Number of consecutive sub-windows checked for sustained growth.
    pub subwindows: usize,
    /// Sample count at which confidence stops growing with more samples.
    pub full_confidence_samples: usize,
    /// Below this absolute growth rate the trend is `stable`.
    pub stable_growth_bytes_per_min: f64,
    /// Growth rate above which a leak may be suspected.
    pub leak_growth_bytes_per_min: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            min_samples: 5,
            subwindows: 3,
            full_confidence_samples: 20,
            stable_growth_bytes_per_min: 64.0 * KIB,
            leak_growth_bytes_per_min: MIB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Trend derived from the current history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTrend {
    pub samples: usize,
    pub trend: TrendDirection,
    /// Heap growth in bytes per minute.
    pub growth_rate: f64,
    pub leak_suspected: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakDetectionResult {
    pub detected: bool,
    /// In [0, 1].
    pub confidence: f64,
    /// Heap growth in bytes per minute.
    pub growth_rate: f64,
    pub detection_time: DateTime<Utc>,
    pub recommendations: Vec<String>,
}

/// Bounded sample history plus the analysis over it.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    settings: TrendSettings,
    history: RingBuffer<MemorySample>,
}

impl TrendAnalyzer {
    pub fn new(settings: TrendSettings, capacity: usize) -> Self {
        Self {
            settings,
            history: RingBuffer::new(capacity),
        }
    }

    pub fn settings(&self) -> &TrendSettings {
        &self.settings
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn record(&mut self, sample: MemorySample) {
        self.history.push(sample);
    }

    pub fn history(&self) -> &RingBuffer<MemorySample> {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    fn has_enough_samples(&self) -> bool {
        self.history.len() >= self.settings.min_samples.max(2)
    }

    fn insufficient_data(&self) -> String {
        format!(
            "Insufficient data: {} of {} samples collected",
            self.history.len(),
            self.settings.min_samples
        )
    }

    /// Heap growth between the first and last sample in bytes/minute.
    fn growth_rate(&self) -> f64 {
        let (Some(first), Some(last)) = (self.history.first(), self.history.last()) else {
            return 0.0;
        };
        let elapsed_ms = last
            .timestamp
            .signed_duration_since(first.timestamp)
            .num_milliseconds();
        if elapsed_ms <= 0 {
            return 0.0;
        }
        let delta = last.heap_used as f64 - first.heap_used as f64;
        delta / (elapsed_ms as f64 / 60_000.0)
    }

    /// Geometric mean growth per step, relative to the first sample.
    fn relative_growth_per_step(&self) -> f64 {
        let (Some(first), Some(last)) = (self.history.first(), self.history.last()) else {
            return 0.0;
        };
        let steps = self.history.len().saturating_sub(1);
        if steps == 0 || first.heap_used == 0 || last.heap_used <= first.heap_used {
            return 0.0;
        }
        (last.heap_used as f64 / first.heap_used as f64).powf(1.0 / steps as f64) - 1.0
    }

    /// Size of the growth in [0, 1]. Crossing the absolute threshold is worth
    /// at least 2/3; steady relative growth can lift small heaps to 1.
    fn magnitude(&self, growth_rate: f64, threshold: f64) -> f64 {
        let ratio = growth_rate / threshold;
        if ratio <= 1.0 {
            return (ratio * 2.0 / 3.0).max(0.0);
        }
        let absolute = 2.0 / 3.0 + (ratio - 1.0).min(1.0) / 3.0;
        let relative = (self.relative_growth_per_step() / FULL_RELATIVE_GROWTH).min(1.0);
        absolute.max(relative)
    }

    /// Fraction of consecutive steps where the heap did not shrink.
    fn consistency(&self) -> f64 {
        let steps = self.history.len().saturating_sub(1);
        if steps == 0 {
            return 0.0;
        }
        let non_decreasing = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .filter(|(a, b)| b.heap_used >= a.heap_used)
            .count();
        non_decreasing as f64 / steps as f64
    }

    /// Growth is sustained when no sub-window shrinks and at least two
    /// sub-windows grow. A single spike cannot satisfy both.
    fn is_sustained(&self) -> bool {
        let n = self.history.len();
        if n < 2 {
            return false;
        }
        let steps = n - 1;
        let windows = self.settings.subwindows.clamp(1, steps);

        let mut growing = 0usize;
        for w in 0..windows {
            let start = w * steps / windows;
            let end = (w + 1) * steps / windows;
            let (Some(a), Some(b)) = (self.history.get(start), self.history.get(end)) else {
                return false;
            };
            if b.heap_used < a.heap_used {
                return false;
            }
            if b.heap_used > a.heap_used {
                growing += 1;
            }
        }
        growing >= windows.min(2)
    }

    /// Derives the trend from the current window.
    pub fn compute_trend(&self) -> MemoryTrend {
        let samples = self.history.len();
        if !self.has_enough_samples() {
            return MemoryTrend {
                samples,
                trend: TrendDirection::Stable,
                growth_rate: 0.0,
                leak_suspected: false,
                recommendations: vec![self.insufficient_data()],
            };
        }

        let growth_rate = self.growth_rate();
        let trend = if growth_rate.abs() < self.settings.stable_growth_bytes_per_min {
            TrendDirection::Stable
        } else if growth_rate > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        let leak = self.detect_leak();
        let mut recommendations = Vec::new();
        match trend {
            TrendDirection::Increasing => recommendations.push(format!(
                "Heap is growing by {:.2} MiB/min",
                growth_rate / MIB
            )),
            TrendDirection::Decreasing => recommendations.push(format!(
                "Heap is shrinking by {:.2} MiB/min",
                growth_rate.abs() / MIB
            )),
            TrendDirection::Stable => {}
        }
        recommendations.extend(leak.recommendations.iter().cloned());

        MemoryTrend {
            samples,
            trend,
            growth_rate,
            leak_suspected: leak.detected,
            recommendations,
        }
    }

    /// Leak suspicion: growth above the threshold, sustained across
    /// sub-windows.
    pub fn detect_leak(&self) -> LeakDetectionResult {
        let detection_time = Utc::now();
        if !self.has_enough_samples() {
            return LeakDetectionResult {
                detected: false,
                confidence: 0.0,
                growth_rate: 0.0,
                detection_time,
                recommendations: vec![self.insufficient_data()],
            };
        }

        let growth_rate = self.growth_rate();
        let threshold = self.settings.leak_growth_bytes_per_min;
        let sustained = self.is_sustained();
        let detected = growth_rate > threshold && sustained;

        let confidence = if growth_rate <= 0.0 || threshold <= 0.0 {
            0.0
        } else {
            let magnitude = self.magnitude(growth_rate, threshold);
            let full = self.settings.full_confidence_samples.max(1) as f64;
            let sample_factor = (self.history.len() as f64 / full).min(1.0);
            (magnitude * self.consistency() * (0.5 + 0.5 * sample_factor)).clamp(0.0, 1.0)
        };

        let mut recommendations = Vec::new();
        if detected {
            recommendations.push(format!(
                "Possible memory leak: heap grew {:.2} MiB/min across {} samples (confidence {:.0}%)",
                growth_rate / MIB,
                self.history.len(),
                confidence * 100.0
            ));
            recommendations.push("Review long-lived caches and listeners for unbounded growth".into());
        } else if growth_rate > threshold {
            recommendations
                .push("Heap growth above threshold but not sustained; likely a transient spike".into());
        }

        LeakDetectionResult {
            detected,
            confidence,
            growth_rate,
            detection_time,
            recommendations,
        }
    }
}
