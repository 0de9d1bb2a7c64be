//! Health tiers and the graduated response ladder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::actions::{ActionExecutor, OptimizationAction};
use crate::sample::{MemorySample, MemorySampler};

/// Health tier derived from usage percentage alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTier {
    Healthy,
    Warning,
    Critical,
    Emergency,
}

impl HealthTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthTier::Healthy => "healthy",
            HealthTier::Warning => "warning",
            HealthTier::Critical => "critical",
            HealthTier::Emergency => "emergency",
        }
    }

    /// Numeric value for gauges (0 = healthy .. 3 = emergency).
    pub fn as_gauge(&self) -> f64 {
        match self {
            HealthTier::Healthy => 0.0,
            HealthTier::Warning => 1.0,
            HealthTier::Critical => 2.0,
            HealthTier::Emergency => 3.0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthTier::Healthy)
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lower bounds (inclusive, in percent) of the non-healthy tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureThresholds {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            warning: 80.0,
            critical: 90.0,
            emergency: 95.0,
        }
    }
}

impl PressureThresholds {
    pub fn tier_for(&self, usage_percentage: f64) -> HealthTier {
        if usage_percentage >= self.emergency {
            HealthTier::Emergency
        } else if usage_percentage >= self.critical {
            HealthTier::Critical
        } else if usage_percentage >= self.warning {
            HealthTier::Warning
        } else {
            HealthTier::Healthy
        }
    }
}

/// Record of one response cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureEvent {
    pub timestamp: DateTime<Utc>,
    pub level: HealthTier,
    /// Usage percentage when the cycle started.
    pub memory_usage: f64,
    pub actions_performed: Vec<OptimizationAction>,
    pub memory_freed: u64,
    pub duration_ms: f64,
    pub success: bool,
}

/// Classifies samples and runs the matching mitigation.
pub struct PressureController {
    thresholds: PressureThresholds,
    sampler: Arc<dyn MemorySampler>,
    executor: Arc<ActionExecutor>,
}

impl PressureController {
    pub fn new(
        thresholds: PressureThresholds,
        sampler: Arc<dyn MemorySampler>,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        Self {
            thresholds,
            sampler,
            executor,
        }
    }

    pub fn thresholds(&self) -> PressureThresholds {
        self.thresholds
    }

    /// Tier of `sample`. Pure: no hysteresis, nothing cached.
    pub fn evaluate(&self, sample: &MemorySample) -> HealthTier {
        self.thresholds.tier_for(sample.usage_percentage)
    }

    /// Runs the response for `level` against a fresh sample and returns
    /// exactly one event.
    pub fn respond(&self, level: HealthTier) -> PressureEvent {
        let memory_usage = self.sampler.capture().usage_percentage;
        self.respond_at(level, memory_usage)
    }

    /// Runs the response for `level`, recording `memory_usage` as the usage
    /// the tier was derived from.
    ///
    /// Warning forces a collection; critical and emergency run the full
    /// emergency cleanup; healthy does nothing.
    pub fn respond_at(&self, level: HealthTier, memory_usage: f64) -> PressureEvent {
        let start = Instant::now();
        let timestamp = Utc::now();

        let actions_performed = match level {
            HealthTier::Healthy => Vec::new(),
            HealthTier::Warning => vec![self
                .executor
                .force_collect(&format!("pressure: {}", level))],
            HealthTier::Critical | HealthTier::Emergency => self.executor.emergency_cleanup(),
        };

        let memory_freed = actions_performed
            .iter()
            .map(OptimizationAction::memory_freed)
            .sum();
        let success = actions_performed.iter().all(|a| a.success);

        let event = PressureEvent {
            timestamp,
            level,
            memory_usage,
            actions_performed,
            memory_freed,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            success,
        };
        log_event(&event);
        event
    }
}

/// One structured log record per pressure event.
fn log_event(event: &PressureEvent) {
    let actions = event
        .actions_performed
        .iter()
        .map(|a| {
            if a.success {
                a.kind.as_str().to_string()
            } else {
                format!("{}(failed)", a.kind)
            }
        })
        .collect::<Vec<_>>()
        .join(",");

    macro_rules! emit {
        ($lvl:ident) => {
            $lvl!(
                tier = %event.level,
                usage_percent = event.memory_usage,
                actions = %actions,
                memory_freed = event.memory_freed,
                duration_ms = event.duration_ms,
                success = event.success,
                "Memory pressure event"
            )
        };
    }

    match event.level {
        HealthTier::Healthy | HealthTier::Warning if event.success => emit!(info),
        HealthTier::Emergency => emit!(error),
        _ => emit!(warn),
    }
}
