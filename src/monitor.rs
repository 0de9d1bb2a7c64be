//! Lifecycle of the memory-health monitor.
//!
//! [`MemoryMonitor`] owns the sample history, the alert list and the event
//! list behind a single lock, and drives one periodic tick on the tokio
//! runtime. Everything else is reachable through it: on-demand actions, the
//! health report and the process-wide instance.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::{self, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::actions::{panic_message, ActionExecutor, HeapSnapshot, MemoryReleaser, OptimizationAction};
use crate::collector::{collector_from_config, Collector};
use crate::config::{Config, MonitorSettings};
use crate::error::MonitorError;
use crate::pressure::{HealthTier, PressureController, PressureEvent};
use crate::report::{recommendations, HealthReport, MonitoringStatus};
use crate::ring::RingBuffer;
use crate::sample::{MemorySample, MemorySampler, ProcSampler};
use crate::stats::{Stat, StatSnapshot};
use crate::trend::TrendAnalyzer;

static GLOBAL: OnceCell<MemoryMonitor> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Usage crossed into a non-healthy tier.
    Pressure,
    /// Sustained heap growth was detected.
    LeakSuspected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAlert {
    pub timestamp: DateTime<Utc>,
    pub level: HealthTier,
    pub kind: AlertKind,
    pub message: String,
    pub usage_percentage: f64,
}

/// Mutable state guarded by the monitor's single lock.
struct MonitorState {
    analyzer: TrendAnalyzer,
    alerts: RingBuffer<MemoryAlert>,
    events: RingBuffer<PressureEvent>,
    /// Tier of the previous tick, to alert on transitions only.
    last_tier: HealthTier,
    leak_alerted: bool,
    /// Pressure events recorded per tier, indexed by `HealthTier::as_gauge`.
    events_by_tier: [u64; 4],
    /// Bumped by `cleanup`; a tick started in an older epoch records nothing.
    epoch: u64,
}

impl MonitorState {
    fn new(settings: &MonitorSettings, epoch: u64) -> Self {
        Self {
            analyzer: TrendAnalyzer::new(settings.trend, settings.history_capacity),
            alerts: RingBuffer::new(settings.alert_capacity),
            events: RingBuffer::new(settings.event_capacity),
            last_tier: HealthTier::Healthy,
            leak_alerted: false,
            events_by_tier: [0; 4],
            epoch,
        }
    }
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    settings: MonitorSettings,
    sampler: Arc<dyn MemorySampler>,
    executor: Arc<ActionExecutor>,
    controller: PressureController,
    state: Mutex<MonitorState>,
    ticker: Mutex<Option<Ticker>>,
    ticks: AtomicU64,
    loops_started: AtomicU64,
    tick_duration_ms: Stat,
}

/// Cloneable handle to one monitor instance.
#[derive(Clone)]
pub struct MemoryMonitor {
    inner: Arc<Inner>,
}

impl MemoryMonitor {
    pub fn new(
        settings: MonitorSettings,
        sampler: Arc<dyn MemorySampler>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        let executor = Arc::new(ActionExecutor::new(
            sampler.clone(),
            collector,
            settings.snapshots.clone(),
        ));
        let controller =
            PressureController::new(settings.thresholds, sampler.clone(), executor.clone());
        let state = MonitorState::new(&settings, 0);

        Self {
            inner: Arc::new(Inner {
                settings,
                sampler,
                executor,
                controller,
                state: Mutex::new(state),
                ticker: Mutex::new(None),
                ticks: AtomicU64::new(0),
                loops_started: AtomicU64::new(0),
                tick_duration_ms: Stat::default(),
            }),
        }
    }

    /// Builds a monitor sampling the current process with the collector named
    /// in `config`.
    pub fn from_config(config: &Config) -> Result<Self, MonitorError> {
        crate::config::validate_effective_config(config)?;
        let sampler = Arc::new(ProcSampler::new(config.memory_limit_bytes));
        let collector = collector_from_config(config.collector.as_deref());
        Ok(Self::new(config.monitor_settings(), sampler, collector))
    }

    /// Installs `monitor` as the process-wide instance.
    pub fn install_global(monitor: MemoryMonitor) -> Result<&'static MemoryMonitor, MonitorError> {
        GLOBAL
            .set(monitor)
            .map_err(|_| MonitorError::AlreadyInstalled)?;
        GLOBAL.get().ok_or(MonitorError::AlreadyInstalled)
    }

    /// The process-wide instance, if installed.
    pub fn global() -> Option<&'static MemoryMonitor> {
        GLOBAL.get()
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.inner.settings
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.inner.executor
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_ticker(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.inner.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the periodic loop on the current tokio runtime. Calling it while
    /// the loop runs does nothing.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut ticker = self.lock_ticker();
        if let Some(t) = ticker.as_ref() {
            if !t.handle.is_finished() && !t.cancel.is_cancelled() {
                debug!("Memory monitor already running");
                return Ok(());
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MonitorError::NoRuntime(e.to_string()))?;

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_loop(self.clone(), cancel.clone()));
        *ticker = Some(Ticker { cancel, handle });
        self.inner.loops_started.fetch_add(1, Ordering::Relaxed);

        info!(
            "Memory monitor started with {}s interval",
            self.inner.settings.interval.as_secs()
        );
        Ok(())
    }

    /// Cancels the next tick. A tick already in progress runs to completion.
    pub fn stop(&self) {
        if let Some(t) = self.lock_ticker().take() {
            t.cancel.cancel();
            info!("Memory monitor stopped");
        }
    }

    /// Stops the loop and forgets all history, alerts, events, registrations
    /// and statistics. A later `start()` behaves like a fresh instance.
    pub fn cleanup(&self) {
        self.stop();
        {
            let mut state = self.lock_state();
            let epoch = state.epoch + 1;
            *state = MonitorState::new(&self.inner.settings, epoch);
            self.inner.ticks.store(0, Ordering::Relaxed);
            self.inner.tick_duration_ms.reset();
        }
        self.inner.executor.reset();
        info!("Memory monitor cleaned up");
    }

    pub fn is_running(&self) -> bool {
        self.lock_ticker()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished() && !t.cancel.is_cancelled())
    }

    /// Number of times a loop was spawned over the monitor's lifetime.
    pub fn loops_started(&self) -> u64 {
        self.inner.loops_started.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    pub fn tick_duration_ms(&self) -> StatSnapshot {
        self.inner.tick_duration_ms.snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.lock_state().analyzer.len()
    }

    /// Pressure events recorded since start or the last cleanup, per tier.
    pub fn pressure_event_totals(&self) -> Vec<(HealthTier, u64)> {
        let counts = self.lock_state().events_by_tier;
        [
            HealthTier::Healthy,
            HealthTier::Warning,
            HealthTier::Critical,
            HealthTier::Emergency,
        ]
        .into_iter()
        .map(|tier| (tier, counts[tier.as_gauge() as usize]))
        .collect()
    }

    /// Takes a fresh sample without recording it.
    pub fn sample(&self) -> MemorySample {
        self.inner.sampler.capture()
    }

    /// Current tier from a fresh sample.
    pub fn evaluate(&self) -> HealthTier {
        self.inner.controller.evaluate(&self.sample())
    }

    /// True when collaborators should postpone non-critical background work.
    pub fn should_defer_background_work(&self) -> bool {
        self.evaluate() >= HealthTier::Critical
    }

    pub fn register_cache(&self, releaser: Arc<dyn MemoryReleaser>) {
        self.inner.executor.register_cache(releaser);
    }

    pub fn register_buffer(&self, releaser: Arc<dyn MemoryReleaser>) {
        self.inner.executor.register_buffer(releaser);
    }

    /// Operator-triggered collection.
    pub fn force_collect(&self, reason: &str) -> OptimizationAction {
        self.inner.executor.force_collect(reason)
    }

    /// Operator-triggered emergency cleanup.
    pub fn emergency_cleanup(&self) -> Vec<OptimizationAction> {
        self.inner.executor.emergency_cleanup()
    }

    pub fn create_heap_snapshot(&self, reason: &str) -> Result<HeapSnapshot, MonitorError> {
        self.inner.executor.create_heap_snapshot(reason)
    }

    /// One sampling cycle: sample, record, evaluate, respond, alert.
    ///
    /// Blocks while mitigation runs; the periodic loop calls it on the
    /// blocking pool.
    #[instrument(skip(self))]
    pub fn tick(&self) {
        let start = Instant::now();
        let sample = self.inner.sampler.capture();
        let tier = self.inner.controller.evaluate(&sample);
        let usage = sample.usage_percentage;

        let (leak, epoch) = {
            let mut state = self.lock_state();
            state.analyzer.record(sample);
            let leak = state.analyzer.detect_leak();

            if tier != state.last_tier {
                if !tier.is_healthy() {
                    let message = format!("Memory usage {:.1}% entered {} tier", usage, tier);
                    warn!("{}", message);
                    state.alerts.push(MemoryAlert {
                        timestamp: Utc::now(),
                        level: tier,
                        kind: AlertKind::Pressure,
                        message,
                        usage_percentage: usage,
                    });
                } else {
                    info!("Memory usage {:.1}% back to healthy", usage);
                }
                state.last_tier = tier;
            }

            if leak.detected && !state.leak_alerted {
                let message = format!(
                    "Possible memory leak: heap growing {:.0} bytes/min (confidence {:.0}%)",
                    leak.growth_rate,
                    leak.confidence * 100.0
                );
                warn!("{}", message);
                state.alerts.push(MemoryAlert {
                    timestamp: Utc::now(),
                    level: tier,
                    kind: AlertKind::LeakSuspected,
                    message,
                    usage_percentage: usage,
                });
            }
            state.leak_alerted = leak.detected;
            (leak, state.epoch)
        };

        // Actions run without the state lock held.
        let event = (!tier.is_healthy())
            .then(|| self.inner.controller.respond_at(tier, usage));

        {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                debug!("Monitor cleaned up during tick, discarding its result");
                return;
            }
            if let Some(event) = event {
                state.events_by_tier[tier.as_gauge() as usize] += 1;
                state.events.push(event);
            }
            self.inner.ticks.fetch_add(1, Ordering::Relaxed);
            self.inner
                .tick_duration_ms
                .add_sample(start.elapsed().as_secs_f64() * 1000.0);
        }
        debug!(
            tier = %tier,
            usage_percent = usage,
            leak_suspected = leak.detected,
            "Memory monitor tick completed"
        );
    }

    /// Builds a fresh report. Never triggers actions.
    pub fn report(&self) -> HealthReport {
        let current_usage = self.inner.sampler.capture();
        let status = self.inner.controller.evaluate(&current_usage);
        let recent = self.inner.settings.report_recent;

        let (trend, leak_detection, recent_alerts, recent_pressure_events, history_len) = {
            let state = self.lock_state();
            (
                state.analyzer.compute_trend(),
                state.analyzer.detect_leak(),
                state.alerts.recent(recent),
                state.events.recent(recent),
                state.analyzer.len(),
            )
        };

        let recommendations = recommendations(status, &leak_detection, &trend);

        HealthReport {
            status,
            current_usage,
            trend,
            gc_stats: self.inner.executor.gc_stats(),
            leak_detection,
            recent_alerts,
            recent_pressure_events,
            recommendations,
            monitoring: MonitoringStatus {
                running: self.is_running(),
                interval_secs: self.inner.settings.interval.as_secs(),
                history_len,
                history_capacity: self.inner.settings.history_capacity,
                ticks: self.ticks(),
            },
        }
    }
}

async fn run_loop(monitor: MemoryMonitor, cancel: CancellationToken) {
    let mut ticker = interval(monitor.inner.settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let m = monitor.clone();
        match task::spawn_blocking(move || m.tick()).await {
            Ok(()) => {}
            Err(e) if e.is_panic() => error!(
                "Memory monitor tick panicked: {}",
                panic_message(e.into_panic().as_ref())
            ),
            Err(e) => error!("Memory monitor tick failed: {}", e),
        }
    }
    debug!("Memory monitor loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionKind;
    use crate::collector::NullCollector;
    use crate::sample::ReplaySampler;
    use crate::collector::Collector;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    fn settings(interval_secs: u64) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(interval_secs),
            ..MonitorSettings::default()
        }
    }

    /// Constant usage sampler.
    struct Fixed(f64);

    impl MemorySampler for Fixed {
        fn capture(&self) -> MemorySample {
            MemorySample::with_usage(1024 * MB, self.0, Utc::now())
        }
    }

    /// Usage switchable from the test.
    struct Adjustable(Mutex<f64>);

    impl MemorySampler for Adjustable {
        fn capture(&self) -> MemorySample {
            MemorySample::with_usage(1024 * MB, *self.0.lock().unwrap(), Utc::now())
        }
    }

    /// Panics on every other capture.
    struct Flaky(AtomicBool);

    impl MemorySampler for Flaky {
        fn capture(&self) -> MemorySample {
            if self.0.fetch_xor(true, Ordering::SeqCst) {
                panic!("sampler blew up");
            }
            MemorySample::with_usage(1024 * MB, 10.0, Utc::now())
        }
    }

    /// Holds each collection until the test releases it.
    struct HeldCollector {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl HeldCollector {
        fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (started_tx, started_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let collector = Arc::new(Self {
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            });
            (collector, started_rx, release_tx)
        }
    }

    impl Collector for HeldCollector {
        fn name(&self) -> &'static str {
            "held"
        }
        fn collect(&self) -> anyhow::Result<()> {
            self.started.lock().unwrap().send(()).ok();
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .ok();
            Ok(())
        }
    }

    fn monitor_at(percent: f64) -> MemoryMonitor {
        MemoryMonitor::new(settings(1), Arc::new(Fixed(percent)), Arc::new(NullCollector))
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let monitor = monitor_at(10.0);
        assert!(matches!(monitor.start(), Err(MonitorError::NoRuntime(_))));
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_creates_one_timer() {
        let monitor = monitor_at(10.0);
        monitor.start().unwrap();
        monitor.start().unwrap();
        assert_eq!(monitor.loops_started(), 1);
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let len = monitor.history_len();
        assert!((3..=4).contains(&len), "history len {}", len);

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_history_cleanup_clears_it() {
        let monitor = monitor_at(10.0);
        monitor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        monitor.stop();

        let len = monitor.history_len();
        assert!(len >= 2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(monitor.history_len(), len);

        monitor.cleanup();
        assert_eq!(monitor.history_len(), 0);
        assert_eq!(monitor.ticks(), 0);

        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert_eq!(monitor.loops_started(), 2);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(monitor.history_len() >= 1);
        monitor.cleanup();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_panicking_ticks() {
        let monitor = MemoryMonitor::new(
            settings(1),
            Arc::new(Flaky(AtomicBool::new(false))),
            Arc::new(NullCollector),
        );
        monitor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(monitor.is_running());
        assert!(monitor.history_len() >= 2);
        monitor.stop();
    }

    #[test]
    fn test_cleanup_during_tick_leaves_fresh_state() {
        let (collector, started, release) = HeldCollector::new();
        let monitor = MemoryMonitor::new(settings(1), Arc::new(Fixed(85.0)), collector);

        let ticking = {
            let monitor = monitor.clone();
            thread::spawn(move || monitor.tick())
        };
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        let cleaning = {
            let monitor = monitor.clone();
            thread::spawn(move || monitor.cleanup())
        };
        thread::sleep(Duration::from_millis(100));
        release.send(()).unwrap();
        ticking.join().unwrap();
        cleaning.join().unwrap();

        assert_eq!(monitor.history_len(), 0);
        assert_eq!(monitor.ticks(), 0);
        assert!(monitor.pressure_event_totals().iter().all(|(_, n)| *n == 0));
        let report = monitor.report();
        assert!(report.recent_pressure_events.is_empty());
        assert!(report.recent_alerts.is_empty());
        assert_eq!(report.gc_stats.collections, 0);

        // the next tick counts again
        let monitor2 = monitor.clone();
        let next = thread::spawn(move || monitor2.tick());
        started.recv_timeout(Duration::from_secs(5)).unwrap();
        release.send(()).unwrap();
        next.join().unwrap();
        assert_eq!(monitor.ticks(), 1);
        assert_eq!(monitor.pressure_event_totals()[1], (HealthTier::Warning, 1));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_tick_does_not_stall_runtime() {
        let (collector, started, release) = HeldCollector::new();
        let monitor = MemoryMonitor::new(settings(60), Arc::new(Fixed(85.0)), collector);
        let begin = Instant::now();
        monitor.start().unwrap();

        let observed = task::spawn_blocking(move || {
            started.recv_timeout(Duration::from_secs(5)).is_ok()
        })
        .await
        .unwrap();
        assert!(observed);

        // collection is still held; timers on this runtime keep firing
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(begin.elapsed() < Duration::from_secs(2), "{:?}", begin.elapsed());

        release.send(()).unwrap();
        monitor.stop();
    }

    #[test]
    fn test_tick_responds_and_records_event() {
        let monitor = monitor_at(85.0);
        monitor.tick();

        let report = monitor.report();
        assert_eq!(report.status, HealthTier::Warning);
        assert_eq!(report.recent_pressure_events.len(), 1);
        let event = &report.recent_pressure_events[0];
        assert_eq!(event.level, HealthTier::Warning);
        assert_eq!(event.memory_usage, 85.0);
        assert_eq!(event.actions_performed[0].kind, ActionKind::ForceCollect);
        assert_eq!(report.recent_alerts.len(), 1);
        assert_eq!(report.recent_alerts[0].kind, AlertKind::Pressure);

        // same tier again: new event, no new alert
        monitor.tick();
        let report = monitor.report();
        assert_eq!(report.recent_pressure_events.len(), 2);
        assert_eq!(report.recent_alerts.len(), 1);
    }

    #[test]
    fn test_healthy_tick_takes_no_action() {
        let monitor = monitor_at(20.0);
        monitor.tick();
        let report = monitor.report();
        assert!(report.recent_pressure_events.is_empty());
        assert!(report.recent_alerts.is_empty());
        assert_eq!(report.monitoring.history_len, 1);
        assert_eq!(report.gc_stats.skipped, 0);
    }

    #[test]
    fn test_report_status_tracks_current_usage() {
        let sampler = Arc::new(Adjustable(Mutex::new(50.0)));
        let monitor = MemoryMonitor::new(settings(1), sampler.clone(), Arc::new(NullCollector));

        for usage in [10.0, 79.9, 80.0, 89.9, 90.0, 94.9, 95.0, 99.0, 40.0] {
            *sampler.0.lock().unwrap() = usage;
            let report = monitor.report();
            let expected = monitor.settings().thresholds.tier_for(report.current_usage.usage_percentage);
            assert_eq!(report.status, expected);
        }
        // report never records samples or runs actions
        assert_eq!(monitor.history_len(), 0);
        assert_eq!(monitor.executor().gc_stats().skipped, 0);
    }

    #[test]
    fn test_leak_alert_raised_once() {
        let base = Utc::now();
        let samples: Vec<MemorySample> = (0..12)
            .map(|i| {
                let heap = (100.0 * MB as f64 * 1.05f64.powi(i)) as u64;
                MemorySample::new(
                    heap,
                    100 * 1024 * MB,
                    heap,
                    0,
                    base + chrono::Duration::minutes(i as i64),
                )
            })
            .collect();
        let monitor = MemoryMonitor::new(
            settings(1),
            Arc::new(ReplaySampler::new(samples)),
            Arc::new(NullCollector),
        );
        for _ in 0..12 {
            monitor.tick();
        }

        let state = monitor.lock_state();
        let leak_alerts = state
            .alerts
            .iter()
            .filter(|a| a.kind == AlertKind::LeakSuspected)
            .count();
        assert_eq!(leak_alerts, 1);
    }

    #[test]
    fn test_should_defer_background_work() {
        assert!(!monitor_at(85.0).should_defer_background_work());
        assert!(monitor_at(91.0).should_defer_background_work());
        assert!(monitor_at(99.0).should_defer_background_work());
    }

    #[test]
    fn test_event_history_is_bounded() {
        let monitor = MemoryMonitor::new(
            MonitorSettings {
                event_capacity: 3,
                ..settings(1)
            },
            Arc::new(Fixed(96.0)),
            Arc::new(NullCollector),
        );
        for _ in 0..10 {
            monitor.tick();
        }
        assert_eq!(monitor.lock_state().events.len(), 3);
        let totals = monitor.pressure_event_totals();
        assert_eq!(totals[3], (HealthTier::Emergency, 10));
        assert_eq!(totals[1], (HealthTier::Warning, 0));
    }
}
