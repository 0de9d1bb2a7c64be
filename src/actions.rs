//! Mitigation actions: forced collection, emergency cleanup and heap
//! snapshots.
//!
//! Every step runs inside its own failure boundary. Errors and panics from a
//! collector or a registered releaser are recorded on the resulting
//! [`OptimizationAction`] with `success = false` and never reach the caller.
//! Collection and cleanup sequences are serialized through one gate, so two of
//! them never run at the same time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::collector::Collector;
use crate::error::MonitorError;
use crate::sample::{MemorySample, MemorySampler};
use crate::stats::{Stat, StatSnapshot};
use crate::system::{self, SmapsRollup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ForceCollect,
    ClearCache,
    ReleaseBuffer,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ForceCollect => "force_collect",
            ActionKind::ClearCache => "clear_cache",
            ActionKind::ReleaseBuffer => "release_buffer",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one mitigation step. Memory figures are heap bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Name of the cache or buffer for release steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub success: bool,
    pub memory_before: u64,
    pub memory_after: u64,
    pub duration_ms: f64,
    /// Failure reason or a note about a no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OptimizationAction {
    pub fn memory_freed(&self) -> u64 {
        self.memory_before.saturating_sub(self.memory_after)
    }
}

/// A resource that can give memory back on request (a cache, a pool of
/// buffers). Returns an estimate of the bytes released.
pub trait MemoryReleaser: Send + Sync {
    fn name(&self) -> &str;
    fn release(&self) -> anyhow::Result<u64>;
}

/// Heap snapshot capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSettings {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// Diagnostic document written by [`ActionExecutor::create_heap_snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapSnapshot {
    pub path: PathBuf,
    pub reason: String,
    pub taken_at: DateTime<Utc>,
    pub sample: MemorySample,
    pub smaps_rollup: Option<SmapsRollup>,
}

/// Collection statistics exposed in the health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GcStats {
    pub collector: String,
    pub available: bool,
    /// Collections that actually invoked the collector.
    pub collections: u64,
    pub failures: u64,
    /// Requests answered as a no-op because no collector is available.
    pub skipped: u64,
    /// Requests answered with the result of a concurrent run.
    pub coalesced: u64,
    pub total_freed_bytes: u64,
    pub last_collection: Option<DateTime<Utc>>,
    pub duration_ms: StatSnapshot,
}

#[derive(Default)]
struct CollectionStats {
    collections: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    coalesced: AtomicU64,
    freed: AtomicU64,
    last_collection: Mutex<Option<DateTime<Utc>>>,
    duration_ms: Stat,
}

impl CollectionStats {
    fn record(&self, action: &OptimizationAction, skipped: bool) {
        if skipped {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.collections.fetch_add(1, Ordering::Relaxed);
        if !action.success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.freed.fetch_add(action.memory_freed(), Ordering::Relaxed);
        self.duration_ms.add_sample(action.duration_ms);
        if let Ok(mut last) = self.last_collection.lock() {
            *last = Some(Utc::now());
        }
    }

    fn reset(&self) {
        self.collections.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.coalesced.store(0, Ordering::Relaxed);
        self.freed.store(0, Ordering::Relaxed);
        self.duration_ms.reset();
        if let Ok(mut last) = self.last_collection.lock() {
            *last = None;
        }
    }
}

#[derive(Clone)]
enum Completed {
    Collect(OptimizationAction),
    Cleanup(Vec<OptimizationAction>),
}

#[derive(Default)]
struct Gate {
    generation: u64,
    last: Option<Completed>,
}

/// Runs mitigation actions against the injected collector and the registered
/// releasers.
pub struct ActionExecutor {
    sampler: Arc<dyn MemorySampler>,
    collector: Arc<dyn Collector>,
    caches: RwLock<Vec<Arc<dyn MemoryReleaser>>>,
    buffers: RwLock<Vec<Arc<dyn MemoryReleaser>>>,
    snapshots: SnapshotSettings,
    gate: Mutex<Gate>,
    /// Mirror of `Gate::generation`, readable without the lock.
    generation: AtomicU64,
    stats: CollectionStats,
}

impl ActionExecutor {
    pub fn new(
        sampler: Arc<dyn MemorySampler>,
        collector: Arc<dyn Collector>,
        snapshots: SnapshotSettings,
    ) -> Self {
        Self {
            sampler,
            collector,
            caches: RwLock::new(Vec::new()),
            buffers: RwLock::new(Vec::new()),
            snapshots,
            gate: Mutex::new(Gate::default()),
            generation: AtomicU64::new(0),
            stats: CollectionStats::default(),
        }
    }

    /// Registers a cache cleared first during emergency cleanup.
    pub fn register_cache(&self, releaser: Arc<dyn MemoryReleaser>) {
        debug!("Registered cache releaser '{}'", releaser.name());
        self.caches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(releaser);
    }

    /// Registers an optional buffer released last during emergency cleanup.
    pub fn register_buffer(&self, releaser: Arc<dyn MemoryReleaser>) {
        debug!("Registered buffer releaser '{}'", releaser.name());
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(releaser);
    }

    /// Drops all registrations and statistics. Waits for an in-flight
    /// collection or cleanup, so its result is not counted afterwards.
    pub fn reset(&self) {
        let mut gate = self.lock_gate();
        gate.last = None;
        self.stats.reset();
        self.caches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn collector_name(&self) -> &'static str {
        self.collector.name()
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.snapshots.enabled
    }

    pub fn gc_stats(&self) -> GcStats {
        GcStats {
            collector: self.collector.name().to_string(),
            available: self.collector.is_available(),
            collections: self.stats.collections.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
            total_freed_bytes: self.stats.freed.load(Ordering::Relaxed),
            last_collection: self
                .stats
                .last_collection
                .lock()
                .ok()
                .and_then(|last| *last),
            duration_ms: self.stats.duration_ms.snapshot(),
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, gate: &mut Gate, completed: Completed) {
        gate.generation += 1;
        gate.last = Some(completed);
        self.generation.store(gate.generation, Ordering::Release);
    }

    /// Requests one collection. Never fails; problems are recorded on the
    /// returned action. A caller that arrives while another collection is in
    /// flight waits for it and receives its result.
    #[instrument(skip(self))]
    pub fn force_collect(&self, reason: &str) -> OptimizationAction {
        let seen = self.generation.load(Ordering::Acquire);
        let mut gate = self.lock_gate();

        if gate.generation != seen {
            if let Some(Completed::Collect(action)) = &gate.last {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!("Reusing result of concurrent collection");
                return action.clone();
            }
        }

        let action = self.collect_once(reason);
        self.finish(&mut gate, Completed::Collect(action.clone()));
        action
    }

    /// Runs the full cleanup ladder: registered caches, forced collection,
    /// registered buffers. The result always holds a `ForceCollect` action.
    #[instrument(skip(self))]
    pub fn emergency_cleanup(&self) -> Vec<OptimizationAction> {
        let seen = self.generation.load(Ordering::Acquire);
        let mut gate = self.lock_gate();

        if gate.generation != seen {
            if let Some(Completed::Cleanup(actions)) = &gate.last {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!("Reusing result of concurrent emergency cleanup");
                return actions.clone();
            }
        }

        let actions = self.cleanup_sequence();
        self.finish(&mut gate, Completed::Cleanup(actions.clone()));
        actions
    }

    fn cleanup_sequence(&self) -> Vec<OptimizationAction> {
        let start = Instant::now();
        let caches = self
            .caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let buffers = self
            .buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut actions = Vec::with_capacity(caches.len() + buffers.len() + 1);
        for cache in &caches {
            actions.push(self.release(ActionKind::ClearCache, cache.as_ref()));
        }
        actions.push(self.collect_once("emergency cleanup"));
        for buffer in &buffers {
            actions.push(self.release(ActionKind::ReleaseBuffer, buffer.as_ref()));
        }

        let freed: u64 = actions.iter().map(OptimizationAction::memory_freed).sum();
        let failed = actions.iter().filter(|a| !a.success).count();
        info!(
            actions = actions.len(),
            failed,
            memory_freed = freed,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Emergency cleanup finished"
        );
        actions
    }

    fn collect_once(&self, reason: &str) -> OptimizationAction {
        let start = Instant::now();
        let before = self.sampler.capture().heap_used;

        if !self.collector.is_available() {
            let action = OptimizationAction {
                kind: ActionKind::ForceCollect,
                target: None,
                success: true,
                memory_before: before,
                memory_after: before,
                duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                detail: Some("collector unavailable; nothing to collect".into()),
            };
            debug!(reason, "Forced collection skipped, no collector available");
            self.stats.record(&action, true);
            return action;
        }

        let outcome = guarded(|| self.collector.collect());
        let after = self.sampler.capture().heap_used;
        let action = OptimizationAction {
            kind: ActionKind::ForceCollect,
            target: None,
            success: outcome.is_ok(),
            memory_before: before,
            memory_after: after,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            detail: outcome.err(),
        };

        match &action.detail {
            Some(err) => warn!(reason, collector = self.collector.name(), "Forced collection failed: {}", err),
            None => debug!(
                reason,
                collector = self.collector.name(),
                memory_freed = action.memory_freed(),
                "Forced collection completed"
            ),
        }
        self.stats.record(&action, false);
        action
    }

    fn release(&self, kind: ActionKind, releaser: &dyn MemoryReleaser) -> OptimizationAction {
        let start = Instant::now();
        let before = self.sampler.capture().heap_used;
        let outcome = guarded(|| releaser.release());
        let after = self.sampler.capture().heap_used;

        let detail = match &outcome {
            Ok(bytes) => Some(format!("released ~{} bytes", bytes)),
            Err(err) => {
                warn!(step = %kind, releaser = releaser.name(), "Cleanup step failed: {}", err);
                Some(err.clone())
            }
        };

        OptimizationAction {
            kind,
            target: Some(releaser.name().to_string()),
            success: outcome.is_ok(),
            memory_before: before,
            memory_after: after,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            detail,
        }
    }

    /// Writes a diagnostic snapshot document. Fails with
    /// [`MonitorError::SnapshotDisabled`] unless snapshots were explicitly
    /// enabled.
    #[instrument(skip(self))]
    pub fn create_heap_snapshot(&self, reason: &str) -> Result<HeapSnapshot, MonitorError> {
        if !self.snapshots.enabled {
            warn!("Heap snapshot requested while disabled");
            return Err(MonitorError::SnapshotDisabled);
        }

        let sample = self.sampler.capture();
        let smaps_rollup = match system::read_self_smaps_rollup() {
            Ok(rollup) => Some(rollup),
            Err(e) => {
                debug!("smaps_rollup unavailable for snapshot: {}", e);
                None
            }
        };

        let dir = &self.snapshots.dir;
        fs::create_dir_all(dir).map_err(|source| MonitorError::SnapshotIo {
            path: dir.clone(),
            source,
        })?;

        let taken_at = Utc::now();
        let path = dir.join(format!(
            "heap-snapshot-{}-{}.json",
            taken_at.format("%Y%m%dT%H%M%S%.3fZ"),
            sanitize_reason(reason)
        ));
        let snapshot = HeapSnapshot {
            path: path.clone(),
            reason: reason.to_string(),
            taken_at,
            sample,
            smaps_rollup,
        };

        let body = serde_json::to_vec_pretty(&snapshot)?;
        fs::write(&path, body).map_err(|source| MonitorError::SnapshotIo {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "Heap snapshot written");
        Ok(snapshot)
    }
}

/// Keeps file names predictable: ascii alphanumerics and '-', at most 32
/// characters.
fn sanitize_reason(reason: &str) -> String {
    let cleaned: String = reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .take(32)
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "manual".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Runs `f`, turning both errors and panics into a message.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::NullCollector;
    use crate::sample::ReplaySampler;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    fn fixed_sampler(heap_used: u64) -> Arc<dyn MemorySampler> {
        Arc::new(ReplaySampler::new(vec![MemorySample::new(
            heap_used,
            1024 * MB,
            heap_used,
            0,
            Utc::now(),
        )]))
    }

    fn disabled_snapshots() -> SnapshotSettings {
        SnapshotSettings {
            enabled: false,
            dir: PathBuf::from("/nonexistent"),
        }
    }

    struct FailingCollector;

    impl Collector for FailingCollector {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn collect(&self) -> anyhow::Result<()> {
            anyhow::bail!("collector exploded")
        }
    }

    struct PanickingCollector;

    impl Collector for PanickingCollector {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn collect(&self) -> anyhow::Result<()> {
            panic!("collector panicked")
        }
    }

    /// Tracks how many collections run at once.
    #[derive(Default)]
    struct SlowCollector {
        running: AtomicUsize,
        max_running: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Collector for SlowCollector {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn collect(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Blocks inside `collect` until released.
    struct BlockingCollector {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        calls: AtomicUsize,
    }

    impl Collector for BlockingCollector {
        fn name(&self) -> &'static str {
            "blocking"
        }
        fn collect(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.lock().unwrap().send(()).ok();
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .ok();
            Ok(())
        }
    }

    struct Releaser {
        name: &'static str,
        fail: bool,
    }

    impl MemoryReleaser for Releaser {
        fn name(&self) -> &str {
            self.name
        }
        fn release(&self) -> anyhow::Result<u64> {
            if self.fail {
                anyhow::bail!("{} refused", self.name)
            }
            Ok(4096)
        }
    }

    #[test]
    fn test_absent_collector_is_a_successful_noop() {
        let exec = ActionExecutor::new(
            fixed_sampler(100 * MB),
            Arc::new(NullCollector),
            disabled_snapshots(),
        );
        let action = exec.force_collect("test");
        assert_eq!(action.kind, ActionKind::ForceCollect);
        assert!(action.success);
        assert_eq!(action.memory_freed(), 0);

        let stats = exec.gc_stats();
        assert!(!stats.available);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.collections, 0);
    }

    #[test]
    fn test_failing_and_panicking_collectors_are_absorbed() {
        for collector in [
            Arc::new(FailingCollector) as Arc<dyn Collector>,
            Arc::new(PanickingCollector),
        ] {
            let exec =
                ActionExecutor::new(fixed_sampler(100 * MB), collector, disabled_snapshots());
            let action = exec.force_collect("test");
            assert!(!action.success);
            assert!(action.detail.is_some());
            assert_eq!(exec.gc_stats().failures, 1);
        }
    }

    #[test]
    fn test_memory_freed_measured_from_samples() {
        let now = Utc::now();
        let sampler = Arc::new(ReplaySampler::new(vec![
            MemorySample::new(0, 1024 * MB, 300 * MB, 0, now),
            MemorySample::new(0, 1024 * MB, 200 * MB, 0, now),
        ]));
        let exec = ActionExecutor::new(sampler, Arc::new(SlowCollector::default()), disabled_snapshots());
        let action = exec.force_collect("test");
        assert!(action.success);
        assert_eq!(action.memory_freed(), 100 * MB);
        assert_eq!(exec.gc_stats().total_freed_bytes, 100 * MB);
    }

    #[test]
    fn test_emergency_cleanup_runs_every_step_in_order() {
        let exec = ActionExecutor::new(
            fixed_sampler(100 * MB),
            Arc::new(NullCollector),
            disabled_snapshots(),
        );
        exec.register_cache(Arc::new(Releaser { name: "sessions", fail: false }));
        exec.register_buffer(Arc::new(Releaser { name: "upload-pool", fail: false }));

        let actions = exec.emergency_cleanup();
        let kinds: Vec<ActionKind> = actions.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::ClearCache, ActionKind::ForceCollect, ActionKind::ReleaseBuffer]
        );
        assert!(actions.iter().all(|a| a.success));
        assert_eq!(actions[0].target.as_deref(), Some("sessions"));
    }

    #[test]
    fn test_emergency_cleanup_survives_every_step_failing() {
        let exec = ActionExecutor::new(
            fixed_sampler(100 * MB),
            Arc::new(PanickingCollector),
            disabled_snapshots(),
        );
        exec.register_cache(Arc::new(Releaser { name: "a", fail: true }));
        exec.register_cache(Arc::new(Releaser { name: "b", fail: true }));
        exec.register_buffer(Arc::new(Releaser { name: "c", fail: true }));

        let actions = exec.emergency_cleanup();
        assert_eq!(actions.len(), 4);
        assert!(actions.iter().all(|a| !a.success));
        assert!(actions.iter().any(|a| a.kind == ActionKind::ForceCollect));
    }

    #[test]
    fn test_emergency_cleanup_without_registrations_still_collects() {
        let exec = ActionExecutor::new(
            fixed_sampler(100 * MB),
            Arc::new(NullCollector),
            disabled_snapshots(),
        );
        let actions = exec.emergency_cleanup();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::ForceCollect);
    }

    #[test]
    fn test_concurrent_collections_never_overlap() {
        let collector = Arc::new(SlowCollector::default());
        let exec = Arc::new(ActionExecutor::new(
            fixed_sampler(100 * MB),
            collector.clone(),
            disabled_snapshots(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let exec = exec.clone();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        vec![exec.force_collect("concurrent")]
                    } else {
                        exec.emergency_cleanup()
                    }
                })
            })
            .collect();
        for h in handles {
            let actions = h.join().unwrap();
            assert!(!actions.is_empty());
        }

        assert_eq!(collector.max_running.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waiting_caller_reuses_in_flight_result() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let collector = Arc::new(BlockingCollector {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
            calls: AtomicUsize::new(0),
        });
        let exec = Arc::new(ActionExecutor::new(
            fixed_sampler(100 * MB),
            collector.clone(),
            disabled_snapshots(),
        ));

        let first = {
            let exec = exec.clone();
            thread::spawn(move || exec.force_collect("first"))
        };
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let second = {
            let exec = exec.clone();
            thread::spawn(move || exec.force_collect("second"))
        };
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        let a = first.join().unwrap();
        let b = second.join().unwrap();
        assert_eq!(a, b);
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exec.gc_stats().coalesced, 1);
    }

    #[test]
    fn test_sequential_calls_do_not_reuse() {
        let collector = Arc::new(SlowCollector::default());
        let exec = ActionExecutor::new(fixed_sampler(100 * MB), collector.clone(), disabled_snapshots());
        exec.force_collect("one");
        exec.force_collect("two");
        assert_eq!(collector.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_heap_snapshot_fails_when_disabled() {
        let exec = ActionExecutor::new(
            fixed_sampler(100 * MB),
            Arc::new(NullCollector),
            disabled_snapshots(),
        );
        assert!(matches!(
            exec.create_heap_snapshot("test"),
            Err(MonitorError::SnapshotDisabled)
        ));
    }

    #[test]
    fn test_heap_snapshot_written_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ActionExecutor::new(
            fixed_sampler(100 * MB),
            Arc::new(NullCollector),
            SnapshotSettings {
                enabled: true,
                dir: dir.path().to_path_buf(),
            },
        );
        let snapshot = exec.create_heap_snapshot("Operator Request!").unwrap();
        assert!(snapshot.path.exists());
        assert!(snapshot
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("operator-request.json"));

        let body = std::fs::read_to_string(&snapshot.path).unwrap();
        let parsed: HeapSnapshot = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.sample.heap_used, 100 * MB);
    }

    #[test]
    fn test_reset_drops_registrations() {
        let exec = ActionExecutor::new(
            fixed_sampler(100 * MB),
            Arc::new(NullCollector),
            disabled_snapshots(),
        );
        exec.register_cache(Arc::new(Releaser { name: "a", fail: false }));
        exec.force_collect("x");
        exec.reset();
        assert_eq!(exec.emergency_cleanup().len(), 1);
        assert_eq!(exec.gc_stats().skipped, 1);
    }
}
