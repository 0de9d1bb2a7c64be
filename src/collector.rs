//! Forced-collection capability.
//!
//! The monitor never checks for collection support inline. It is handed a
//! [`Collector`] and, when the platform has nothing to offer, a
//! [`NullCollector`] that reports itself unavailable.

use std::sync::Arc;
use tracing::{debug, warn};

/// A way to ask the allocator/runtime to give memory back.
pub trait Collector: Send + Sync {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Whether `collect` does anything at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Performs one collection pass.
    fn collect(&self) -> anyhow::Result<()>;
}

/// Stand-in when no collection capability exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCollector;

impl Collector for NullCollector {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn collect(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Returns free heap pages to the OS through glibc's `malloc_trim(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MallocTrimCollector;

impl MallocTrimCollector {
    /// True when the running platform provides `malloc_trim`.
    pub const fn supported() -> bool {
        cfg!(all(target_os = "linux", target_env = "gnu"))
    }
}

impl Collector for MallocTrimCollector {
    fn name(&self) -> &'static str {
        "malloc-trim"
    }

    fn is_available(&self) -> bool {
        Self::supported()
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn collect(&self) -> anyhow::Result<()> {
        // SAFETY: malloc_trim only walks the allocator's own arenas.
        let released = unsafe { libc::malloc_trim(0) };
        debug!("malloc_trim(0) returned {}", released);
        Ok(())
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn collect(&self) -> anyhow::Result<()> {
        anyhow::bail!("malloc_trim is not available on this platform")
    }
}

/// Builds the collector named in the configuration ("auto", "malloc-trim",
/// "none").
pub fn collector_from_config(mode: Option<&str>) -> Arc<dyn Collector> {
    match mode.unwrap_or("auto") {
        "none" => Arc::new(NullCollector),
        "malloc-trim" => {
            if !MallocTrimCollector::supported() {
                warn!("malloc-trim collector requested but unsupported here; collections will fail");
            }
            Arc::new(MallocTrimCollector)
        }
        _ => {
            if MallocTrimCollector::supported() {
                Arc::new(MallocTrimCollector)
            } else {
                debug!("No collection capability on this platform, using null collector");
                Arc::new(NullCollector)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_collector_is_unavailable_noop() {
        let c = NullCollector;
        assert!(!c.is_available());
        assert!(c.collect().is_ok());
    }

    #[test]
    fn test_collector_from_config() {
        assert_eq!(collector_from_config(Some("none")).name(), "none");
        let auto = collector_from_config(None);
        assert_eq!(auto.is_available(), MallocTrimCollector::supported());
        if MallocTrimCollector::supported() {
            assert!(MallocTrimCollector.collect().is_ok());
        }
    }
}
