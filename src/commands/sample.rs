//! Sample command implementation.
//!
//! Runs the monitor's tick by hand a few times and prints the resulting
//! report, without starting the periodic loop or the HTTP server.

use herakles_mem_health::MemoryMonitor;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::cli::ConfigFormat;
use crate::commands::render;

/// Captures `count` samples `delay` apart and prints the health report.
pub fn command_sample(
    monitor: &MemoryMonitor,
    count: usize,
    delay: Duration,
    format: ConfigFormat,
) -> anyhow::Result<()> {
    for i in 0..count {
        if i > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        monitor.tick();
        debug!("Captured sample {}/{}", i + 1, count);
    }

    let report = monitor.report();
    println!("{}", render(&report, format)?);
    Ok(())
}
