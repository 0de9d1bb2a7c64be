//! Check command implementation.

use herakles_mem_health::{
    collector::collector_from_config, config::validate_effective_config, report::format_bytes,
    system, Config,
};

/// Validates configuration and system requirements. Returns whether every
/// check passed.
pub fn command_check(config: &Config) -> bool {
    println!("🔍 Herakles Memory Health Monitor - System Check");
    println!("================================================");

    let mut all_ok = true;

    println!("\n📁 Checking /proc/self/status...");
    match system::read_self_status() {
        Ok(status) => {
            println!(
                "   ✅ Readable: VmRSS={}, RssAnon={}, RssFile={}, RssShmem={}",
                format_bytes(status.vm_rss),
                format_bytes(status.rss_anon),
                format_bytes(status.rss_file),
                format_bytes(status.rss_shmem)
            );
        }
        Err(e) => {
            println!("   ❌ Cannot read process status: {}", e);
            all_ok = false;
        }
    }

    println!("\n💾 Checking memory budget...");
    match config.memory_limit_bytes {
        Some(limit) => println!("   ✅ Configured limit: {}", format_bytes(limit)),
        None => match system::read_cgroup_memory_limit() {
            Some(limit) => println!("   ✅ cgroup v2 memory.max: {}", format_bytes(limit)),
            None => match system::read_mem_total() {
                Ok(total) => println!("   ✅ No cgroup limit, using MemTotal: {}", format_bytes(total)),
                Err(e) => {
                    println!("   ❌ No memory budget available: {}", e);
                    all_ok = false;
                }
            },
        },
    }

    match system::read_self_smaps_rollup() {
        Ok(_) => println!("   ✅ smaps_rollup available for heap snapshots"),
        Err(e) => println!("   ⚠️  smaps_rollup unavailable, snapshots will omit it: {}", e),
    }

    println!("\n♻️  Checking collector...");
    let collector = collector_from_config(config.collector.as_deref());
    if collector.is_available() {
        println!("   ✅ Collector '{}' available", collector.name());
    } else {
        println!(
            "   ⚠️  Collector '{}' unavailable, forced collections will be no-ops",
            collector.name()
        );
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(()) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
    } else {
        println!("   ❌ Some checks failed - please review warnings");
    }
    all_ok
}
