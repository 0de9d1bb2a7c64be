//! Memory counters read from the /proc filesystem.
//!
//! This module reads the current process' memory counters from
//! `/proc/self/status` and `/proc/self/smaps_rollup`, the system memory size
//! from `/proc/meminfo` and the cgroup v2 memory limit. Parsing is split into
//! pure helpers so it can be tested without a live /proc.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Values at or above this are treated as "no limit" (1 EiB).
const UNLIMITED_THRESHOLD_BYTES: u64 = 1 << 60;

/// Read buffer for smaps_rollup.
const SMAPS_ROLLUP_BUFFER_KB: usize = 16;

/// Resident memory counters of the current process in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStatus {
    pub vm_rss: u64,
    pub rss_anon: u64,
    pub rss_file: u64,
    pub rss_shmem: u64,
    pub vm_swap: u64,
}

/// Summary of `/proc/self/smaps_rollup` in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmapsRollup {
    pub rss: u64,
    pub pss: u64,
    pub shared_clean: u64,
    pub shared_dirty: u64,
    pub private_clean: u64,
    pub private_dirty: u64,
    pub anonymous: u64,
    pub swap: u64,
}

/// Parses a "<value> kB" field into bytes.
fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace()
        .next()
        .and_then(|x| x.parse::<u64>().ok())
        .map(|kb| kb.saturating_mul(1024))
}

/// Parses the content of `/proc/<pid>/status`.
///
/// `VmRSS` is required; the split counters (`RssAnon`, `RssFile`, `RssShmem`)
/// only exist on kernels >= 4.5 and default to zero.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, String> {
    let mut status = ProcStatus::default();
    let mut saw_rss = false;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some(bytes) = parse_kb_value(value) else {
            continue;
        };
        match key.trim() {
            "VmRSS" => {
                status.vm_rss = bytes;
                saw_rss = true;
            }
            "RssAnon" => status.rss_anon = bytes,
            "RssFile" => status.rss_file = bytes,
            "RssShmem" => status.rss_shmem = bytes,
            "VmSwap" => status.vm_swap = bytes,
            _ => {}
        }
    }

    if !saw_rss {
        return Err("VmRSS not found in status".to_string());
    }

    // Old kernels: treat the whole RSS as anonymous.
    if status.rss_anon == 0 && status.rss_file == 0 && status.rss_shmem == 0 {
        status.rss_anon = status.vm_rss;
    }

    Ok(status)
}

/// Reads `/proc/self/status`.
pub fn read_self_status() -> Result<ProcStatus, String> {
    let content = fs::read_to_string("/proc/self/status")
        .map_err(|e| format!("Failed to read /proc/self/status: {}", e))?;
    parse_proc_status(&content)
}

/// Parses `MemTotal` out of `/proc/meminfo` content.
pub fn parse_mem_total(content: &str) -> Result<u64, String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:").and_then(parse_kb_value))
        .ok_or_else(|| "Failed to parse MemTotal from /proc/meminfo".to_string())
}

/// Reads total system RAM in bytes.
pub fn read_mem_total() -> Result<u64, String> {
    let content = fs::read_to_string("/proc/meminfo")
        .map_err(|e| format!("Failed to read /proc/meminfo: {}", e))?;
    parse_mem_total(&content)
}

/// Extracts the cgroup v2 path (`0::/path`) from `/proc/self/cgroup` content.
pub fn parse_cgroup_v2_path(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let path = line.trim().strip_prefix("0::")?;
        (!path.is_empty()).then(|| path.to_string())
    })
}

/// Parses a cgroup `memory.max` value. Returns `None` for "max" or absurdly
/// large values.
pub fn parse_cgroup_limit(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "max" {
        return None;
    }
    raw.parse::<u64>()
        .ok()
        .filter(|v| *v > 0 && *v < UNLIMITED_THRESHOLD_BYTES)
}

/// Reads the cgroup v2 memory limit of the current process, if any.
pub fn read_cgroup_memory_limit() -> Option<u64> {
    let cgroup = fs::read_to_string("/proc/self/cgroup").ok()?;
    let rel = parse_cgroup_v2_path(&cgroup)?;
    let path = Path::new("/sys/fs/cgroup")
        .join(rel.trim_start_matches('/'))
        .join("memory.max");
    match fs::read_to_string(&path) {
        Ok(raw) => parse_cgroup_limit(&raw),
        Err(e) => {
            debug!("No cgroup memory limit at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolves the memory budget used as the denominator of usage percentage.
///
/// Precedence: configured limit > cgroup v2 limit > MemTotal. Returns 0 when
/// nothing can be determined.
pub fn resolve_memory_budget(configured: Option<u64>) -> u64 {
    if let Some(limit) = configured.filter(|v| *v > 0) {
        return limit;
    }
    if let Some(limit) = read_cgroup_memory_limit() {
        debug!("Using cgroup memory limit {} bytes as budget", limit);
        return limit;
    }
    match read_mem_total() {
        Ok(total) => total,
        Err(e) => {
            debug!("Could not determine memory budget: {}", e);
            0
        }
    }
}

/// Parses smaps_rollup lines from any reader.
pub fn parse_smaps_rollup<R: BufRead>(reader: R) -> Result<SmapsRollup, std::io::Error> {
    let mut out = SmapsRollup::default();
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some(bytes) = parse_kb_value(value) else {
            continue;
        };
        match key.trim() {
            "Rss" => out.rss = bytes,
            "Pss" => out.pss = bytes,
            "Shared_Clean" => out.shared_clean = bytes,
            "Shared_Dirty" => out.shared_dirty = bytes,
            "Private_Clean" => out.private_clean = bytes,
            "Private_Dirty" => out.private_dirty = bytes,
            "Anonymous" => out.anonymous = bytes,
            "Swap" => out.swap = bytes,
            _ => {}
        }
    }
    Ok(out)
}

/// Reads `/proc/self/smaps_rollup`.
pub fn read_self_smaps_rollup() -> Result<SmapsRollup, std::io::Error> {
    let file = fs::File::open("/proc/self/smaps_rollup")?;
    let reader = BufReader::with_capacity(SMAPS_ROLLUP_BUFFER_KB * 1024, file);
    parse_smaps_rollup(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Name:\tcat\nVmPeak:\t    8000 kB\nVmRSS:\t    2048 kB\nRssAnon:\t     512 kB\nRssFile:\t    1400 kB\nRssShmem:\t     136 kB\nVmSwap:\t       0 kB\n";

    #[test]
    fn test_parse_proc_status() {
        let status = parse_proc_status(STATUS).unwrap();
        assert_eq!(status.vm_rss, 2048 * 1024);
        assert_eq!(status.rss_anon, 512 * 1024);
        assert_eq!(status.rss_file, 1400 * 1024);
        assert_eq!(status.rss_shmem, 136 * 1024);
    }

    #[test]
    fn test_parse_proc_status_old_kernel_falls_back_to_rss() {
        let status = parse_proc_status("VmRSS:\t 4096 kB\n").unwrap();
        assert_eq!(status.rss_anon, 4096 * 1024);
    }

    #[test]
    fn test_parse_proc_status_missing_rss() {
        assert!(parse_proc_status("Name:\tcat\n").is_err());
    }

    #[test]
    fn test_parse_mem_total() {
        let meminfo = "MemTotal:       16384000 kB\nMemFree:        8192000 kB\n";
        assert_eq!(parse_mem_total(meminfo).unwrap(), 16384000 * 1024);
        assert!(parse_mem_total("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_cgroup() {
        assert_eq!(
            parse_cgroup_v2_path("0::/system.slice/app.service\n"),
            Some("/system.slice/app.service".to_string())
        );
        assert_eq!(parse_cgroup_v2_path("5:memory:/foo\n"), None);
        assert_eq!(parse_cgroup_limit("max\n"), None);
        assert_eq!(parse_cgroup_limit("536870912\n"), Some(536870912));
        assert_eq!(parse_cgroup_limit("9223372036854771712"), None);
    }

    #[test]
    fn test_configured_budget_wins() {
        assert_eq!(resolve_memory_budget(Some(1024)), 1024);
    }

    #[test]
    fn test_parse_smaps_rollup() {
        let content = "00400000-7fff [rollup]\nRss:                2000 kB\nPss:                1500 kB\nPrivate_Dirty:       700 kB\nAnonymous:           800 kB\nSwap:                  0 kB\n";
        let rollup = parse_smaps_rollup(content.as_bytes()).unwrap();
        assert_eq!(rollup.rss, 2000 * 1024);
        assert_eq!(rollup.pss, 1500 * 1024);
        assert_eq!(rollup.private_dirty, 700 * 1024);
        assert_eq!(rollup.anonymous, 800 * 1024);
    }
}
