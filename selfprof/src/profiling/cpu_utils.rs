//! CPU utility functions
//!
//! The perf backend opens one event per online CPU, so it needs the list of
//! CPUs the kernel currently schedules on.

use anyhow::{bail, Context, Result};
use std::fs;

use crate::domain::CpuId;

const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns an error if the file cannot be read or does not parse
pub fn online_cpus() -> Result<Vec<CpuId>> {
    let content = fs::read_to_string(ONLINE_CPUS_PATH)
        .with_context(|| format!("Failed to read {ONLINE_CPUS_PATH}"))?;
    parse_cpu_list(&content).with_context(|| format!("Malformed CPU list in {ONLINE_CPUS_PATH}"))
}

/// Parse the kernel's CPU list format: `0-3`, `0,2,4` or `0-3,8-11`
///
/// # Errors
/// Returns an error for empty input, non-numeric entries or reversed ranges
pub fn parse_cpu_list(list: &str) -> Result<Vec<CpuId>> {
    let list = list.trim();
    if list.is_empty() {
        bail!("empty CPU list");
    }

    let mut cpus = Vec::new();
    for entry in list.split(',') {
        let (start, end) = match entry.split_once('-') {
            Some((start, end)) => (start.parse::<u32>()?, end.parse::<u32>()?),
            None => {
                let cpu = entry.parse::<u32>()?;
                (cpu, cpu)
            }
        };
        if start > end {
            bail!("reversed CPU range '{entry}'");
        }
        cpus.extend((start..=end).map(CpuId));
    }

    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}
