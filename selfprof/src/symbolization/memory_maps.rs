//! Memory mapping utilities for the process's own address space
//!
//! Parses `/proc/self/maps` to find where the running executable is mapped,
//! which is needed to rebase sampled addresses of PIE executables.

use anyhow::{Context, Result};
use log::info;
use std::fs;

/// Memory range of a loaded binary in the process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// Find the memory range of `binary_path` in `/proc/self/maps`
///
/// # Errors
/// Returns an error if the maps file cannot be read or the binary is not mapped
pub fn parse_memory_maps(binary_path: &str) -> Result<MemoryRange> {
    let maps_path = "/proc/self/maps";
    let maps = fs::read_to_string(maps_path).context(format!("Failed to read {maps_path}"))?;

    let range = find_binary_range(&maps, binary_path)
        .with_context(|| format!("Could not find memory range for {binary_path}"))?;
    info!(
        "Executable memory range: 0x{:x} - 0x{:x} (size: {} KB)",
        range.start,
        range.end,
        (range.end - range.start) / 1024
    );
    Ok(range)
}

/// Span from the lowest start to the highest end of all mappings of `binary_path`
///
/// Lines look like `start-end perms offset dev inode pathname`; only lines
/// whose pathname is exactly `binary_path` count.
#[must_use]
pub fn find_binary_range(maps: &str, binary_path: &str) -> Option<MemoryRange> {
    let mut range: Option<MemoryRange> = None;

    for line in maps.lines() {
        let mut parts = line.split_whitespace();
        let Some((start, end)) = parts.next().and_then(|r| r.split_once('-')) else {
            continue;
        };
        if parts.nth(4) != Some(binary_path) {
            continue;
        }
        let (Ok(start), Ok(end)) = (u64::from_str_radix(start, 16), u64::from_str_radix(end, 16))
        else {
            continue;
        };

        range = Some(match range {
            Some(r) => MemoryRange {
                start: r.start.min(start),
                end: r.end.max(end),
            },
            None => MemoryRange { start, end },
        });
    }

    range
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
5581a0000000-5581a0004000 r--p 00000000 08:01 1234 /usr/bin/app
5581a0004000-5581a0010000 r-xp 00004000 08:01 1234 /usr/bin/app
5581a0010000-5581a0012000 rw-p 00010000 08:01 1234 /usr/bin/app
7f1234000000-7f1234100000 r-xp 00000000 08:01 99 /usr/lib/libc.so.6
7f1234200000-7f1234201000 r-xp 00000000 08:01 77 /usr/bin/app-helper
7ffd12300000-7ffd12321000 r-xp 00000000 00:00 0 [vdso]
garbage";

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange {
            start: 0x1000,
            end: 0x2000,
        };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
    }

    #[test]
    fn test_range_spans_all_mappings_of_binary() {
        let range = find_binary_range(MAPS, "/usr/bin/app").unwrap();
        assert_eq!(
            range,
            MemoryRange {
                start: 0x5581_a000_0000,
                end: 0x5581_a001_2000,
            }
        );
    }

    #[test]
    fn test_prefix_of_other_path_does_not_match() {
        let range = find_binary_range(MAPS, "/usr/bin/app").unwrap();
        assert!(!range.contains(0x7f12_3420_0000));
    }

    #[test]
    fn test_unmapped_binary() {
        assert!(find_binary_range(MAPS, "/usr/bin/missing").is_none());
        assert!(find_binary_range("", "/usr/bin/app").is_none());
    }

    #[test]
    fn test_parse_memory_maps_self() {
        let exe = std::env::current_exe().expect("Failed to get current exe");
        let exe_path = exe.to_str().expect("Failed to convert exe path to string");

        let range = parse_memory_maps(exe_path).expect("test binary should be mapped");
        let here = test_parse_memory_maps_self as usize as u64;
        assert!(range.contains(here));
    }
}
