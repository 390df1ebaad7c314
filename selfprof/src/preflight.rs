//! Pre-flight checks for selfprof
//!
//! Validates system requirements before opening perf events.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use object::{Object, ObjectSection};
use std::path::Path;

use crate::trace::perf::paranoid_level;

/// Highest `perf_event_paranoid` that still allows unprivileged user-space sampling
const MAX_UNPRIVILEGED_PARANOID: i32 = 2;

/// How much symbol information a binary carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugInfo {
    /// `.debug_info` present: full DWARF symbolization
    Dwarf,
    /// Only `.symtab`: function names without inlining
    SymbolTable,
    /// Neither: every frame resolves to the placeholder
    Stripped,
}

/// Run all pre-flight checks before a live session
///
/// # Errors
/// Sampling is not permitted, or the running executable cannot be inspected
pub fn run_preflight_checks(quiet: bool) -> Result<()> {
    check_perf_access()?;
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    check_debug_symbols(&exe, quiet)?;
    Ok(())
}

/// Check whether this process may open user-space sampling events on itself
fn check_perf_access() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    match paranoid_level() {
        None => bail!(
            "perf events are not available: /proc/sys/kernel/perf_event_paranoid is missing.\n\n\
             The kernel was probably built without CONFIG_PERF_EVENTS."
        ),
        Some(level) if level > MAX_UNPRIVILEGED_PARANOID => bail!(
            "Permission denied: kernel.perf_event_paranoid is {level}, \
             selfprof needs {MAX_UNPRIVILEGED_PARANOID} or lower.\n\n\
             Run with: sudo sysctl kernel.perf_event_paranoid={MAX_UNPRIVILEGED_PARANOID}\n\
             or run selfprof as root"
        ),
        Some(_) => Ok(()),
    }
}

/// Classify the symbol information present in `path`
///
/// # Errors
/// Returns an error if the file cannot be read or is not an object file
pub fn debug_info_of(path: &Path) -> Result<DebugInfo> {
    let file_data = std::fs::read(path)
        .with_context(|| format!("Failed to read binary: {}", path.display()))?;
    let obj = object::File::parse(&*file_data)
        .with_context(|| format!("Not an object file: {}", path.display()))?;

    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    Ok(match (has_debug_info, has_symtab) {
        (true, _) => DebugInfo::Dwarf,
        (false, true) => DebugInfo::SymbolTable,
        (false, false) => DebugInfo::Stripped,
    })
}

/// Warn when the binary cannot be symbolized well
fn check_debug_symbols(path: &Path, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }

    match debug_info_of(path)? {
        DebugInfo::Dwarf => {}
        DebugInfo::SymbolTable => {
            eprintln!("warning: no DWARF debug info, inlined frames will be attributed to callers");
        }
        DebugInfo::Stripped => {
            eprintln!("warning: binary stripped, every frame will show as <unknown>");
        }
    }
    Ok(())
}
