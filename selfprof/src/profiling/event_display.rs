// Percentages intentionally lose precision for display purposes
#![allow(clippy::cast_precision_loss)]

use std::io::Write;

use super::dispatcher::DispatchStats;
use crate::analysis::{FunctionHotspot, HotPath};

/// Display dispatch statistics
pub fn display_statistics(stats: &DispatchStats) {
    eprintln!(
        "stats: records={} accepted={} foreign={} filtered={} empty={} lost={} unresolved={}",
        stats.records_seen,
        stats.samples_accepted,
        stats.foreign_process,
        stats.filtered_out,
        stats.empty_samples,
        stats.lost_records,
        stats.unresolved_frames,
    );
}

/// Display the run's outcome: sample count and whether anything was aggregated
pub fn display_summary(samples: u64, has_entries: bool) {
    println!("Samples collected: {samples}");
    println!("Call tree has entries: {}", if has_entries { "yes" } else { "no" });
}

/// Display the hottest functions by self time
pub fn display_hotspots(hotspots: &[FunctionHotspot]) {
    if hotspots.is_empty() {
        return;
    }
    println!("\nHot functions:");
    println!("  {:>7} {:>7}  function", "self", "total");
    for h in hotspots {
        println!(
            "  {:>6.1}% {:>6.1}%  {}",
            h.self_percentage, h.inclusive_percentage, h.name
        );
    }
}

/// Display the heaviest call paths, outermost frame first
pub fn display_hot_paths(paths: &[HotPath]) {
    if paths.is_empty() {
        return;
    }
    println!("\nHeaviest paths:");
    for path in paths {
        println!("  {:>6.1}% ({})  {}", path.percentage, path.hits, path.frames.join(" > "));
    }
}

/// Display progress for a timed run
pub fn display_progress(elapsed_secs: u64, duration: u64) {
    let remaining_secs = duration.saturating_sub(elapsed_secs);
    eprint!("\r   Progress: {elapsed_secs}s / {duration}s ({remaining_secs}s remaining)   ");
    std::io::stderr().flush().ok();
}

/// Share of `part` in `total`, in percent
#[must_use]
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
