//! Live sampling through perf_event_open. Skipped where perf is unavailable.

mod common;

use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use selfprof::profiling::Profiler;
use selfprof::symbolization::ElfSymbolizer;
use selfprof::trace::{PerfProvider, SessionConfig};

#[inline(never)]
fn burn_cpu(stop: &AtomicBool) {
    let mut sum = 0u64;
    let mut i = 0u64;
    while !stop.load(Ordering::Relaxed) {
        sum = sum.wrapping_add(i);
        black_box(sum);
        i += 1;
    }
}

#[test]
fn test_samples_spawned_threads() {
    if common::is_ci() {
        return;
    }
    let resolver = ElfSymbolizer::for_current_process().expect("test binary should be readable");
    let profiler = require_profiler!(Profiler::start(
        PerfProvider::new(),
        "live-perf",
        &SessionConfig::default(),
        resolver,
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let stop = Arc::clone(&stop);
            thread::spawn(move || burn_cpu(&stop))
        })
        .collect();

    thread::sleep(Duration::from_millis(300));
    let run = profiler.finish().expect("run should finish");
    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }

    assert!(run.aggregator.sample_count() > 0, "expected samples, stats: {:?}", run.stats);
    assert!(run.aggregator.has_entries());

    let tree = run.aggregator.snapshot();
    let hot = selfprof::analysis::analyze_hotspots(&tree);
    assert!(
        hot.iter().take(5).any(|h| h.name.contains("burn_cpu")),
        "burn_cpu not among hottest functions: {:?}",
        hot.iter().take(5).map(|h| &h.name).collect::<Vec<_>>()
    );
}

#[test]
fn test_live_session_stops_promptly() {
    if common::is_ci() {
        return;
    }
    let resolver = ElfSymbolizer::for_current_process().expect("test binary should be readable");
    let profiler = require_profiler!(Profiler::start(
        PerfProvider::new(),
        "live-stop",
        &SessionConfig::default(),
        resolver,
    ));

    let started = std::time::Instant::now();
    let run = profiler.finish().expect("run should finish");
    assert!(run.stop_error.is_none());
    // One poll interval plus a final drain
    assert!(started.elapsed() < Duration::from_secs(2));
}
