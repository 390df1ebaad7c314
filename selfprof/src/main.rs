//! # selfprof - Main Entry Point
//!
//! Brackets a timed run: start the session, start the load workers, wait for
//! the duration (or Ctrl+C), stop the load workers, stop the session, join the
//! consumer, report. The stop and joins block, so they run on the blocking pool.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::time::{Duration, Instant};

use selfprof::analysis::{analyze_hotspots, heaviest_paths};
use selfprof::cli::Args;
use selfprof::domain::{Pid, SessionError, StartFailure, Tid};
use selfprof::export::CallTreeReport;
use selfprof::load::BusyWorkers;
use selfprof::preflight::run_preflight_checks;
use selfprof::profiling::{
    display_hot_paths, display_hotspots, display_progress, display_statistics, display_summary,
    Profiler,
};
use selfprof::symbolization::{ElfSymbolizer, StaticResolver};
use selfprof::trace::{PerfProvider, RawRecord, ScriptedProvider, TraceProvider};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

const SESSION_NAME: &str = "selfprof";

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let denied = matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::StartFailed {
            reason: StartFailure::PermissionDenied(_),
            ..
        })
    );
    if denied || err.to_string().to_lowercase().contains("permission denied") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.session_config();
    config.validate()?;

    if args.synthetic {
        let (provider, resolver) = synthetic_session(Pid::current());
        let profiler = Profiler::start(provider, SESSION_NAME, &config, resolver)?;
        return profile(&args, profiler, 0).await;
    }

    run_preflight_checks(args.quiet)?;
    let resolver =
        ElfSymbolizer::for_current_process().context("Failed to initialize symbolizer")?;
    let profiler = Profiler::start(PerfProvider::new(), SESSION_NAME, &config, resolver)?;
    info!("Sampling at {} Hz for {}s", config.frequency_hz, args.duration);
    profile(&args, profiler, args.workers).await
}

/// Wait out the run with `workers` load threads, then stop and report
async fn profile<P>(args: &Args, profiler: Profiler<P>, workers: usize) -> Result<()>
where
    P: TraceProvider + 'static,
{
    // Started after the session so inherited events cover them
    let load = BusyWorkers::spawn(workers)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let limit = Duration::from_secs(args.duration);
    let mut exit_reason = "duration limit reached";

    loop {
        let elapsed = started.elapsed();
        if elapsed >= limit {
            break;
        }
        let nap = (limit - elapsed).min(Duration::from_secs(1));

        tokio::select! {
            () = tokio::time::sleep(nap) => {
                if !args.quiet {
                    display_progress(started.elapsed().as_secs(), args.duration);
                }
            }
            _ = &mut ctrl_c => {
                exit_reason = "interrupted";
                break;
            }
        }
    }

    let (rounds, run) = tokio::task::spawn_blocking(move || {
        let rounds = load.stop();
        (rounds, profiler.finish())
    })
    .await
    .context("Shutdown task panicked")?;
    let run = run?;
    if let Some(e) = &run.stop_error {
        warn!("{e}");
    }

    let samples = run.aggregator.sample_count();
    let has_entries = run.aggregator.has_entries();
    if !args.quiet {
        eprintln!(
            "\n{exit_reason}: {:.1}s, {rounds} load rounds",
            started.elapsed().as_secs_f64()
        );
        display_statistics(&run.stats);
    }
    if samples == 0 {
        warn!("No samples were collected");
    }
    display_summary(samples, has_entries);

    if !args.quiet && args.top > 0 {
        let tree = run.aggregator.snapshot();
        let mut hotspots = analyze_hotspots(&tree);
        hotspots.truncate(args.top);
        display_hotspots(&hotspots);
        display_hot_paths(&heaviest_paths(&tree, args.top));
    }

    if let Some(export_path) = &args.export {
        CallTreeReport::new(Pid::current(), &run.aggregator, run.stats)
            .write_to_file(export_path)?;
        if !args.quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}

/// Scripted records over a small fixed call graph, for runs without perf access
fn synthetic_session(pid: Pid) -> (ScriptedProvider, StaticResolver) {
    const MAIN: u64 = 0x1040;
    const RUN: u64 = 0x2040;
    const PARSE: u64 = 0x3040;
    const EVAL: u64 = 0x4040;
    const IDLE: u64 = 0x5040;

    let tid = Tid(pid.0);
    let mut script: Vec<RawRecord> = (0..1000u64)
        .map(|i| {
            let frames = match i % 10 {
                0..=5 => vec![MAIN, RUN, EVAL],
                6..=8 => vec![MAIN, RUN, PARSE],
                _ => vec![MAIN, IDLE],
            };
            RawRecord::sample(pid, tid, frames)
        })
        .collect();
    script.push(RawRecord::lost(pid, 3));
    script.push(RawRecord::sample(Pid(pid.0.wrapping_add(1)), Tid(1), vec![MAIN]));
    script.push(RawRecord::sample(pid, tid, vec![MAIN, RUN, 0xdead]));

    let resolver = StaticResolver::new([
        (0x1000..0x1100, "main"),
        (0x2000..0x2100, "interpreter::run"),
        (0x3000..0x3100, "interpreter::parse"),
        (0x4000..0x4100, "interpreter::eval"),
        (0x5000..0x5100, "scheduler::idle"),
    ]);
    (ScriptedProvider::new(script), resolver)
}
