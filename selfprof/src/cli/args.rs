//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::trace::SessionConfig;

#[derive(Parser, Debug)]
#[command(
    name = "selfprof",
    about = "Sample this process's own call stacks and aggregate them into a call tree",
    after_help = "\
EXAMPLES:
    selfprof                                 2s run, 4 load workers
    selfprof --duration 5 --workers 8        Longer run, more load
    selfprof --export tree.json              Write the call tree as JSON
    selfprof --synthetic                     Scripted records, no perf access needed"
)]
pub struct Args {
    /// Seconds to sample before stopping
    #[arg(long, default_value = "2")]
    pub duration: u64,

    /// Number of CPU-burning load threads
    #[arg(long, default_value = "4")]
    pub workers: usize,

    /// Sampling frequency in Hz
    #[arg(long, default_value = "999")]
    pub frequency: u64,

    /// Ring buffer data pages per CPU (power of two)
    #[arg(long, default_value = "16")]
    pub buffer_pages: usize,

    /// Maximum frames kept per sample
    #[arg(long, default_value = "127")]
    pub max_depth: usize,

    /// Number of hot functions and paths to print
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Export the call tree report to file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Replay scripted records instead of sampling with perf
    #[arg(long)]
    pub synthetic: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            frequency_hz: self.frequency,
            buffer_pages: self.buffer_pages,
            max_stack_depth: self.max_depth,
            ..SessionConfig::default()
        }
    }
}
