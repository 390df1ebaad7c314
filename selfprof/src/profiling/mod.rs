//! Profiling core
//!
//! - CPU utilities for the per-CPU perf backend
//! - Session lifecycle (start, consume, stop) and the consumer task
//! - Record dispatching into the call tree
//! - The RAII `Profiler` bracket
//! - Console display of run statistics

pub mod cpu_utils;
pub mod dispatcher;
pub mod event_display;
pub mod profiler;
pub mod session_controller;

pub use cpu_utils::online_cpus;
pub use dispatcher::{DispatchStats, RecordOutcome, StackEventDispatcher};
pub use event_display::{
    display_hot_paths, display_hotspots, display_progress, display_statistics, display_summary,
    percentage,
};
pub use profiler::{FinishedRun, Profiler};
pub use session_controller::{ConsumerTask, SessionHandle, SessionState, TraceSessionController};
