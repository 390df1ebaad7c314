//! # selfprof - Self-Profiling CPU Sampler
//!
//! selfprof samples its own process: the kernel periodically interrupts every
//! thread, captures the user-space call stack, and hands the raw addresses
//! back. Each stack is resolved to function names and merged into a call tree
//! whose nodes count how many samples passed through each unique call path.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       This Process                              │
//! │        load workers (load_worker → spin_round → mix)            │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ CPU-clock samples, one event per CPU
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              perf_event_open (Kernel, mmap ring buffers)        │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ PERF_RECORD_SAMPLE (ip, pid/tid, callchain)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       selfprof (This Crate)                     │
//! │                                                                 │
//! │  ┌──────────────┐  channel  ┌──────────────┐   ┌────────────┐  │
//! │  │ reader thread│──────────▶│  consumer    │──▶│ CallTree   │  │
//! │  │ RecordStream │           │  Dispatcher  │   │ (Mutex)    │  │
//! │  └──────────────┘           └──────┬───────┘   └─────┬──────┘  │
//! │         ▲                          │                 │         │
//! │         │ stop                     ▼                 ▼         │
//! │  ┌──────────────┐           ┌──────────────┐   ┌────────────┐  │
//! │  │  Session     │           │ Symbolizer   │   │ Analysis / │  │
//! │  │  Controller  │           │ (DWARF/ELF)  │   │ JSON export│  │
//! │  └──────────────┘           └──────────────┘   └────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`trace`]: the narrow OS interface (`TraceProvider`, `SessionControl`,
//!   `RecordStream`) with the Linux perf backend and a scripted backend
//! - [`profiling`]: session lifecycle, the consumer task, record dispatching
//!   and the RAII [`profiling::Profiler`]
//! - [`symbolization`]: address → function name via DWARF and the ELF
//!   symbol table, with PIE rebasing
//! - [`aggregation`]: the arena call tree and the shared sample aggregator
//! - [`analysis`]: hot functions and heaviest paths
//! - [`export`]: JSON call-tree report
//! - [`load`]: synthetic CPU load to profile
//! - [`preflight`]: permission and debug-info checks
//! - [`cli`]: command-line arguments
//! - [`domain`]: newtypes and error types
//!
//! ## Shutdown Order
//!
//! The record loop blocks until the session is stopped, so the consumer task
//! can only be joined after `stop`. [`profiling::Profiler`] enforces this on
//! both the normal path and on drop.
//!
//! ## Key Concepts
//!
//! - **Frame pointers**: the kernel walks the user stack via `rbp`; the
//!   workspace builds with `-C force-frame-pointers=yes`
//! - **PIE/ASLR**: runtime addresses are rebased to link-time addresses
//! - **Callchain markers**: `PERF_CONTEXT_*` entries separate kernel and user
//!   frames and are dropped during decoding

pub mod aggregation;
pub mod analysis;
pub mod cli;
pub mod domain;
pub mod export;
pub mod load;
pub mod preflight;
pub mod profiling;
pub mod symbolization;
pub mod trace;
