//! # Stack Event Dispatching
//!
//! Turns raw trace records into call-tree insertions. Runs on the consumer
//! thread, which is the only caller, so the dispatcher owns its resolver and
//! reuses one scratch buffer for every sample.
//!
//! ## Record Routing
//!
//! - `SampledProfile` from the target process → resolve frames, insert path
//!   (every frame but the innermost is a return address and is looked up one
//!   byte earlier, inside the call instruction)
//! - `SampledProfile` from another process → dropped
//! - `Lost { count }` → added to the lost-record counter
//! - anything else → dropped
//!
//! None of these outcomes is an error; each only bumps a counter in
//! [`DispatchStats`].

use log::trace;
use serde::Serialize;
use selfprof_common::MAX_STACK_DEPTH;
use std::sync::Arc;

use crate::aggregation::SampleAggregator;
use crate::domain::Pid;
use crate::symbolization::{SymbolResolver, UNKNOWN_SYMBOL};
use crate::trace::{RawRecord, RecordKind};

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Inserted into the call tree and counted
    Accepted,
    /// Sample belonged to another process
    ForeignProcess,
    /// Not a sampled-profile record
    FilteredOut,
    /// Facility reported dropped records
    Lost(u64),
    /// Sample carried no frames
    EmptySample,
}

/// Per-outcome counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub records_seen: u64,
    pub samples_accepted: u64,
    pub foreign_process: u64,
    pub filtered_out: u64,
    pub empty_samples: u64,
    /// Records the facility dropped, as reported by `Lost` records
    pub lost_records: u64,
    /// Frames that resolved to the placeholder name
    pub unresolved_frames: u64,
}

pub struct StackEventDispatcher<R> {
    target: Pid,
    resolver: R,
    aggregator: Arc<SampleAggregator>,
    max_depth: usize,
    scratch: Vec<Arc<str>>,
    pub stats: DispatchStats,
}

impl<R: SymbolResolver> StackEventDispatcher<R> {
    /// Dispatcher accepting samples of `target` only
    #[must_use]
    pub fn new(target: Pid, resolver: R, aggregator: Arc<SampleAggregator>) -> Self {
        Self {
            target,
            resolver,
            aggregator,
            max_depth: MAX_STACK_DEPTH,
            scratch: Vec::with_capacity(MAX_STACK_DEPTH),
            stats: DispatchStats::default(),
        }
    }

    /// Keep at most `depth` innermost frames per sample
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.clamp(1, MAX_STACK_DEPTH);
        self
    }

    #[must_use]
    pub fn aggregator(&self) -> &Arc<SampleAggregator> {
        &self.aggregator
    }

    pub fn on_record(&mut self, record: &RawRecord) -> RecordOutcome {
        self.stats.records_seen += 1;

        match record.kind {
            RecordKind::SampledProfile => {}
            RecordKind::Lost { count } => {
                self.stats.lost_records += count;
                trace!("Facility lost {count} records");
                return RecordOutcome::Lost(count);
            }
            RecordKind::Other(type_id) => {
                self.stats.filtered_out += 1;
                trace!("Filtered record of type {type_id}");
                return RecordOutcome::FilteredOut;
            }
        }

        if record.pid != self.target {
            self.stats.foreign_process += 1;
            trace!("Filtered sample from {} (target {})", record.pid, self.target);
            return RecordOutcome::ForeignProcess;
        }

        if record.frames.is_empty() {
            self.stats.empty_samples += 1;
            return RecordOutcome::EmptySample;
        }

        // Frames are outermost first; the innermost ones are at the end
        let start = record.frames.len().saturating_sub(self.max_depth);
        let frames = &record.frames[start..];
        let innermost = frames.len() - 1;
        self.scratch.clear();
        for (i, &addr) in frames.iter().enumerate() {
            // Callers hold return addresses; step back into the call instruction
            let lookup = if i == innermost {
                addr
            } else {
                addr.saturating_sub(1)
            };
            let name = self.resolver.resolve(lookup);
            if &*name == UNKNOWN_SYMBOL {
                self.stats.unresolved_frames += 1;
            }
            self.scratch.push(name);
        }

        self.aggregator.record(self.scratch.as_slice());
        self.stats.samples_accepted += 1;
        RecordOutcome::Accepted
    }
}
