//! # OS Tracing Facility Interface
//!
//! The narrow surface the sampler needs from the operating system:
//!
//! ```text
//! TraceProvider::open(name, config) ──► OpenedSession
//!                                         ├─ control: SessionControl  stop()
//!                                         └─ stream:  RecordStream    process(deliver)
//! ```
//!
//! `process` blocks, handing every record to `deliver`, and only returns after
//! `stop` was issued on the paired control (or `deliver` reports that nobody is
//! listening anymore). The two halves are separate objects so the stream can
//! live on its own thread while the control stays with the session owner.
//!
//! ## Providers
//!
//! - [`perf::PerfProvider`]: Linux `perf_event_open(2)` CPU-clock sampling
//! - [`scripted::ScriptedProvider`]: replays a fixed list of records

pub mod perf;
pub mod registry;
pub mod scripted;

use std::io;
use std::sync::Arc;

use selfprof_common::MAX_STACK_DEPTH;

use crate::domain::{Pid, StartFailure, Tid};

pub use perf::PerfProvider;
pub use registry::{NameClaim, SessionRegistry};
pub use scripted::ScriptedProvider;

/// Largest accepted ring buffer, in data pages per CPU
pub const MAX_BUFFER_PAGES: usize = 1 << 16;

/// What kind of event a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Periodic sampled-profile event with a captured call stack
    SampledProfile,
    /// The facility dropped `count` records (buffer overrun)
    Lost { count: u64 },
    /// Any other record type, by raw type id
    Other(u32),
}

/// One record as delivered by the tracing facility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub pid: Pid,
    pub tid: Tid,
    pub kind: RecordKind,
    /// Frame addresses, outermost caller first, innermost frame last
    pub frames: Vec<u64>,
}

impl RawRecord {
    /// A sampled-profile record with the given stack (outermost first)
    #[must_use]
    pub fn sample(pid: Pid, tid: Tid, frames: Vec<u64>) -> Self {
        Self {
            pid,
            tid,
            kind: RecordKind::SampledProfile,
            frames,
        }
    }

    #[must_use]
    pub fn lost(pid: Pid, count: u64) -> Self {
        Self {
            pid,
            tid: Tid(0),
            kind: RecordKind::Lost { count },
            frames: Vec::new(),
        }
    }
}

/// Session buffer and sampling configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sampling frequency in Hz
    pub frequency_hz: u64,
    /// Data pages per ring buffer (power of two, at most [`MAX_BUFFER_PAGES`])
    pub buffer_pages: usize,
    /// Frames kept per sample, innermost first
    pub max_stack_depth: usize,
    /// Records buffered between the reader and the consumer thread
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 999,
            buffer_pages: 16,
            max_stack_depth: MAX_STACK_DEPTH,
            channel_capacity: 4096,
        }
    }
}

impl SessionConfig {
    /// # Errors
    /// Returns [`StartFailure::InvalidConfig`] describing the first bad field
    pub fn validate(&self) -> Result<(), StartFailure> {
        if self.frequency_hz == 0 {
            return Err(StartFailure::InvalidConfig(
                "frequency must be non-zero".to_string(),
            ));
        }
        if !self.buffer_pages.is_power_of_two() {
            return Err(StartFailure::InvalidConfig(format!(
                "buffer pages must be a power of two, got {}",
                self.buffer_pages
            )));
        }
        if self.buffer_pages > MAX_BUFFER_PAGES {
            return Err(StartFailure::InvalidConfig(format!(
                "buffer pages must be at most {MAX_BUFFER_PAGES}, got {}",
                self.buffer_pages
            )));
        }
        if self.max_stack_depth == 0 || self.max_stack_depth > MAX_STACK_DEPTH {
            return Err(StartFailure::InvalidConfig(format!(
                "stack depth must be within 1..={MAX_STACK_DEPTH}, got {}",
                self.max_stack_depth
            )));
        }
        if self.channel_capacity == 0 {
            return Err(StartFailure::InvalidConfig(
                "channel capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Creates tracing sessions
pub trait TraceProvider: Send + Sync {
    /// Register a session, configure sampling and open its record stream.
    ///
    /// # Errors
    /// Any refusal by the facility (privileges, name collision, bad config)
    fn open(&self, name: &str, config: &SessionConfig) -> Result<OpenedSession, StartFailure>;
}

impl<P: TraceProvider + ?Sized> TraceProvider for Arc<P> {
    fn open(&self, name: &str, config: &SessionConfig) -> Result<OpenedSession, StartFailure> {
        (**self).open(name, config)
    }
}

/// A freshly opened session: its control half and its record stream
pub struct OpenedSession {
    pub control: Box<dyn SessionControl>,
    pub stream: Box<dyn RecordStream>,
}

/// Control-side handle of an open session
pub trait SessionControl: Send {
    /// Issue a control-stop. After this returns (successfully or not) the
    /// paired stream's `process` call returns once it has drained.
    ///
    /// # Errors
    /// The facility failed to stop cleanly; the stream is still released
    fn stop(&mut self) -> io::Result<()>;
}

/// Record-side handle of an open session
pub trait RecordStream: Send {
    /// Blocking record loop. `deliver` returns `false` when the receiver is
    /// gone, which ends the loop early.
    ///
    /// # Errors
    /// Unrecoverable failure of the underlying facility while reading
    fn process(&mut self, deliver: &mut dyn FnMut(RawRecord) -> bool) -> io::Result<()>;
}
