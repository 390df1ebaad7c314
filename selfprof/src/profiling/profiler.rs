//! RAII bracket around one sampling run
//!
//! Owns the controller, the running consumer task and the aggregator, and
//! guarantees the only safe shutdown order: stop the session, then join the
//! consumer. [`Profiler::finish`] does this explicitly; dropping an unfinished
//! `Profiler` (early return, `?`, panic unwinding) does the same.

use log::{debug, warn};
use std::sync::Arc;

use super::dispatcher::{DispatchStats, StackEventDispatcher};
use super::session_controller::{ConsumerTask, SessionHandle, TraceSessionController};
use crate::aggregation::SampleAggregator;
use crate::domain::{Pid, SessionError};
use crate::symbolization::SymbolResolver;
use crate::trace::{SessionConfig, TraceProvider};

pub struct Profiler<P: TraceProvider> {
    controller: TraceSessionController<P>,
    handle: Option<SessionHandle>,
    task: Option<ConsumerTask>,
    aggregator: Arc<SampleAggregator>,
}

/// Result of a completed run
#[derive(Debug)]
pub struct FinishedRun {
    pub stats: DispatchStats,
    pub aggregator: Arc<SampleAggregator>,
    /// Set when the session did not stop cleanly (non-fatal)
    pub stop_error: Option<SessionError>,
}

impl<P: TraceProvider> Profiler<P> {
    /// Start a session sampling the current process and begin consuming it
    ///
    /// # Errors
    /// The session could not be started or its threads could not be spawned
    pub fn start<R>(
        provider: P,
        name: &str,
        config: &SessionConfig,
        resolver: R,
    ) -> Result<Self, SessionError>
    where
        R: SymbolResolver + 'static,
    {
        Self::start_for(Pid::current(), provider, name, config, resolver)
    }

    /// Like [`Profiler::start`] but accepting samples of `target`
    ///
    /// # Errors
    /// The session could not be started or its threads could not be spawned
    pub fn start_for<R>(
        target: Pid,
        provider: P,
        name: &str,
        config: &SessionConfig,
        resolver: R,
    ) -> Result<Self, SessionError>
    where
        R: SymbolResolver + 'static,
    {
        let mut controller = TraceSessionController::new(provider);
        let handle = controller.start(name, config)?;

        let aggregator = Arc::new(SampleAggregator::new());
        let dispatcher = StackEventDispatcher::new(target, resolver, Arc::clone(&aggregator))
            .with_max_depth(config.max_stack_depth);

        let task = match controller.begin_consuming(&handle, dispatcher) {
            Ok(task) => task,
            Err(e) => {
                if let Err(stop_err) = controller.stop(&handle) {
                    warn!("{stop_err}");
                }
                return Err(e);
            }
        };

        Ok(Self {
            controller,
            handle: Some(handle),
            task: Some(task),
            aggregator,
        })
    }

    /// Aggregation state; complete only after [`Profiler::finish`]
    #[must_use]
    pub fn aggregator(&self) -> &Arc<SampleAggregator> {
        &self.aggregator
    }

    /// Stop the session, then wait for the consumer to drain
    ///
    /// # Errors
    /// Only fatal failures (a panicked thread, a failed record loop). A stop
    /// failure is reported in [`FinishedRun::stop_error`].
    pub fn finish(mut self) -> Result<FinishedRun, SessionError> {
        let stop_error = self.stop_session();
        let stats = self.join_task()?;
        Ok(FinishedRun {
            stats,
            aggregator: Arc::clone(&self.aggregator),
            stop_error,
        })
    }

    fn stop_session(&mut self) -> Option<SessionError> {
        let handle = self.handle.take()?;
        self.controller.stop(&handle).err()
    }

    fn join_task(&mut self) -> Result<DispatchStats, SessionError> {
        match self.task.take() {
            Some(task) => task.join(),
            None => Ok(DispatchStats::default()),
        }
    }
}

impl<P: TraceProvider> Drop for Profiler<P> {
    fn drop(&mut self) {
        if self.handle.is_none() && self.task.is_none() {
            return;
        }
        debug!("Profiler dropped before finish; stopping session");
        if let Some(e) = self.stop_session() {
            warn!("{e}");
        }
        if let Err(e) = self.join_task() {
            warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tid;
    use crate::symbolization::StaticResolver;
    use crate::trace::{RawRecord, ScriptedProvider};

    #[test]
    fn test_finish_reports_samples() {
        let pid = Pid::current();
        let provider = ScriptedProvider::new(vec![
            RawRecord::sample(pid, Tid(1), vec![0x110, 0x210]),
            RawRecord::sample(Pid(pid.0.wrapping_add(1)), Tid(2), vec![0x110]),
        ]);
        let resolver = StaticResolver::new([(0x100..0x200, "main"), (0x200..0x300, "work")]);

        let profiler =
            Profiler::start(provider, "finish", &SessionConfig::default(), resolver).unwrap();
        let run = profiler.finish().unwrap();

        assert!(run.stop_error.is_none());
        assert_eq!(run.stats.samples_accepted, 1);
        assert_eq!(run.stats.foreign_process, 1);
        assert_eq!(run.aggregator.sample_count(), 1);
    }

    #[test]
    fn test_start_failure_is_surfaced() {
        let provider = ScriptedProvider::denying("no access");
        let result = Profiler::start(
            provider,
            "denied",
            &SessionConfig::default(),
            StaticResolver::new::<_, &str>([]),
        );
        assert!(matches!(result, Err(SessionError::StartFailed { .. })));
    }

    #[test]
    fn test_stop_failure_is_non_fatal() {
        let provider = ScriptedProvider::new(Vec::new()).with_failing_stop();
        let profiler = Profiler::start(
            provider,
            "flaky",
            &SessionConfig::default(),
            StaticResolver::new::<_, &str>([]),
        )
        .unwrap();

        let run = profiler.finish().unwrap();
        assert!(matches!(run.stop_error, Some(SessionError::StopFailed { .. })));
    }
}
