//! End-to-end runs of the sampling pipeline against scripted records

use std::sync::Arc;

use selfprof::aggregation::SampleAggregator;
use selfprof::domain::{Pid, SessionError, StartFailure, Tid};
use selfprof::profiling::{Profiler, SessionState, StackEventDispatcher, TraceSessionController};
use selfprof::symbolization::StaticResolver;
use selfprof::trace::{RawRecord, ScriptedProvider, SessionConfig};

// One address inside each function; callers are looked up one byte earlier
const A: u64 = 0xa8;
const B: u64 = 0xb8;
const C: u64 = 0xc8;
const X: u64 = 0xf8;

fn resolver() -> StaticResolver {
    StaticResolver::new([
        (0xa0..0xb0, "A"),
        (0xb0..0xc0, "B"),
        (0xc0..0xd0, "C"),
        (0xf0..0x100, "X"),
    ])
}

fn sample(frames: &[u64]) -> RawRecord {
    RawRecord::sample(Pid::current(), Tid(1), frames.to_vec())
}

#[test]
fn test_scripted_run_builds_expected_tree() {
    let provider = ScriptedProvider::new(vec![
        sample(&[A, B]),
        sample(&[A, B]),
        sample(&[A, C]),
        sample(&[X]),
        sample(&[]),
    ]);

    let profiler =
        Profiler::start(provider, "e2e", &SessionConfig::default(), resolver()).unwrap();
    let run = profiler.finish().unwrap();

    assert_eq!(run.aggregator.sample_count(), 4);
    assert_eq!(run.stats.empty_samples, 1);

    let tree = run.aggregator.snapshot();
    let root_children: Vec<(&str, u64)> =
        tree.children.iter().map(|c| (c.name.as_str(), c.hits)).collect();
    assert_eq!(root_children, [("A", 3), ("X", 1)]);

    let a = tree.child("A").unwrap();
    let a_children: Vec<(&str, u64)> =
        a.children.iter().map(|c| (c.name.as_str(), c.hits)).collect();
    assert_eq!(a_children, [("B", 2), ("C", 1)]);
    assert_eq!(tree.hits, 0);
    assert_eq!(tree.total_hits(), run.aggregator.sample_count());
}

#[test]
fn test_filtered_records_never_reach_the_tree() {
    let provider = ScriptedProvider::new(vec![
        RawRecord::sample(Pid(Pid::current().0.wrapping_add(1)), Tid(9), vec![A]),
        RawRecord::lost(Pid::current(), 12),
        sample(&[B]),
    ]);

    let profiler =
        Profiler::start(provider, "filtered", &SessionConfig::default(), resolver()).unwrap();
    let run = profiler.finish().unwrap();

    assert_eq!(run.stats.records_seen, 3);
    assert_eq!(run.stats.foreign_process, 1);
    assert_eq!(run.stats.lost_records, 12);
    assert_eq!(run.aggregator.sample_count(), 1);
    let tree = run.aggregator.snapshot();
    assert!(tree.child("A").is_none());
    assert_eq!(tree.child("B").map(|b| b.hits), Some(1));
}

#[test]
fn test_zero_sample_run_is_valid() {
    let profiler = Profiler::start(
        ScriptedProvider::new(Vec::new()),
        "idle",
        &SessionConfig::default(),
        resolver(),
    )
    .unwrap();
    let run = profiler.finish().unwrap();

    assert_eq!(run.aggregator.sample_count(), 0);
    assert!(!run.aggregator.has_entries());
    assert!(run.stop_error.is_none());
}

#[test]
fn test_double_start_fails_without_disturbing_first_session() {
    let pid = Pid::current();
    let provider = ScriptedProvider::new(vec![sample(&[A, B])]);
    let mut controller = TraceSessionController::new(provider);

    let handle = controller.start("first", &SessionConfig::default()).unwrap();
    let aggregator = Arc::new(SampleAggregator::new());
    let dispatcher = StackEventDispatcher::new(pid, resolver(), Arc::clone(&aggregator));
    let task = controller.begin_consuming(&handle, dispatcher).unwrap();

    let err = controller.start("second", &SessionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::StartFailed {
            reason: StartFailure::AlreadyStarted,
            ..
        }
    ));
    assert!(err.is_fatal());
    assert_eq!(controller.state(), SessionState::Started);

    controller.stop(&handle).unwrap();
    let stats = task.join().unwrap();
    assert_eq!(stats.samples_accepted, 1);
    assert_eq!(aggregator.sample_count(), 1);
}

#[test]
fn test_name_collision_between_controllers() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let mut first = TraceSessionController::new(Arc::clone(&provider));
    let mut second = TraceSessionController::new(Arc::clone(&provider));

    let handle = first.start("shared-name", &SessionConfig::default()).unwrap();
    let err = second.start("shared-name", &SessionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SessionError::StartFailed {
            reason: StartFailure::NameCollision,
            ..
        }
    ));

    // Released on stop
    first.stop(&handle).unwrap();
    let again = second.start("shared-name", &SessionConfig::default()).unwrap();
    second.stop(&again).unwrap();
}

#[test]
fn test_permission_denied_is_start_failure() {
    let result = Profiler::start(
        ScriptedProvider::denying("perf_event_paranoid is 3"),
        "denied",
        &SessionConfig::default(),
        resolver(),
    );
    match result {
        Err(SessionError::StartFailed {
            reason: StartFailure::PermissionDenied(msg),
            ..
        }) => {
            assert!(msg.contains("paranoid"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("start should have failed"),
    }
}

#[test]
fn test_stop_failure_is_reported_not_fatal() {
    let provider = ScriptedProvider::new(vec![sample(&[A])]).with_failing_stop();
    let profiler =
        Profiler::start(provider, "flaky", &SessionConfig::default(), resolver()).unwrap();
    let run = profiler.finish().unwrap();

    let stop_error = run.stop_error.expect("stop failure should be reported");
    assert!(!stop_error.is_fatal());
    assert_eq!(run.aggregator.sample_count(), 1);
}

#[test]
fn test_dropped_profiler_stops_and_joins() {
    let provider = Arc::new(ScriptedProvider::new(vec![sample(&[A, B]), sample(&[A])]));
    let profiler = Profiler::start(
        Arc::clone(&provider),
        "dropped",
        &SessionConfig::default(),
        resolver(),
    )
    .unwrap();
    let aggregator = Arc::clone(profiler.aggregator());
    assert!(provider.registry().is_active("dropped"));

    drop(profiler);

    assert!(!provider.registry().is_active("dropped"));
    // The consumer was joined, so every scripted record has been applied
    assert_eq!(aggregator.sample_count(), 2);
}

#[test]
fn test_invalid_config_is_start_failure() {
    for buffer_pages in [3, 1 << 40] {
        let config = SessionConfig {
            buffer_pages,
            ..SessionConfig::default()
        };
        let result =
            Profiler::start(ScriptedProvider::new(Vec::new()), "bad", &config, resolver());
        assert!(matches!(
            result,
            Err(SessionError::StartFailed {
                reason: StartFailure::InvalidConfig(_),
                ..
            })
        ));
    }
}
