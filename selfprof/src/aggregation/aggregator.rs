//! Shared aggregation state for one sampling run
//!
//! Replaces process-wide globals: each run owns its own `SampleAggregator`,
//! shared via `Arc` between the consumer thread (the only writer) and the
//! code that reports once the consumer has been joined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::call_tree::{CallTree, TreeSnapshot};

/// Count of accepted, non-empty samples
#[derive(Debug, Default)]
pub struct SampleCounter(AtomicU64);

impl SampleCounter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct SampleAggregator {
    tree: Mutex<CallTree>,
    samples: SampleCounter,
}

impl SampleAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one sample and count it if it was non-empty.
    ///
    /// The lock is held for the whole insert so a path is never partially visible.
    pub fn record<S: AsRef<str>>(&self, sample: &[S]) -> bool {
        let inserted = self.lock().insert(sample);
        if inserted {
            self.samples.increment();
        }
        inserted
    }

    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.samples.get()
    }

    /// Copy of the current tree. Meant for use after the writer has stopped.
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        self.lock().snapshot()
    }

    /// Run `f` with read access to the tree
    pub fn with_tree<T>(&self, f: impl FnOnce(&CallTree) -> T) -> T {
        f(&self.lock())
    }

    /// True when at least one non-root node exists
    #[must_use]
    pub fn has_entries(&self) -> bool {
        !self.lock().is_empty()
    }

    // A panic inside insert cannot leave a half-linked node (children are
    // linked after the node is pushed), so a poisoned tree is still usable.
    fn lock(&self) -> MutexGuard<'_, CallTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counter_tracks_non_empty_samples_only() {
        let agg = SampleAggregator::new();
        assert!(agg.record(&["A", "B"]));
        assert!(!agg.record::<&str>(&[]));
        assert!(agg.record(&["X"]));

        assert_eq!(agg.sample_count(), 2);
        assert!(agg.has_entries());
        assert_eq!(agg.with_tree(CallTree::root_hits), 2);
    }

    #[test]
    fn test_concurrent_inserts_do_not_interleave() {
        let agg = Arc::new(SampleAggregator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let agg = Arc::clone(&agg);
                thread::spawn(move || {
                    for _ in 0..500 {
                        agg.record(&["main", "worker", "spin"]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(agg.sample_count(), 2000);
        let snapshot = agg.snapshot();
        let spin = snapshot
            .child("main")
            .and_then(|m| m.child("worker"))
            .and_then(|w| w.child("spin"));
        assert_eq!(spin.map(|n| n.hits), Some(2000));
        agg.with_tree(|tree| assert_eq!(tree.len(), 3));
    }
}
