//! Synthetic CPU load
//!
//! Independent worker threads spinning through a small, recognizable call
//! chain so a sampling run over this process has something to find:
//!
//! ```text
//! load_worker → spin_round → mix
//! ```
//!
//! The workers share nothing with the sampler except a stop flag.

use anyhow::{Context, Result};
use log::debug;
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const ROUND_ITERATIONS: u64 = 10_000;

pub struct BusyWorkers {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<u64>>,
}

impl BusyWorkers {
    /// Spawn `count` spinning threads named `load-<n>`
    ///
    /// # Errors
    /// A thread could not be spawned; already started workers are stopped
    pub fn spawn(count: usize) -> Result<Self> {
        let mut workers = Self {
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        };
        for i in 0..count {
            let stop = Arc::clone(&workers.stop);
            let handle = thread::Builder::new()
                .name(format!("load-{i}"))
                .spawn(move || load_worker(&stop))
                .with_context(|| format!("Failed to spawn load worker {i}"))?;
            workers.handles.push(handle);
        }
        debug!("Started {count} load workers");
        Ok(workers)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal the workers and wait for them; returns the rounds completed
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.stop.store(true, Ordering::Relaxed);
        let rounds = self.handles.drain(..).filter_map(|h| h.join().ok()).sum();
        debug!("Load workers stopped after {rounds} rounds");
        rounds
    }
}

impl Drop for BusyWorkers {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shutdown();
        }
    }
}

#[inline(never)]
fn load_worker(stop: &AtomicBool) -> u64 {
    let mut rounds = 0u64;
    let mut acc = 0u64;
    while !stop.load(Ordering::Relaxed) {
        acc = spin_round(acc);
        rounds += 1;
    }
    black_box(acc);
    rounds
}

#[inline(never)]
fn spin_round(seed: u64) -> u64 {
    let mut acc = seed;
    for i in 0..ROUND_ITERATIONS {
        acc = mix(acc, i);
    }
    acc
}

#[inline(never)]
fn mix(acc: u64, i: u64) -> u64 {
    black_box(acc.rotate_left(5) ^ i.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_workers_run_until_stopped() {
        let workers = BusyWorkers::spawn(2).unwrap();
        assert_eq!(workers.len(), 2);
        thread::sleep(Duration::from_millis(50));
        assert!(workers.stop() > 0);
    }

    #[test]
    fn test_zero_workers() {
        let workers = BusyWorkers::spawn(0).unwrap();
        assert!(workers.is_empty());
        assert_eq!(workers.stop(), 0);
    }

    #[test]
    fn test_drop_joins_workers() {
        let workers = BusyWorkers::spawn(1).unwrap();
        let stop = Arc::clone(&workers.stop);
        drop(workers);
        assert!(stop.load(Ordering::Relaxed));
    }
}
