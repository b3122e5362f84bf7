//! Shared counters mutated by concurrent actors.
//!
//! `SharedCounter` reproduces the inventory race: one thread increments, another
//! decrements the same number of times, and the final value shows whether the
//! update policy lost writes. `RacePair` reproduces the `y > x` data race that
//! only weakly ordered accesses can exhibit.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::error::{panic_message, HarnessError, Result};

// =============================================================================
// Part 1: Inventory counter with a swappable update policy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// A separate read and write; an update landing between them is lost.
    Unsynchronized,
    Locked,
    Atomic,
}

impl UpdatePolicy {
    pub const ALL: [UpdatePolicy; 3] = [Self::Unsynchronized, Self::Locked, Self::Atomic];

    pub fn is_linearizable(self) -> bool {
        !matches!(self, Self::Unsynchronized)
    }
}

enum Storage {
    Unsynchronized(AtomicI64),
    Locked(Mutex<i64>),
    Atomic(AtomicI64),
}

pub struct SharedCounter {
    storage: Storage,
}

impl SharedCounter {
    pub fn new(policy: UpdatePolicy) -> Self {
        let storage = match policy {
            UpdatePolicy::Unsynchronized => Storage::Unsynchronized(AtomicI64::new(0)),
            UpdatePolicy::Locked => Storage::Locked(Mutex::new(0)),
            UpdatePolicy::Atomic => Storage::Atomic(AtomicI64::new(0)),
        };
        Self { storage }
    }

    pub fn policy(&self) -> UpdatePolicy {
        match self.storage {
            Storage::Unsynchronized(_) => UpdatePolicy::Unsynchronized,
            Storage::Locked(_) => UpdatePolicy::Locked,
            Storage::Atomic(_) => UpdatePolicy::Atomic,
        }
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn decrement(&self) {
        self.add(-1);
    }

    pub fn read(&self) -> i64 {
        match &self.storage {
            Storage::Unsynchronized(value) => value.load(Ordering::Relaxed),
            Storage::Locked(value) => *value.lock().unwrap_or_else(PoisonError::into_inner),
            Storage::Atomic(value) => value.load(Ordering::SeqCst),
        }
    }

    fn add(&self, delta: i64) {
        match &self.storage {
            Storage::Unsynchronized(value) => {
                let current = value.load(Ordering::Relaxed);
                // Yielding between the read and the write widens the lost-update window.
                thread::yield_now();
                value.store(current + delta, Ordering::Relaxed);
            }
            Storage::Locked(value) => {
                *value.lock().unwrap_or_else(PoisonError::into_inner) += delta;
            }
            Storage::Atomic(value) => {
                value.fetch_add(delta, Ordering::SeqCst);
            }
        }
    }
}

/// Runs one incrementer and one decrementer, `iterations` updates each, and
/// returns the value read after both have finished.
pub fn run_inventory(counter: &SharedCounter, iterations: usize) -> Result<i64> {
    thread::scope(|scope| -> Result<()> {
        let incrementer = thread::Builder::new()
            .name("incrementer".to_string())
            .spawn_scoped(scope, || {
                for _ in 0..iterations {
                    counter.increment();
                }
            })
            .map_err(|err| HarnessError::spawn("incrementer", err))?;

        let decrementer = thread::Builder::new()
            .name("decrementer".to_string())
            .spawn_scoped(scope, || {
                for _ in 0..iterations {
                    counter.decrement();
                }
            })
            .map_err(|err| HarnessError::spawn("decrementer", err))?;

        for (name, handle) in [("incrementer", incrementer), ("decrementer", decrementer)] {
            handle.join().map_err(|payload| HarnessError::ThreadPanicked {
                name: name.to_string(),
                message: panic_message(payload.as_ref()),
            })?;
        }
        Ok(())
    })?;

    let value = counter.read();
    tracing::debug!(policy = ?counter.policy(), iterations, value, "inventory run finished");
    Ok(value)
}

// =============================================================================
// Part 2: Data race between two fields
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOrdering {
    Relaxed,
    SeqCst,
}

impl MemoryOrdering {
    fn as_atomic(self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::SeqCst => Ordering::SeqCst,
        }
    }
}

/// Two counters always bumped as `x` then `y`, so a reader should never see
/// `y > x`. With relaxed ordering a weakly ordered CPU may show it anyway.
pub struct RacePair {
    x: AtomicU64,
    y: AtomicU64,
    ordering: MemoryOrdering,
}

impl RacePair {
    pub fn new(ordering: MemoryOrdering) -> Self {
        Self {
            x: AtomicU64::new(0),
            y: AtomicU64::new(0),
            ordering,
        }
    }

    pub fn increase(&self) {
        let ordering = self.ordering.as_atomic();
        self.x.fetch_add(1, ordering);
        self.y.fetch_add(1, ordering);
    }

    pub fn check_for_data_race(&self) -> bool {
        let ordering = self.ordering.as_atomic();
        let y = self.y.load(ordering);
        let x = self.x.load(ordering);
        y > x
    }

    pub fn values(&self) -> (u64, u64) {
        (self.x.load(Ordering::SeqCst), self.y.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceReport {
    pub checks: u64,
    pub detections: u64,
}

/// Increments the pair `iterations` times on one thread while another thread
/// checks it until the writer is done.
pub fn run_race_check(pair: &RacePair, iterations: u64) -> Result<RaceReport> {
    let writer_done = AtomicBool::new(false);

    thread::scope(|scope| -> Result<RaceReport> {
        let writer = thread::Builder::new()
            .name("increaser".to_string())
            .spawn_scoped(scope, || {
                for _ in 0..iterations {
                    pair.increase();
                }
                writer_done.store(true, Ordering::Release);
            })
            .map_err(|err| HarnessError::spawn("increaser", err))?;

        let checker = thread::Builder::new()
            .name("race-checker".to_string())
            .spawn_scoped(scope, || {
                let mut report = RaceReport { checks: 0, detections: 0 };
                while !writer_done.load(Ordering::Acquire) {
                    report.checks += 1;
                    if pair.check_for_data_race() {
                        report.detections += 1;
                    }
                }
                report
            })
            .map_err(|err| HarnessError::spawn("race-checker", err))?;

        writer.join().map_err(|payload| HarnessError::ThreadPanicked {
            name: "increaser".to_string(),
            message: panic_message(payload.as_ref()),
        })?;
        checker.join().map_err(|payload| HarnessError::ThreadPanicked {
            name: "race-checker".to_string(),
            message: panic_message(payload.as_ref()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sequential_updates() {
        for policy in UpdatePolicy::ALL {
            let counter = SharedCounter::new(policy);
            counter.increment();
            counter.increment();
            counter.decrement();
            assert_eq!(counter.read(), 1, "{policy:?}");
            assert_eq!(counter.policy(), policy);
        }
    }

    #[test]
    fn test_atomic_counter_nets_to_zero() {
        for iterations in [1, 10, 1_000, 50_000] {
            for _ in 0..3 {
                let counter = SharedCounter::new(UpdatePolicy::Atomic);
                assert_eq!(run_inventory(&counter, iterations).unwrap(), 0);
            }
        }
    }

    #[test]
    fn test_locked_counter_nets_to_zero() {
        for iterations in [1, 1_000, 50_000] {
            let counter = SharedCounter::new(UpdatePolicy::Locked);
            assert_eq!(run_inventory(&counter, iterations).unwrap(), 0);
        }
    }

    #[test]
    fn test_unsynchronized_counter_loses_updates() {
        let lost = (0..30).any(|_| {
            let counter = SharedCounter::new(UpdatePolicy::Unsynchronized);
            run_inventory(&counter, 20_000).unwrap() != 0
        });
        assert!(lost, "expected at least one lost update across 30 trials");
    }

    #[test]
    fn test_counter_shared_through_arc() {
        let counter = Arc::new(SharedCounter::new(UpdatePolicy::Atomic));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        if i % 2 == 0 {
                            counter.increment();
                        } else {
                            counter.decrement();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.read(), 0);
    }

    #[test]
    fn test_linearizable_policies() {
        assert!(!UpdatePolicy::Unsynchronized.is_linearizable());
        assert!(UpdatePolicy::Locked.is_linearizable());
        assert!(UpdatePolicy::Atomic.is_linearizable());
    }

    #[test]
    fn test_seq_cst_pair_never_reports_race() {
        let pair = RacePair::new(MemoryOrdering::SeqCst);
        let report = run_race_check(&pair, 200_000).unwrap();
        assert_eq!(report.detections, 0);
        assert_eq!(pair.values(), (200_000, 200_000));
    }

    #[test]
    fn test_relaxed_pair_still_counts_every_increase() {
        let pair = RacePair::new(MemoryOrdering::Relaxed);
        let report = run_race_check(&pair, 10_000).unwrap();
        assert!(report.detections <= report.checks);
        assert_eq!(pair.values(), (10_000, 10_000));
    }
}
