//! Two trains, two roads.
//!
//! Each crossing holds both roads at once. With [`LockOrder::Inverted`] the
//! second train takes the roads in the opposite order to the first, which
//! deadlocks as soon as each train holds one road. [`LockOrder::Consistent`]
//! makes every crossing take road A before road B.

use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use rand::Rng;
use serde::Deserialize;

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockOrder {
    Consistent,
    Inverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Road {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossingEvent {
    Locked { train: String, road: Road },
    Passing { train: String },
    Released { train: String, road: Road },
}

pub type CrossingObserver = Arc<dyn Fn(&CrossingEvent) + Send + Sync>;

pub struct Intersection {
    road_a: Mutex<()>,
    road_b: Mutex<()>,
    order: LockOrder,
    crossing_time: Duration,
    approach_time: Duration,
    observer: Option<CrossingObserver>,
}

impl Intersection {
    pub fn new(order: LockOrder) -> Self {
        Self {
            road_a: Mutex::new(()),
            road_b: Mutex::new(()),
            order,
            crossing_time: Duration::from_millis(1),
            approach_time: Duration::ZERO,
            observer: None,
        }
    }

    /// Time spent holding both roads.
    pub fn with_crossing_time(mut self, crossing_time: Duration) -> Self {
        self.crossing_time = crossing_time;
        self
    }

    /// Time between taking the first road and asking for the second.
    pub fn with_approach_time(mut self, approach_time: Duration) -> Self {
        self.approach_time = approach_time;
        self
    }

    pub fn with_observer(mut self, observer: CrossingObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn order(&self) -> LockOrder {
        self.order
    }

    /// Always road A, then road B.
    pub fn cross_as_first_resource(&self, train: &str) {
        self.cross(train, Road::A, Road::B);
    }

    pub fn cross_as_second_resource(&self, train: &str) {
        match self.order {
            LockOrder::Consistent => self.cross(train, Road::A, Road::B),
            LockOrder::Inverted => self.cross(train, Road::B, Road::A),
        }
    }

    fn lock(&self, road: Road) -> MutexGuard<'_, ()> {
        let mutex = match road {
            Road::A => &self.road_a,
            Road::B => &self.road_b,
        };
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cross(&self, train: &str, first: Road, second: Road) {
        let first_guard = self.lock(first);
        self.emit(CrossingEvent::Locked {
            train: train.to_string(),
            road: first,
        });

        if !self.approach_time.is_zero() {
            thread::sleep(self.approach_time);
        }

        let second_guard = self.lock(second);
        self.emit(CrossingEvent::Locked {
            train: train.to_string(),
            road: second,
        });
        self.emit(CrossingEvent::Passing {
            train: train.to_string(),
        });
        thread::sleep(self.crossing_time);

        drop(second_guard);
        self.emit(CrossingEvent::Released {
            train: train.to_string(),
            road: second,
        });
        drop(first_guard);
        self.emit(CrossingEvent::Released {
            train: train.to_string(),
            road: first,
        });
    }

    fn emit(&self, event: CrossingEvent) {
        tracing::debug!(?event, "intersection");
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }
}

// =============================================================================
// Running both trains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficPlan {
    pub rounds: usize,
    /// Upper bound of the random pause before each crossing.
    pub jitter: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficReport {
    pub crossings: usize,
    pub elapsed: Duration,
}

/// Runs train A (first resource) and train B (second resource) concurrently
/// for `plan.rounds` crossings each.
///
/// Returns [`HarnessError::Deadlock`] if both trains have not finished within
/// `plan.timeout`. Deadlocked trains are left blocked; nothing can stop a
/// thread waiting on a mutex.
pub fn run_trains(intersection: Arc<Intersection>, plan: TrafficPlan) -> Result<TrafficReport> {
    let start_line = Arc::new(Barrier::new(2));
    let (done_tx, done_rx) = channel::unbounded::<&'static str>();
    let started = Instant::now();

    let mut trains = Vec::with_capacity(2);
    for name in ["train-a", "train-b"] {
        let intersection = Arc::clone(&intersection);
        let start_line = Arc::clone(&start_line);
        let done_tx = done_tx.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut rng = rand::thread_rng();
                start_line.wait();
                for _ in 0..plan.rounds {
                    let jitter_ms = plan.jitter.as_millis() as u64;
                    if jitter_ms > 0 {
                        thread::sleep(Duration::from_millis(rng.gen_range(0..jitter_ms)));
                    }
                    if name == "train-a" {
                        intersection.cross_as_first_resource(name);
                    } else {
                        intersection.cross_as_second_resource(name);
                    }
                }
                let _ = done_tx.send(name);
            })
            .map_err(|err| HarnessError::spawn(name, err))?;
        trains.push(handle);
    }
    drop(done_tx);

    let deadline = started + plan.timeout;
    for _ in 0..trains.len() {
        match done_rx.recv_deadline(deadline) {
            Ok(name) => tracing::debug!(train = name, "train finished"),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(order = ?intersection.order(), waited = ?plan.timeout, "trains made no progress");
                return Err(HarnessError::Deadlock { waited: plan.timeout });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(HarnessError::ThreadPanicked {
                    name: "train".to_string(),
                    message: "a train stopped before finishing its rounds".to_string(),
                });
            }
        }
    }

    for train in trains {
        let _ = train.join();
    }

    Ok(TrafficReport {
        crossings: plan.rounds * 2,
        elapsed: started.elapsed(),
    })
}
