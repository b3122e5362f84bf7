//! A fixed-size thread pool draining one FIFO queue.
//!
//! Workers pull jobs from a shared crossbeam channel, so jobs start in the
//! order they were submitted and at most `size` run at once. A job that panics
//! is caught at the worker boundary and handed to the pool's failure handler;
//! the worker then moves on to the next job.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::{panic_message, HarnessError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    Unbounded,
    /// `submit` waits for room when the queue holds this many jobs.
    Block(usize),
    /// `submit` fails with [`HarnessError::QueueFull`] when the queue holds this many jobs.
    Reject(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub worker: String,
    pub message: String,
}

pub type FailureHandler = Arc<dyn Fn(TaskFailure) + Send + Sync>;

fn log_failure() -> FailureHandler {
    Arc::new(|failure: TaskFailure| {
        tracing::error!(
            worker = %failure.worker,
            "A critical error happened in thread {}: {}",
            failure.worker,
            failure.message
        );
    })
}

// =============================================================================
// Builder
// =============================================================================

pub struct PoolBuilder {
    size: usize,
    queue: QueuePolicy,
    name_prefix: String,
    on_failure: FailureHandler,
}

impl PoolBuilder {
    pub fn queue(mut self, queue: QueuePolicy) -> Self {
        self.queue = queue;
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn on_failure<F>(mut self, handler: F) -> Self
    where
        F: Fn(TaskFailure) + Send + Sync + 'static,
    {
        self.on_failure = Arc::new(handler);
        self
    }

    pub fn build(self) -> Result<WorkerPool> {
        if self.size == 0 {
            return Err(HarnessError::config("worker pool needs at least one worker"));
        }
        let (sender, receiver) = match self.queue {
            QueuePolicy::Unbounded => channel::unbounded(),
            QueuePolicy::Block(0) | QueuePolicy::Reject(0) => {
                return Err(HarnessError::config("worker pool queue capacity must be greater than zero"));
            }
            QueuePolicy::Block(capacity) | QueuePolicy::Reject(capacity) => channel::bounded(capacity),
        };

        let active = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(self.size);
        for id in 0..self.size {
            let name = format!("{}-{id}", self.name_prefix);
            let worker = Worker {
                name: name.clone(),
                receiver: receiver.clone(),
                active: Arc::clone(&active),
                completed: Arc::clone(&completed),
                on_failure: Arc::clone(&self.on_failure),
            };
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker.run())
                .map_err(|err| HarnessError::spawn(name, err))?;
            workers.push(handle);
        }

        tracing::info!(size = self.size, queue = ?self.queue, "worker pool started");
        Ok(WorkerPool {
            size: self.size,
            queue: self.queue,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            active,
            completed,
        })
    }
}

// =============================================================================
// Workers
// =============================================================================

struct Worker {
    name: String,
    receiver: Receiver<Job>,
    active: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    on_failure: FailureHandler,
}

impl Worker {
    fn run(self) {
        // recv fails once every sender is gone and the queue is drained.
        while let Ok(job) = self.receiver.recv() {
            self.active.fetch_add(1, Ordering::SeqCst);
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);

            if let Err(payload) = result {
                (self.on_failure)(TaskFailure {
                    worker: self.name.clone(),
                    message: panic_message(payload.as_ref()),
                });
            }
        }
        tracing::debug!(worker = %self.name, "worker exiting");
    }
}

// =============================================================================
// Pool
// =============================================================================

pub struct WorkerPool {
    size: usize,
    queue: QueuePolicy,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn builder(size: usize) -> PoolBuilder {
        PoolBuilder {
            size,
            queue: QueuePolicy::Unbounded,
            name_prefix: "worker".to_string(),
            on_failure: log_failure(),
        }
    }

    pub fn new(size: usize) -> Result<Self> {
        Self::builder(size).build()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently executing.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Jobs that have finished, successfully or by panicking.
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn queued_count(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Sender::len)
    }

    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // Clone the sender so a blocking send does not hold the lock.
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(HarnessError::PoolShutDown)?;
        let job: Job = Box::new(job);

        match self.queue {
            QueuePolicy::Reject(capacity) => sender.try_send(job).map_err(|err| match err {
                TrySendError::Full(_) => HarnessError::QueueFull { capacity },
                TrySendError::Disconnected(_) => HarnessError::PoolShutDown,
            }),
            QueuePolicy::Unbounded | QueuePolicy::Block(_) => {
                sender.send(job).map_err(|_| HarnessError::PoolShutDown)
            }
        }
    }

    /// Stops accepting jobs, lets the workers finish everything already
    /// queued, and joins them. Concurrent callers all return only after the
    /// workers have exited.
    pub fn shutdown(&self) {
        // Held across the joins so a second caller blocks until they finish.
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());
        if workers.is_empty() {
            return;
        }

        for worker in workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked outside of a job");
            }
        }
        tracing::info!(completed = self.completed_count(), "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(50);

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(HarnessError::Config(_))));
        assert!(matches!(
            WorkerPool::builder(1).queue(QueuePolicy::Reject(0)).build(),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_bounded_concurrency_and_fifo_start_order() {
        let pool = WorkerPool::new(2).unwrap();
        let (started_tx, started_rx) = channel::unbounded();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut releases = Vec::new();
        for id in 0..5 {
            let (release_tx, release_rx) = channel::bounded::<()>(0);
            releases.push(release_tx);
            let started_tx = started_tx.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                started_tx.send(id).unwrap();
                release_rx.recv().unwrap();
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let mut first: Vec<usize> = (0..2).map(|_| started_rx.recv_timeout(WAIT).unwrap()).collect();
        first.sort_unstable();
        assert_eq!(first, vec![0, 1]);
        assert!(started_rx.recv_timeout(QUIET).is_err());
        assert_eq!(pool.queued_count(), 3);

        for (release, expected) in [(0, 2), (1, 3), (2, 4)] {
            releases[release].send(()).unwrap();
            assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), expected);
            assert!(started_rx.recv_timeout(QUIET).is_err());
        }

        releases[3].send(()).unwrap();
        releases[4].send(()).unwrap();
        pool.shutdown();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.completed_count(), 5);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_panicking_job_reported_and_pool_survives() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let pool = WorkerPool::builder(1)
            .name_prefix("test-thread")
            .on_failure(move |failure| sink.lock().unwrap().push(failure))
            .build()
            .unwrap();

        pool.submit(|| panic!("Occurred RuntimeException !!")).unwrap();
        let (done_tx, done_rx) = channel::bounded(1);
        pool.submit(move || done_tx.send(42).unwrap()).unwrap();

        assert_eq!(done_rx.recv_timeout(WAIT).unwrap(), 42);
        pool.shutdown();

        let failures = failures.lock().unwrap();
        assert_eq!(
            *failures,
            vec![TaskFailure {
                worker: "test-thread-0".to_string(),
                message: "Occurred RuntimeException !!".to_string(),
            }]
        );
    }

    #[test]
    fn test_shutdown_drains_queue_then_rejects() {
        let pool = WorkerPool::new(2).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let finished = Arc::clone(&finished);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(10));
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(finished.load(Ordering::SeqCst), 10);
        assert!(matches!(pool.submit(|| {}), Err(HarnessError::PoolShutDown)));
        pool.shutdown();
    }

    #[test]
    fn test_concurrent_shutdown_waits_for_in_flight_job() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let (started_tx, started_rx) = channel::bounded(1);
        let finished = Arc::new(AtomicUsize::new(0));
        {
            let finished = Arc::clone(&finished);
            pool.submit(move || {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(300));
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        started_rx.recv_timeout(WAIT).unwrap();

        let first = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.shutdown())
        };
        thread::sleep(QUIET);
        pool.shutdown();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        first.join().unwrap();
        assert_eq!(pool.completed_count(), 1);
    }

    #[test]
    fn test_reject_policy_reports_full_queue() {
        let pool = WorkerPool::builder(1).queue(QueuePolicy::Reject(1)).build().unwrap();
        let (started_tx, started_rx) = channel::bounded(1);
        let (release_tx, release_rx) = channel::bounded::<()>(0);

        pool.submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();

        pool.submit(|| {}).unwrap();
        assert!(matches!(pool.submit(|| {}), Err(HarnessError::QueueFull { capacity: 1 })));

        release_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(pool.completed_count(), 2);
    }

    #[test]
    fn test_block_policy_waits_for_room() {
        let pool = Arc::new(WorkerPool::builder(1).queue(QueuePolicy::Block(1)).build().unwrap());
        let (started_tx, started_rx) = channel::bounded(1);
        let (release_tx, release_rx) = channel::bounded::<()>(0);

        pool.submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();
        pool.submit(|| {}).unwrap();

        let (submitted_tx, submitted_rx) = channel::bounded(1);
        let submitter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                pool.submit(|| {}).unwrap();
                submitted_tx.send(()).unwrap();
            })
        };

        assert!(submitted_rx.recv_timeout(QUIET).is_err());
        release_tx.send(()).unwrap();
        submitted_rx.recv_timeout(WAIT).unwrap();
        submitter.join().unwrap();

        pool.shutdown();
        assert_eq!(pool.completed_count(), 3);
    }
}
