use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Returned by a check point or an interruptible wait that observed a
/// cancellation request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cancelled")]
pub struct Cancelled;

struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// A cooperative cancellation signal shared between a task and whoever may stop it.
///
/// Computation loops poll [`CancellationToken::check`]; blocking waits go
/// through [`CancellationToken::sleep`], which returns as soon as `cancel` is called.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Requests cancellation. Calling it again is a no-op.
    pub fn cancel(&self) {
        // Taking the lock orders the store against a sleeper that has checked
        // the flag but not yet parked on the condvar.
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` unless cancelled first. A duration too large to
    /// form a deadline sleeps until cancelled.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now().checked_add(duration);
        let mut guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    self.inner
                        .wake
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.inner.wake.wait(guard).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Blocks until cancelled or until `timeout` elapses. Returns whether the
    /// token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.sleep(timeout).is_err()
    }
}
