//! Multithreading hazards, reproduced and fixed.
//!
//! Each module is a self-contained demonstration:
//!
//! - [`counter`]: lost updates on a shared counter, and the `y > x` data race
//! - [`intersection`]: lock-ordering deadlock between two trains
//! - [`cancel`], [`task`], [`computation`]: cooperative cancellation and joins with timeouts
//! - [`pool`]: a fixed-size FIFO worker pool that survives panicking jobs
//! - [`word_count`], [`server`]: the word count HTTP server used for throughput runs
//! - [`vault`]: racing threads stopped through a shared token
//! - [`prices`]: a lock-protected price ticker read with `try_lock`

pub mod cancel;
pub mod computation;
pub mod config;
pub mod counter;
pub mod error;
pub mod intersection;
pub mod logging;
pub mod pool;
pub mod prices;
pub mod server;
pub mod task;
pub mod vault;
pub mod word_count;

pub use cancel::{CancellationToken, Cancelled};
pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use pool::WorkerPool;
pub use task::{InterruptibleTask, TaskHandle, TaskOutcome, TaskState};
