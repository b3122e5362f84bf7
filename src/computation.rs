//! Long-running work that honours cancellation: a blocking sleep, a power
//! computed by repeated multiplication, and factorials joined with a timeout.

use std::num::NonZeroU64;
use std::time::Duration;

use crate::cancel::{CancellationToken, Cancelled};
use crate::error::Result;
use crate::task::{spawn_task_with_token, InterruptibleTask, TaskHandle, TaskOutcome};

/// Results are reduced modulo this prime so they fit in a `u64`.
pub const MODULUS: u64 = 1_000_000_007;

/// Factorial steps between two cancellation checks.
pub const FACTORIAL_CHECK_INTERVAL: u64 = 1024;

fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

// =============================================================================
// Part 1: Blocking wait
// =============================================================================

#[derive(Debug, Clone)]
pub struct BlockingTask {
    pub duration: Duration,
}

impl BlockingTask {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl InterruptibleTask for BlockingTask {
    type Output = ();

    fn sentinel(&self) {}

    fn run(&mut self, token: &CancellationToken) -> std::result::Result<(), Cancelled> {
        token.sleep(self.duration)
    }
}

// =============================================================================
// Part 2: Power by repeated multiplication
// =============================================================================

#[derive(Debug, Clone)]
pub struct PowerTask {
    base: u64,
    power: u64,
    modulus: NonZeroU64,
}

impl PowerTask {
    pub fn new(base: u64, power: u64) -> Self {
        Self {
            base,
            power,
            modulus: NonZeroU64::new(MODULUS).unwrap_or(NonZeroU64::MIN),
        }
    }

    pub fn with_modulus(mut self, modulus: NonZeroU64) -> Self {
        self.modulus = modulus;
        self
    }
}

impl InterruptibleTask for PowerTask {
    type Output = u64;

    fn sentinel(&self) -> u64 {
        0
    }

    fn run(&mut self, token: &CancellationToken) -> std::result::Result<u64, Cancelled> {
        let modulus = self.modulus.get();
        let base = self.base % modulus;
        let mut result = 1 % modulus;
        for _ in 0..self.power {
            token.check()?;
            result = mul_mod(result, base, modulus);
        }
        Ok(result)
    }
}

// =============================================================================
// Part 3: Factorials joined with a timeout
// =============================================================================

#[derive(Debug, Clone)]
pub struct FactorialTask {
    pub n: u64,
}

impl InterruptibleTask for FactorialTask {
    type Output = u64;

    fn sentinel(&self) -> u64 {
        0
    }

    fn run(&mut self, token: &CancellationToken) -> std::result::Result<u64, Cancelled> {
        let mut result = 1 % MODULUS;
        for i in 1..=self.n {
            if i % FACTORIAL_CHECK_INTERVAL == 0 {
                token.check()?;
            }
            result = mul_mod(result, i % MODULUS, MODULUS);
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorialResult {
    Finished(u64),
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinReport {
    pub input: u64,
    pub result: FactorialResult,
}

/// Starts one factorial per input, waits on each in turn for up to `timeout`,
/// then cancels whatever is still running and waits for it to stop.
pub fn join_all_with_timeout(inputs: &[u64], timeout: Duration) -> Result<Vec<JoinReport>> {
    let token = CancellationToken::new();
    let mut handles: Vec<TaskHandle<u64>> = inputs
        .iter()
        .map(|&n| spawn_task_with_token(format!("factorial-{n}"), FactorialTask { n }, token.clone()))
        .collect::<Result<_>>()?;

    let mut reports = Vec::with_capacity(inputs.len());
    for (&input, handle) in inputs.iter().zip(handles.iter_mut()) {
        let result = match handle.join_timeout(timeout)? {
            Some(TaskOutcome::Completed(value)) => FactorialResult::Finished(*value),
            Some(TaskOutcome::Cancelled(_)) | None => FactorialResult::InProgress,
        };
        reports.push(JoinReport { input, result });
    }

    let stragglers = reports
        .iter()
        .filter(|report| report.result == FactorialResult::InProgress)
        .count();
    if stragglers > 0 {
        tracing::info!(stragglers, "cancelling factorials still in progress");
    }
    token.cancel();
    for handle in handles {
        handle.join()?;
    }

    Ok(reports)
}
