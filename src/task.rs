//! Interruptible tasks running on their own named thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};

use crate::cancel::{CancellationToken, Cancelled};
use crate::error::{panic_message, HarnessError, Result};

/// Work that can be stopped cooperatively through a [`CancellationToken`].
pub trait InterruptibleTask: Send + 'static {
    type Output: Send + 'static;

    /// The value reported instead of a real result when the task is cancelled.
    fn sentinel(&self) -> Self::Output;

    fn run(&mut self, token: &CancellationToken) -> std::result::Result<Self::Output, Cancelled>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Running = 0,
    Cancelled = 1,
    Completed = 2,
    /// The task panicked.
    Failed = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Cancelled,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// Holds the task's sentinel.
    Cancelled(T),
}

impl<T> TaskOutcome<T> {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed(_) => TaskState::Completed,
            Self::Cancelled(_) => TaskState::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Completed(value) | Self::Cancelled(value) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Completed(value) | Self::Cancelled(value) => value,
        }
    }
}

type Report<T> = std::result::Result<TaskOutcome<T>, String>;

pub struct TaskHandle<T> {
    name: String,
    token: CancellationToken,
    state: Arc<AtomicU8>,
    receiver: Receiver<Report<T>>,
    report: Option<Report<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Requests cancellation. Has no effect on a task that already finished,
    /// and repeating it changes nothing.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits up to `timeout` for the task to finish. `Ok(None)` means it is
    /// still running; it keeps running after this returns. Once the task has
    /// reported, every call returns the same result.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<Option<&TaskOutcome<T>>> {
        if self.report.is_none() {
            match self.receiver.recv_timeout(timeout) {
                Ok(report) => self.report = Some(report),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(self.lost()),
            }
        }
        match &self.report {
            Some(Ok(outcome)) => Ok(Some(outcome)),
            Some(Err(message)) => Err(self.panicked(message.clone())),
            None => Ok(None),
        }
    }

    /// Blocks until the task finishes.
    pub fn join(mut self) -> Result<TaskOutcome<T>> {
        let report = match self.report.take() {
            Some(report) => report,
            None => self.receiver.recv().map_err(|_| self.lost())?,
        };
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        report.map_err(|message| self.panicked(message))
    }

    fn panicked(&self, message: String) -> HarnessError {
        HarnessError::ThreadPanicked {
            name: self.name.clone(),
            message,
        }
    }

    fn lost(&self) -> HarnessError {
        self.panicked("task thread exited without reporting an outcome".to_string())
    }
}

pub fn spawn_task<T>(name: impl Into<String>, task: T) -> Result<TaskHandle<T::Output>>
where
    T: InterruptibleTask,
{
    spawn_task_with_token(name, task, CancellationToken::new())
}

/// Spawns `task` observing `token`. A token cancelled before the spawn makes
/// the task finish as cancelled without running.
pub fn spawn_task_with_token<T>(
    name: impl Into<String>,
    mut task: T,
    token: CancellationToken,
) -> Result<TaskHandle<T::Output>>
where
    T: InterruptibleTask,
{
    let name = name.into();
    let state = Arc::new(AtomicU8::new(TaskState::Running as u8));
    let (sender, receiver) = channel::bounded(1);

    let thread = {
        let token = token.clone();
        let state = Arc::clone(&state);
        let thread_name = name.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    if token.is_cancelled() {
                        return TaskOutcome::Cancelled(task.sentinel());
                    }
                    match task.run(&token) {
                        Ok(value) => TaskOutcome::Completed(value),
                        Err(Cancelled) => TaskOutcome::Cancelled(task.sentinel()),
                    }
                }));

                let report = match result {
                    Ok(outcome) => {
                        state.store(outcome.state() as u8, Ordering::SeqCst);
                        tracing::debug!(task = %thread_name, state = ?outcome.state(), "task finished");
                        Ok(outcome)
                    }
                    Err(payload) => {
                        state.store(TaskState::Failed as u8, Ordering::SeqCst);
                        let message = panic_message(payload.as_ref());
                        tracing::error!(task = %thread_name, %message, "task panicked");
                        Err(message)
                    }
                };
                let _ = sender.send(report);
            })
            .map_err(|err| HarnessError::spawn(name.clone(), err))?
    };

    Ok(TaskHandle {
        name,
        token,
        state,
        receiver,
        report: None,
        thread: Some(thread),
    })
}
