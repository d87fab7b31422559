use super::TaskId;
use super::core::TaskContext;
use super::state::TaskState;
use crate::error::{TaskError, WaitError};
use crate::runtime::park::Parker;
use crate::time::Deadline;

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Storage for the outcome of a task body.
pub(crate) struct ResultSlot<T> {
    value: Mutex<Option<Result<T, TaskError>>>,
}

impl<T> ResultSlot<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(None),
        })
    }

    pub(crate) fn set(&self, outcome: Result<T, TaskError>) {
        *self.value.lock() = Some(outcome);
    }

    fn take(&self) -> Option<Result<T, TaskError>> {
        self.value.lock().take()
    }
}

/// A handle to a spawned task.
///
/// The handle observes the task state, requests cancellation, waits for
/// completion and retrieves the result with [`get`](Self::get).
///
/// Dropping the handle does **not** cancel the task; the task keeps running
/// detached and its result is discarded.
pub struct TaskHandle<T> {
    context: Arc<TaskContext>,
    slot: Arc<ResultSlot<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(context: Arc<TaskContext>, slot: Arc<ResultSlot<T>>) -> Self {
        Self { context, slot }
    }

    pub fn id(&self) -> TaskId {
        self.context.id()
    }

    pub fn state(&self) -> TaskState {
        self.context.state()
    }

    /// Returns `true` once the task is `Finished` or `Cancelled`.
    pub fn is_finished(&self) -> bool {
        self.context.is_finished()
    }

    /// Asks the task to stop.
    ///
    /// The task observes the request at its next cancellable wait or when it
    /// polls [`task::should_cancel`](crate::task::should_cancel). A task that
    /// has not started yet never runs its body; one that has started ends
    /// with whatever its body returns. Cancelling a completed task
    /// is a no-op.
    pub fn request_cancel(&self) {
        self.context.request_cancel();
    }

    /// Waits until the task completes.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Cancelled`] if the *calling* task is cancelled
    /// while waiting.
    pub fn wait(&self) -> Result<(), WaitError> {
        self.wait_until(Deadline::unreachable())
    }

    pub fn wait_for(&self, timeout: Duration) -> Result<(), WaitError> {
        self.wait_until(Deadline::from_duration(timeout))
    }

    /// Waits until the task completes or `deadline` is reached.
    pub fn wait_until(&self, deadline: Deadline) -> Result<(), WaitError> {
        if self.is_finished() {
            return Ok(());
        }

        let mut parker = Parker::current();
        let key = self.context.add_joiner(parker.waker());

        let result = loop {
            if self.is_finished() {
                break Ok(());
            }
            if deadline.is_reached() {
                break Err(WaitError::Timeout);
            }
            if parker.should_cancel() {
                break Err(WaitError::Cancelled);
            }
            parker.park(deadline);
        };

        self.context.remove_joiner(key);
        result
    }

    /// Waits for the task and returns its result.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Cancelled`] if the task was cancelled before its body
    ///   started,
    /// - [`TaskError::Panicked`] if its body panicked,
    /// - [`TaskError::ResourceExhausted`] if no coroutine could run it,
    /// - [`TaskError::WaitInterrupted`] if the caller was cancelled first.
    pub fn get(self) -> Result<T, TaskError> {
        self.wait().map_err(|_| TaskError::WaitInterrupted)?;

        if self.context.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        if let Some(failure) = self.context.take_failure() {
            return Err(failure);
        }

        self.slot.take().unwrap_or(Err(TaskError::Cancelled))
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
