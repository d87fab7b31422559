use super::{TaskHandle, TaskId};
use crate::coro;
use crate::error::{SpawnError, WaitError};
use crate::runtime::context;

use std::thread;

/// Spawns a task on the processor running the current task.
///
/// # Errors
///
/// Returns [`SpawnError::Stopped`] once the processor is shutting down.
///
/// # Panics
///
/// Panics if called outside of a task.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = task::spawn(|| 6 * 7)?;
/// assert_eq!(handle.get()?, 42);
/// ```
pub fn spawn<F, T>(f: F) -> Result<TaskHandle<T>, SpawnError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let current = context::current_task()
        .expect("spawn must be called from a task running on a task processor");

    current.shared().spawn(f)
}

/// Yields execution back to the processor.
///
/// The current task goes to the back of the run queue, letting every task
/// queued before it make progress. Outside of a task this yields the OS
/// thread.
pub fn yield_now() {
    match context::current_task() {
        Some(task) => {
            task.wake();
            drop(task);
            coro::suspend();
        }
        None => thread::yield_now(),
    }
}

/// Returns `true` if cancellation of the current task was requested.
///
/// Always `false` outside of a task.
pub fn should_cancel() -> bool {
    context::current_task().is_some_and(|task| task.should_cancel())
}

/// Returns `Err(WaitError::Cancelled)` if the current task should stop.
///
/// Convenient in long computations: `task::cancellation_point()?;`.
pub fn cancellation_point() -> Result<(), WaitError> {
    if should_cancel() {
        Err(WaitError::Cancelled)
    } else {
        Ok(())
    }
}

/// Identifier of the current task, if any.
pub fn current_id() -> Option<TaskId> {
    context::current_task().map(|task| task.id())
}

/// Returns `true` when called from a task body.
pub fn is_in_task() -> bool {
    context::current_task().is_some()
}
