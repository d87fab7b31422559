use crate::runtime::core::Shared;
use crate::runtime::task::{TaskContext, TaskId};

use std::cell::{Cell, RefCell};
use std::ptr;
use std::sync::Arc;

thread_local! {
    /// Task whose coroutine currently runs on this thread.
    ///
    /// Installed by the worker around every resume, so code running on the
    /// coroutine can reach its own task without explicit parameter passing.
    static CURRENT_TASK: RefCell<Option<Arc<TaskContext>>> = const { RefCell::new(None) };

    /// Processor this thread works for, if it is a worker thread.
    static CURRENT_PROCESSOR: Cell<*const Shared> = const { Cell::new(ptr::null()) };

    /// Owner identity of this thread when it waits outside of any task.
    static THREAD_AGENT_ID: u64 = TaskId::next().as_u64();
}

// A task may resume on another thread after any suspension. Every accessor
// below is kept out of line so the thread-local address is looked up anew on
// each call instead of being cached across a switch.

/// Runs `f` with `task` installed as the current task of this thread.
///
/// The previous value is restored afterwards, so the worker thread is back
/// to "no task" once the coroutine suspends or finishes.
#[inline(never)]
pub(crate) fn enter_task<R>(task: &Arc<TaskContext>, f: impl FnOnce() -> R) -> R {
    let prev = CURRENT_TASK.with(|cell| cell.replace(Some(task.clone())));
    let out = f();
    CURRENT_TASK.with(|cell| cell.replace(prev));

    out
}

/// Returns the task running on this thread, if any.
#[inline(never)]
pub(crate) fn current_task() -> Option<Arc<TaskContext>> {
    CURRENT_TASK.with(|cell| cell.borrow().clone())
}

/// Identity used as lock owner: the task id inside a task, a per-thread id
/// otherwise.
#[inline(never)]
pub(crate) fn current_agent_id() -> u64 {
    CURRENT_TASK
        .with(|cell| cell.borrow().as_ref().map(|task| task.id().as_u64()))
        .unwrap_or_else(|| THREAD_AGENT_ID.with(|id| *id))
}

/// Marks this thread as a worker of `shared`.
#[inline(never)]
pub(crate) fn enter_worker(shared: &Arc<Shared>) {
    CURRENT_PROCESSOR.with(|cell| cell.set(Arc::as_ptr(shared)));
}

/// Returns `true` on the worker threads of `shared`.
#[inline(never)]
pub(crate) fn is_worker_of(shared: &Shared) -> bool {
    CURRENT_PROCESSOR.with(|cell| ptr::eq(cell.get(), shared))
}
