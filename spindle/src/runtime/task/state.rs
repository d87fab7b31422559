//! Scheduling states of a task, stored in an `AtomicU8`.
//!
//! `NOTIFIED` is transient: the worker turns it back into `QUEUED` once the
//! running slice ends. `FINISHED` and `CANCELLED` are final.

/// Spawned but not yet handed to the run queue.
pub(crate) const CREATED: u8 = 0;

/// Task is queued for execution.
///
/// The task sits in a run queue, exactly once.
pub(crate) const QUEUED: u8 = 1;

/// Task is currently being executed by a worker.
///
/// At most one worker may observe this state at a time.
pub(crate) const RUNNING: u8 = 2;

/// Task has been woken while running.
///
/// The worker re-queues it as soon as the coroutine suspends.
pub(crate) const NOTIFIED: u8 = 3;

/// Task is suspended and waits for a wake-up.
pub(crate) const IDLE: u8 = 4;

/// The body returned, or failed to start.
pub(crate) const FINISHED: u8 = 5;

/// Cancellation was requested before the body started; it never ran.
pub(crate) const CANCELLED: u8 = 6;

/// Observable state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Spawned, not yet queued.
    Created,

    /// Waiting in the run queue.
    Queued,

    /// Executing on a worker thread.
    Running,

    /// Suspended at a wait point.
    Suspended,

    /// The body ran to completion, even if it returned early because
    /// cancellation was requested.
    Finished,

    /// Cancelled before the body started; the body never ran.
    Cancelled,
}

impl TaskState {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            CREATED => TaskState::Created,
            QUEUED => TaskState::Queued,
            RUNNING | NOTIFIED => TaskState::Running,
            IDLE => TaskState::Suspended,
            FINISHED => TaskState::Finished,
            _ => TaskState::Cancelled,
        }
    }

    /// Returns `true` for `Finished` and `Cancelled`.
    pub fn is_final(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled)
    }
}
