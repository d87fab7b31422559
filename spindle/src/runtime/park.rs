use crate::coro;
use crate::runtime::context;
use crate::runtime::task::TaskContext;
use crate::runtime::task::waker::make_waker;
use crate::runtime::timer::TimerGuard;
use crate::time::Deadline;

use std::sync::Arc;
use std::task::{Wake, Waker};
use std::thread::{self, Thread};

/// Wakes a thread parked outside of any task.
struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Whoever is waiting: the current task, or the current OS thread when
/// called outside of a task.
///
/// Wait loops build one `Parker` per wait, hand out its [`waker`] and call
/// [`park`] until their condition holds. Wake-ups may be spurious; callers
/// always re-check.
///
/// [`waker`]: Parker::waker
/// [`park`]: Parker::park
pub(crate) enum Parker {
    Task {
        task: Arc<TaskContext>,
        timer: TimerGuard,
    },
    Thread {
        thread: Thread,
    },
}

impl Parker {
    pub(crate) fn current() -> Self {
        match context::current_task() {
            Some(task) => Parker::Task {
                task,
                timer: TimerGuard::default(),
            },
            None => Parker::Thread {
                thread: thread::current(),
            },
        }
    }

    /// Owner identity, consistent with [`context::current_agent_id`].
    pub(crate) fn id(&self) -> u64 {
        match self {
            Parker::Task { task, .. } => task.id().as_u64(),
            Parker::Thread { .. } => context::current_agent_id(),
        }
    }

    pub(crate) fn waker(&self) -> Waker {
        match self {
            Parker::Task { task, .. } => make_waker(task.clone()),
            Parker::Thread { thread } => Waker::from(Arc::new(ThreadWaker(thread.clone()))),
        }
    }

    /// Cancellation is only ever requested for tasks.
    pub(crate) fn should_cancel(&self) -> bool {
        match self {
            Parker::Task { task, .. } => task.should_cancel(),
            Parker::Thread { .. } => false,
        }
    }

    /// Suspends the task (or parks the thread) until woken or until
    /// `deadline`, whichever comes first.
    ///
    /// A task arms the processor timer on its first timed park; the entry
    /// is retracted when the `Parker` is dropped. All parks of one `Parker`
    /// must use the same deadline.
    pub(crate) fn park(&mut self, deadline: Deadline) {
        match self {
            Parker::Task { task, timer } => {
                debug_assert!(coro::in_coroutine(), "task parker used off its coroutine");
                if let Some(at) = deadline.instant() {
                    if !timer.is_armed() {
                        timer.arm(task.shared().timer(), make_waker(task.clone()), at);
                    }
                }
                coro::suspend();
            }
            Parker::Thread { .. } => match deadline.time_left() {
                Some(left) => thread::park_timeout(left),
                None => thread::park(),
            },
        }
    }
}
