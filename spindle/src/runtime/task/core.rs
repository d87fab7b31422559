use super::state::{CANCELLED, CREATED, FINISHED, IDLE, NOTIFIED, QUEUED, RUNNING, TaskState};
use super::{ResultSlot, TaskId};
use crate::coro::{Coroutine, Job, PoolToken, Transfer};
use crate::error::{PoolError, TaskError};
use crate::runtime::context;
use crate::runtime::core::Shared;
use crate::utils::Slab;

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::task::Waker;
use std::thread;
use std::time::Duration;

/// Attempts at binding a coroutine before the task is failed.
const ACQUIRE_ATTEMPTS: u32 = 3;

/// Base delay between two binding attempts; grows linearly.
const ACQUIRE_BACKOFF: Duration = Duration::from_millis(5);

/// Type-erased state of a spawned task.
///
/// The context is shared between the processor (registry and run queue),
/// the wakers handed out while the task waits, and the [`TaskHandle`]
/// returned to the spawner. The typed result lives in a separate slot owned
/// by the handle and the body.
///
/// [`TaskHandle`]: super::TaskHandle
pub(crate) struct TaskContext {
    id: TaskId,

    /// Scheduling state, see [`super::state`].
    state: AtomicU8,

    cancel_requested: AtomicBool,

    /// Body wrapper, taken when the task first runs.
    body: Mutex<Option<Job>>,

    /// Coroutine on loan while the task is suspended.
    coroutine: Mutex<Option<Coroutine>>,

    /// Engine-level failure that prevented the body from running.
    failure: Mutex<Option<TaskError>>,

    /// Wakers of everyone waiting for the task to complete.
    joiners: Mutex<Slab<Waker>>,

    /// Key in the processor registry.
    registry_key: AtomicUsize,

    shared: Arc<Shared>,
}

impl TaskContext {
    pub(crate) fn new(body: Job, shared: Arc<Shared>) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::next(),
            state: AtomicU8::new(CREATED),
            cancel_requested: AtomicBool::new(false),
            body: Mutex::new(Some(body)),
            coroutine: Mutex::new(None),
            failure: Mutex::new(None),
            joiners: Mutex::new(Slab::new(0)),
            registry_key: AtomicUsize::new(usize::MAX),
            shared,
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state().is_final()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub(crate) fn should_cancel(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub(crate) fn take_failure(&self) -> Option<TaskError> {
        self.failure.lock().take()
    }

    pub(crate) fn registry_key(&self) -> usize {
        self.registry_key.load(Ordering::Acquire)
    }

    pub(crate) fn set_registry_key(&self, key: usize) {
        self.registry_key.store(key, Ordering::Release);
    }

    /// Hands a freshly registered task to the run queue.
    pub(crate) fn schedule(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(CREATED, QUEUED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.shared.push(self.clone());
        }
    }

    /// Signals the task to be rescheduled.
    ///
    /// If the task is `IDLE`, it moves to `QUEUED` and is pushed to the run
    /// queue. If the task is `RUNNING`, it moves to `NOTIFIED` so that the
    /// worker re-queues it as soon as it suspends.
    pub(crate) fn wake(self: &Arc<Self>) {
        loop {
            let state = self.state.load(Ordering::Acquire);

            match state {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.shared.push(self.clone());
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                // Queued, already notified, not yet scheduled or done.
                _ => return,
            }
        }
    }

    /// Sets the cancellation flag and wakes the task so that a pending
    /// cancellable wait observes it. No-op once the task has completed.
    pub(crate) fn request_cancel(self: &Arc<Self>) {
        if self.is_finished() {
            return;
        }

        if !self.cancel_requested.swap(true, Ordering::AcqRel) {
            tracing::trace!(task = %self.id, "cancellation requested");
        }

        self.wake();
    }

    /// Registers a waker fired on completion; returns its key.
    pub(crate) fn add_joiner(&self, waker: Waker) -> usize {
        self.joiners.lock().insert(waker)
    }

    pub(crate) fn remove_joiner(&self, key: usize) {
        self.joiners.lock().remove(key);
    }

    /// Executes the task until it suspends or completes.
    ///
    /// Called by a worker that popped the task from the run queue. The first
    /// run binds a coroutine from the pool; later runs resume the coroutine
    /// stored when the task last suspended.
    pub(crate) fn run(self: Arc<Self>, token: &mut PoolToken<'_>) {
        if self
            .state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let stored = self.coroutine.lock().take();

        let (coroutine, transfer) = match stored {
            Some(mut coroutine) => {
                let transfer = context::enter_task(&self, || coroutine.resume());
                (coroutine, transfer)
            }
            None => {
                let Some(body) = self.body.lock().take() else {
                    return;
                };

                if self.should_cancel() {
                    drop(body);
                    self.complete(CANCELLED);
                    return;
                }

                let mut coroutine = match self.acquire_coroutine(token) {
                    Ok(coroutine) => coroutine,
                    Err(err) => {
                        tracing::error!(task = %self.id, error = %err, "failing task, no coroutine available");
                        drop(body);
                        *self.failure.lock() = Some(TaskError::ResourceExhausted);
                        self.complete(FINISHED);
                        return;
                    }
                };

                let transfer = context::enter_task(&self, || coroutine.start(body));
                (coroutine, transfer)
            }
        };

        match transfer {
            Transfer::Suspended => {
                *self.coroutine.lock() = Some(coroutine);

                // Woken while running: re-queue right away.
                if self
                    .state
                    .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    self.state.store(QUEUED, Ordering::Release);
                    self.shared.push(self.clone());
                }
            }
            Transfer::Finished => {
                self.shared.pool().release(token, coroutine);
                self.complete(FINISHED);
            }
        }
    }

    fn acquire_coroutine(&self, token: &mut PoolToken<'_>) -> Result<Coroutine, PoolError> {
        let mut attempt = 1;

        loop {
            match self.shared.pool().acquire(token) {
                Ok(coroutine) => return Ok(coroutine),
                Err(err) if attempt < ACQUIRE_ATTEMPTS => {
                    tracing::warn!(attempt, error = %err, "coroutine allocation failed, retrying");
                    thread::sleep(ACQUIRE_BACKOFF * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Publishes the final state and wakes every joiner.
    ///
    /// `CANCELLED` is reserved for tasks whose body never ran. A body that
    /// observed cancellation and returned still leaves its value to `get`.
    fn complete(&self, state: u8) {
        self.state.store(state, Ordering::Release);

        let joiners = self.joiners.lock().drain();
        for waker in joiners {
            waker.wake();
        }

        self.shared.task_completed(self);
    }
}

/// Wraps a task body so that its outcome lands in `slot`.
pub(crate) fn wrap_body<F, T>(f: F, slot: Arc<ResultSlot<T>>) -> Job
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())));
        slot.set(outcome);
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}
