use super::queue::LocalQueue;
use crate::runtime::task::TaskContext;

use crossbeam_deque::Steal;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Upper bound on how long an idle worker sleeps before looking again.
const PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// Global run queue of a task processor.
///
/// Every enqueue (spawn, wake-up, re-queue after a notification) goes
/// through the injector, so tasks are served in FIFO order and nothing
/// starves behind a worker's local batch.
///
/// It also coordinates worker parking and waking using a condition
/// variable, allowing workers to sleep when no work is available.
pub(crate) struct Injector {
    queue: crossbeam_deque::Injector<Arc<TaskContext>>,

    /// Number of parked worker threads.
    parked: AtomicUsize,

    lock: Mutex<()>,

    /// Condition variable used to wake parked workers.
    condvar: Condvar,

    /// Indicates whether the processor is shutting down.
    shutdown: AtomicBool,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            queue: crossbeam_deque::Injector::new(),
            parked: AtomicUsize::new(0),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Signals shutdown and wakes all parked workers.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let _guard = self.lock.lock();
        self.condvar.notify_all();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Pushes a task and wakes one parked worker, if any.
    pub(crate) fn push(&self, task: Arc<TaskContext>) {
        self.queue.push(task);

        if self.parked.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.condvar.notify_one();
        }
    }

    /// Parks the current worker until work arrives, shutdown is signalled,
    /// or the park timeout elapses.
    pub(crate) fn park(&self) {
        let mut guard = self.lock.lock();
        self.parked.fetch_add(1, Ordering::SeqCst);

        if self.queue.is_empty() && !self.shutdown.load(Ordering::SeqCst) {
            self.condvar.wait_for(&mut guard, PARK_TIMEOUT);
        }

        self.parked.fetch_sub(1, Ordering::SeqCst);
    }

    /// Moves a batch of tasks into `local` and returns one of them.
    pub(crate) fn steal_batch_and_pop(&self, local: &LocalQueue) -> Option<Arc<TaskContext>> {
        loop {
            match self.queue.steal_batch_and_pop(local.worker()) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }
}
