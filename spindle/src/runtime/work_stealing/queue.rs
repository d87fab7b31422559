use crate::runtime::task::TaskContext;

use crossbeam_deque::{Steal, Stealer, Worker};
use std::sync::Arc;

/// A per-worker local run queue.
///
/// It holds the batch a worker took from the injector. Tasks are popped in
/// FIFO order so a batch keeps the global submission order; other workers
/// steal from the same end through a [`Stealer`].
pub(crate) struct LocalQueue {
    inner: Worker<Arc<TaskContext>>,
}

impl LocalQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Worker::new_fifo(),
        }
    }

    pub(crate) fn stealer(&self) -> Stealer<Arc<TaskContext>> {
        self.inner.stealer()
    }

    pub(crate) fn worker(&self) -> &Worker<Arc<TaskContext>> {
        &self.inner
    }

    /// Pops the next task of the local batch.
    pub(crate) fn pop(&self) -> Option<Arc<TaskContext>> {
        self.inner.pop()
    }
}

/// Steals a task from another worker's local queue.
pub(crate) fn steal(stealer: &Stealer<Arc<TaskContext>>) -> Option<Arc<TaskContext>> {
    loop {
        match stealer.steal() {
            Steal::Success(task) => return Some(task),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}
