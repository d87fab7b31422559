use crate::runtime::context;
use crate::runtime::core::Shared;
use crate::runtime::task::TaskContext;
use crate::runtime::work_stealing::queue::{self, LocalQueue};

use crossbeam_deque::Stealer;
use std::sync::Arc;

/// A worker thread of a task processor.
///
/// The execution order is:
/// 1. Pop from the local batch
/// 2. Take a new batch from the global injector
/// 3. Steal from other workers
/// 4. Park if no work is available
pub(crate) struct Worker {
    /// Index of the worker, used in its thread name and to skip itself when
    /// stealing.
    id: usize,

    local: LocalQueue,

    /// Stealers of every worker's local queue, this one included.
    stealers: Arc<Vec<Stealer<Arc<TaskContext>>>>,

    shared: Arc<Shared>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        local: LocalQueue,
        stealers: Arc<Vec<Stealer<Arc<TaskContext>>>>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            id,
            local,
            stealers,
            shared,
        }
    }

    /// Runs the worker loop until the processor shuts down.
    ///
    /// Each task found is run on a coroutine bound through this worker's
    /// pool token; cached coroutines return to the pool when the loop ends.
    pub(crate) fn run(self) {
        context::enter_worker(&self.shared);
        tracing::trace!(worker = self.id, "worker started");

        let mut token = self.shared.pool().token();

        loop {
            if let Some(task) = self.find_task() {
                task.run(&mut token);
                continue;
            }

            if self.shared.injector().is_shutdown() {
                break;
            }

            self.shared.injector().park();
        }

        drop(token);
        tracing::trace!(worker = self.id, "worker stopped");
    }

    fn find_task(&self) -> Option<Arc<TaskContext>> {
        self.local
            .pop()
            .or_else(|| self.shared.injector().steal_batch_and_pop(&self.local))
            .or_else(|| self.try_steal())
    }

    /// Attempts to steal a task from another worker's local queue.
    ///
    /// Workers are visited in a round-robin fashion to avoid
    /// starvation and distribute load evenly.
    fn try_steal(&self) -> Option<Arc<TaskContext>> {
        let len = self.stealers.len();

        if len <= 1 {
            return None;
        }

        (1..len)
            .map(|i| (self.id + i) % len)
            .find_map(|victim| queue::steal(&self.stealers[victim]))
    }
}
