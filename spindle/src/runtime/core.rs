use super::builder::TaskProcessorConfig;
use super::context;
use super::executor::core::Executor;
use super::stats::ProcessorStats;
use super::task::core::wrap_body;
use super::task::{ResultSlot, TaskContext, TaskHandle};
use super::timer::TimerHandle;
use super::work_stealing::injector::Injector;
use crate::coro::Pool;
use crate::error::{BuildError, SpawnError, TaskError};
use crate::utils::Slab;

use parking_lot::{Condvar, Mutex};
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How often a shutdown blocked on live tasks reports progress.
const SHUTDOWN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Live tasks and the admission flag, guarded together so that no task is
/// admitted once shutdown has started.
struct Registry {
    tasks: Slab<Arc<TaskContext>>,
    stopping: bool,
}

/// State shared by the processor handle, its workers, and every task.
pub(crate) struct Shared {
    name: String,
    worker_threads: usize,
    injector: Injector,
    pool: Pool,
    timer: TimerHandle,
    registry: Mutex<Registry>,

    /// Notified when the last live task completes during shutdown.
    drained: Condvar,

    spawned: AtomicU64,
    finished: AtomicU64,
    cancelled: AtomicU64,
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    pub(crate) fn timer(&self) -> &TimerHandle {
        &self.timer
    }

    pub(crate) fn injector(&self) -> &Injector {
        &self.injector
    }

    pub(crate) fn push(&self, task: Arc<TaskContext>) {
        self.injector.push(task);
    }

    /// Creates, registers and queues a task running `f`.
    pub(crate) fn spawn<F, T>(self: &Arc<Self>, f: F) -> Result<TaskHandle<T>, SpawnError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let slot = ResultSlot::new();
        let task = TaskContext::new(wrap_body(f, slot.clone()), self.clone());

        {
            let mut registry = self.registry.lock();
            if registry.stopping {
                return Err(SpawnError::Stopped);
            }
            let key = registry.tasks.insert(task.clone());
            task.set_registry_key(key);
        }

        self.spawned.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(task = %task.id(), processor = %self.name, "task spawned");

        task.schedule();
        Ok(TaskHandle::new(task, slot))
    }

    /// Called by a task once it reached its final state.
    pub(crate) fn task_completed(&self, task: &TaskContext) {
        if task.is_cancelled() {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.finished.fetch_add(1, Ordering::Relaxed);
        }

        let mut registry = self.registry.lock();
        registry.tasks.remove(task.registry_key());

        if registry.stopping && registry.tasks.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Stops admission, cancels every live task and waits for all of them.
    fn drain(&self) {
        let mut registry = self.registry.lock();

        if !registry.stopping {
            registry.stopping = true;
            tracing::info!(
                processor = %self.name,
                alive = registry.tasks.len(),
                "stopping task processor"
            );

            for task in registry.tasks.iter() {
                task.request_cancel();
            }
        }

        let started = Instant::now();
        while !registry.tasks.is_empty() {
            if self
                .drained
                .wait_for(&mut registry, SHUTDOWN_REPORT_INTERVAL)
                .timed_out()
            {
                tracing::warn!(
                    processor = %self.name,
                    alive = registry.tasks.len(),
                    elapsed = ?started.elapsed(),
                    "waiting for cancelled tasks to finish"
                );
            }
        }
    }
}

/// A cooperative scheduler running tasks on stackful coroutines.
///
/// `TaskProcessor` owns:
/// - a fixed set of worker threads sharing a work-stealing run queue,
/// - a pool of coroutines the tasks are bound to while they run,
/// - a timer thread waking tasks whose timed waits expire.
///
/// Task bodies are plain closures. They suspend at the waits of this crate
/// (mutexes, sleeps, joins, [`yield_now`](crate::task::yield_now)) instead
/// of blocking their worker thread.
///
/// Dropping the processor shuts it down, see [`shutdown`](Self::shutdown).
pub struct TaskProcessor {
    shared: Arc<Shared>,
    executor: Mutex<Executor>,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
}

impl TaskProcessor {
    pub(crate) fn new(config: TaskProcessorConfig) -> Result<Self, BuildError> {
        let pool = Pool::new(config.pool)?;
        let (timer, timer_thread) = TimerHandle::start(&config.name)?;

        let shared = Arc::new(Shared {
            name: config.name,
            worker_threads: config.worker_threads,
            injector: Injector::new(),
            pool,
            timer: timer.clone(),
            registry: Mutex::new(Registry {
                tasks: Slab::new(0),
                stopping: false,
            }),
            drained: Condvar::new(),
            spawned: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        });

        let executor = match Executor::start(&shared, config.worker_threads) {
            Ok(executor) => executor,
            Err(err) => {
                timer.shutdown();
                let _ = timer_thread.join();
                return Err(err.into());
            }
        };

        tracing::info!(
            processor = %shared.name,
            worker_threads = shared.worker_threads,
            stack_size = shared.pool.stack_size(),
            "task processor started"
        );

        Ok(Self {
            shared,
            executor: Mutex::new(executor),
            timer_thread: Mutex::new(Some(timer_thread)),
        })
    }

    /// Spawns a task running `f`.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::Stopped`] once shutdown has begun.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let handle = processor.spawn(|| 40 + 2)?;
    /// assert_eq!(handle.get()?, 42);
    /// ```
    pub fn spawn<F, T>(&self, f: F) -> Result<TaskHandle<T>, SpawnError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.shared.spawn(f)
    }

    /// Runs `f` as a task and blocks the calling thread until it returns.
    ///
    /// This is the synchronous entry point of the processor (e.g. in `main`
    /// or tests).
    ///
    /// # Panics
    ///
    /// Panics if the processor is stopped, if the task is cancelled, and
    /// re-raises the panic of the task body.
    pub fn block_on<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = match self.spawn(f) {
            Ok(handle) => handle,
            Err(err) => panic!("block_on failed: {err}"),
        };

        match handle.get() {
            Ok(value) => value,
            Err(TaskError::Panicked(msg)) => panic::resume_unwind(Box::new(msg)),
            Err(err) => panic!("block_on failed: {err}"),
        }
    }

    /// Returns approximate counters of the processor and its pool.
    pub fn stats(&self) -> ProcessorStats {
        let tasks_alive = self.shared.registry.lock().tasks.len();

        ProcessorStats {
            worker_threads: self.shared.worker_threads,
            tasks_alive,
            tasks_spawned: self.shared.spawned.load(Ordering::Relaxed),
            tasks_finished: self.shared.finished.load(Ordering::Relaxed),
            tasks_cancelled: self.shared.cancelled.load(Ordering::Relaxed),
            coroutines: self.shared.pool.stats(),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn worker_threads(&self) -> usize {
        self.shared.worker_threads
    }

    /// Shuts the processor down.
    ///
    /// 1. Stops accepting new tasks
    /// 2. Requests cancellation of every live task and waits for all of them
    /// 3. Stops and joins the workers, then the timer thread
    ///
    /// Calling it again is a no-op.
    ///
    /// # Panics
    ///
    /// Panics when called (or when the processor is dropped) from one of its
    /// own tasks: the wait for live tasks would never end.
    pub fn shutdown(&self) {
        assert!(
            !context::is_worker_of(&self.shared),
            "task processor `{}` shut down from one of its own tasks",
            self.shared.name
        );

        self.shared.drain();

        self.shared.injector.shutdown();
        self.executor.lock().join();

        if let Some(handle) = self.timer_thread.lock().take() {
            self.shared.timer.shutdown();
            let _ = handle.join();
            tracing::info!(processor = %self.shared.name, "task processor stopped");
        }
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
