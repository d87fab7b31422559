use crate::coro::PoolStats;

/// Point-in-time counters of a [`TaskProcessor`](super::TaskProcessor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub worker_threads: usize,

    /// Tasks spawned and not yet completed.
    pub tasks_alive: usize,

    pub tasks_spawned: u64,

    /// Tasks whose body ran to completion.
    pub tasks_finished: u64,

    /// Tasks cancelled before their body started.
    pub tasks_cancelled: u64,

    pub coroutines: PoolStats,
}
