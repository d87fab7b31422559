use super::TaskProcessor;
use crate::coro::PoolConfig;
use crate::error::BuildError;

use std::thread;

/// Settings of a [`TaskProcessor`].
///
/// With the `serde` feature enabled the struct deserializes from any format
/// supported by serde; missing fields take their default value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TaskProcessorConfig {
    /// Name of the processor, used for its thread names and in logs.
    pub name: String,

    /// Number of worker threads; must be greater than zero.
    pub worker_threads: usize,

    /// Coroutine pool sizing.
    pub pool: PoolConfig,
}

impl Default for TaskProcessorConfig {
    /// One worker per logical CPU, falling back to `1` if unavailable.
    fn default() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            name: "spindle".to_owned(),
            worker_threads,
            pool: PoolConfig::default(),
        }
    }
}

/// Builder for configuring and creating a task processor.
///
/// # Examples
///
/// ```rust,ignore
/// let processor = TaskProcessorBuilder::new()
///     .name("main")
///     .worker_threads(4)
///     .stack_size(128 * 1024)
///     .build();
/// ```
pub struct TaskProcessorBuilder {
    config: TaskProcessorConfig,
}

impl TaskProcessorBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: TaskProcessorConfig::default(),
        }
    }

    /// Starts from an existing configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.worker_threads == 0`.
    pub fn from_config(config: TaskProcessorConfig) -> Self {
        assert!(config.worker_threads > 0, "worker_threads must be > 0");

        Self { config }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let builder = TaskProcessorBuilder::new()
    ///     .worker_threads(2);
    /// ```
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.config.worker_threads = n;
        self
    }

    /// Coroutines created eagerly at startup.
    pub fn initial_coroutines(mut self, n: usize) -> Self {
        self.config.pool.initial_size = n;
        self
    }

    /// Maximum number of idle coroutines kept for reuse.
    pub fn max_coroutines(mut self, n: usize) -> Self {
        self.config.pool.max_size = n;
        self
    }

    /// Stack size of every coroutine; rounded up to the page size.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.pool.stack_size = bytes;
        self
    }

    /// Builds the processor and starts its threads.
    ///
    /// # Errors
    ///
    /// Fails if the initial coroutines cannot be allocated or a thread
    /// cannot be spawned.
    pub fn try_build(self) -> Result<TaskProcessor, BuildError> {
        TaskProcessor::new(self.config)
    }

    /// Builds the processor and starts its threads.
    ///
    /// # Panics
    ///
    /// Panics where [`try_build`](Self::try_build) would fail.
    pub fn build(self) -> TaskProcessor {
        match self.try_build() {
            Ok(processor) => processor,
            Err(err) => panic!("failed to build the task processor: {err}"),
        }
    }
}

impl Default for TaskProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
