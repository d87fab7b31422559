//! Error types surfaced by the engine.
//!
//! Recoverable conditions (timeouts, cancellation, shutdown) are reported
//! through these types. Misuse of a primitive, such as unlocking a mutex the
//! caller does not own, is a programming error and panics instead.

use std::io;

use thiserror::Error;

/// Failure to provide a coroutine.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The kernel refused to map a new stack.
    ///
    /// With `ENOMEM` this is most likely the `vm.max_map_count` limit rather
    /// than actual memory pressure.
    #[error("failed to allocate a {stack_size}-byte coroutine stack: {source}")]
    ResourceExhausted {
        stack_size: usize,
        #[source]
        source: io::Error,
    },
}

/// Failure to schedule a new task.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The task processor is shutting down and accepts no new tasks.
    #[error("task processor is stopped")]
    Stopped,
}

/// Why a bounded or cancellable wait ended without being satisfied.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline was reached first.
    #[error("wait timed out")]
    Timeout,

    /// The waiting task was asked to cancel.
    #[error("wait interrupted by a cancellation request")]
    Cancelled,
}

/// Why a task did not produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Cancellation was requested before the task body started.
    #[error("task was cancelled")]
    Cancelled,

    /// The task body panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// No coroutine could be allocated to run the task.
    #[error("no coroutine could be allocated for the task")]
    ResourceExhausted,

    /// The task calling `get` was cancelled while waiting.
    #[error("waiting for the task was interrupted by a cancellation request")]
    WaitInterrupted,
}

/// Failure to start a task processor.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The initial coroutines could not be allocated.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A worker or timer thread could not be spawned.
    #[error("failed to spawn a runtime thread: {0}")]
    Thread(#[from] io::Error),
}
