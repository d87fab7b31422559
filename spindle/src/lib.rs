//! # Spindle
//!
//! **Spindle** is a cooperative task engine: many logical tasks run on
//! stackful coroutines multiplexed onto a small, fixed set of OS worker
//! threads.
//!
//! Task bodies are ordinary closures. When a task has to wait (a contended
//! mutex, a sleep, another task's result) its coroutine is suspended and the
//! worker thread picks up other work; the task resumes later, possibly on
//! another worker, right where it stopped.
//!
//! Spindle provides:
//!
//! - A **task processor** with a work-stealing run queue, cancellation and
//!   orderly shutdown
//! - A **coroutine pool** reusing guard-paged, mmap'd stacks
//! - **Synchronization primitives** that suspend tasks instead of blocking
//!   threads: [`Mutex`](sync::Mutex), [`SharedMutex`](sync::SharedMutex),
//!   [`ConditionVariable`](sync::ConditionVariable)
//! - **Timed waits** through [`Deadline`](time::Deadline) and cancellable
//!   sleeps
//! - **Entry macros** `#[spindle::main]` and `#[spindle::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spindle::sync::Mutex;
//! use spindle::task;
//! use std::sync::Arc;
//!
//! #[spindle::main(worker_threads = 4)]
//! fn main() {
//!     let counter = Arc::new(Mutex::new(0));
//!
//!     let handles: Vec<_> = (0..10)
//!         .map(|_| {
//!             let counter = counter.clone();
//!             task::spawn(move || *counter.lock().unwrap() += 1).unwrap()
//!         })
//!         .collect();
//!
//!     for handle in handles {
//!         handle.get().unwrap();
//!     }
//!
//!     assert_eq!(*counter.lock().unwrap(), 10);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coro`] — Coroutines and the coroutine pool
//! - [`sync`] — Task-aware mutexes and condition variable
//! - [`task`] — Spawning, yielding, and cancellation from inside a task
//! - [`time`] — Deadlines and sleeps
//!
//! Only unix targets on x86_64 and aarch64 are supported.

mod runtime;
mod utils;

pub mod coro;
pub mod error;
pub mod sync;
pub mod time;

pub use error::{BuildError, PoolError, SpawnError, TaskError, WaitError};
pub use runtime::task;
pub use runtime::{ProcessorStats, TaskProcessor, TaskProcessorBuilder, TaskProcessorConfig};
pub use task::{TaskHandle, TaskId, TaskState};

pub use spindle_macros::{main, test};
