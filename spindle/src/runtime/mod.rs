//! Task processor.
//!
//! This module contains the scheduler: worker threads draining a
//! work-stealing run queue, the task state machine driving coroutines, the
//! timer thread backing timed waits, and the thread-local context tying a
//! running coroutine back to its task.
//!
//! Users interact with it through [`TaskProcessor`],
//! [`TaskProcessorBuilder`] and the [`task`] functions.

mod core;
mod executor;
mod stats;
mod timer;
mod work_stealing;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod park;

pub mod task;

pub use builder::{TaskProcessorBuilder, TaskProcessorConfig};
pub use core::TaskProcessor;
pub use stats::ProcessorStats;
