//! Task primitives.
//!
//! This module defines how the runtime represents, schedules and executes
//! tasks, together with the free functions a task body uses to interact with
//! its own execution:
//! - [`spawn`] a sibling task on the same processor,
//! - [`yield_now`] to let other tasks run,
//! - [`should_cancel`] / [`cancellation_point`] to observe cancellation,
//! - [`current_id`] to identify the running task.
//!
//! The lower-level components (state machine, wakers, type-erased context)
//! are used internally by the workers.

mod current;
mod handle;
mod id;

pub(crate) mod core;
pub(crate) mod state;
pub(crate) mod waker;

pub(crate) use core::TaskContext;
pub(crate) use handle::ResultSlot;

pub use current::{cancellation_point, current_id, is_in_task, should_cancel, spawn, yield_now};
pub use handle::TaskHandle;
pub use id::TaskId;
pub use state::TaskState;
