//! Work-stealing run queue.
//!
//! It consists of:
//! - [`injector`]: the global FIFO queue every enqueue goes through, plus
//!   worker parking,
//! - [`queue`]: per-worker local batches, stealable by idle workers.
//!
//! Both are thin wrappers over `crossbeam-deque`.

pub(crate) mod injector;
pub(crate) mod queue;
