//! Stackful coroutines and the pool that recycles them.
//!
//! A [`Coroutine`] is an mmap-ed stack with a guard page plus a saved
//! execution context. Task bodies run on it and suspend by switching back to
//! the worker thread that resumed them. The [`Pool`] keeps idle coroutines
//! for reuse so that spawning a task rarely maps new memory.

mod arch;
mod config;
mod coroutine;
mod pool;
mod stack;

pub(crate) use coroutine::{Job, Transfer, in_coroutine, suspend};

pub use config::PoolConfig;
pub use coroutine::Coroutine;
pub use pool::{Pool, PoolStats, PoolToken};
