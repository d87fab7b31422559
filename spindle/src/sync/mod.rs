//! Synchronization primitives for tasks.
//!
//! A task that cannot proceed is suspended and its worker thread runs other
//! tasks meanwhile; called from a plain thread, the primitives park that
//! thread instead.
//!
//! The current primitives include:
//! - [`Mutex`] / [`RawMutex`]: FIFO mutual exclusion with direct hand-off,
//! - [`SharedMutex`] / [`RawSharedMutex`]: reader-writer lock preferring
//!   writers,
//! - [`ConditionVariable`]: waits on a [`Mutex`] for notifications.
//!
//! Every wait has a timed variant (`*_for`, `*_until`) and is cancellable.
//! Locks are owned by the task that acquired them and must be released by
//! the same task; releasing a lock one does not own panics.

mod condvar;
mod mutex;
mod shared_mutex;
mod wait_list;

pub use condvar::{ConditionVariable, CvStatus};
pub use mutex::{Mutex, MutexGuard, RawMutex};
pub use shared_mutex::{RawSharedMutex, ReadGuard, SharedMutex, WriteGuard};
