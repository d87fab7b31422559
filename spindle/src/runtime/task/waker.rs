use super::core::TaskContext;

use std::mem;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// The `RawWakerVTable` shared by every task waker.
///
/// # Safety
///
/// All functions in the vtable must uphold the invariants required
/// by [`RawWaker`], in particular:
/// - reference counts must be correctly managed,
/// - the task must remain valid for the lifetime of the waker.
static VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Creates a [`Waker`] that reschedules `task` when woken.
///
/// The pointer stored inside the `RawWaker` originates from
/// `Arc::into_raw` and keeps the task alive until the waker is dropped.
pub(crate) fn make_waker(task: Arc<TaskContext>) -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(task) as *const (), &VTABLE)) }
}

/// Clones the raw waker, incrementing the reference count of the task.
fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::from_raw(ptr as *const TaskContext) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

/// Wakes the task and consumes the waker.
fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr as *const TaskContext) };
    arc.wake();
}

/// Wakes the task without consuming the waker.
fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr as *const TaskContext) };
    arc.wake();
    mem::forget(arc);
}

/// Drops the raw waker, decrementing the reference count of the task.
fn drop_raw(ptr: *const ()) {
    unsafe { drop(Arc::from_raw(ptr as *const TaskContext)) };
}
