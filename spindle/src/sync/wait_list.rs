use crate::error::WaitError;
use crate::runtime::park::Parker;
use crate::time::Deadline;

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

/// Completion flag of a single wait, shared by the waiter and the queue.
pub(crate) struct WaitSlot {
    granted: AtomicBool,
    waker: Waker,
}

impl WaitSlot {
    pub(crate) fn new(waker: Waker) -> Arc<Self> {
        Arc::new(Self {
            granted: AtomicBool::new(false),
            waker,
        })
    }

    /// Marks the wait as satisfied and wakes the waiter.
    pub(crate) fn grant(&self) {
        self.granted.store(true, Ordering::Release);
        self.waker.wake_by_ref();
    }

    pub(crate) fn is_granted(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }
}

/// An entry of a [`WaitList`].
pub(crate) struct Waiter<M> {
    /// Owner identity of the waiter.
    pub(crate) id: u64,

    /// What the waiter asks for, e.g. shared or exclusive access.
    pub(crate) mode: M,

    pub(crate) slot: Arc<WaitSlot>,
}

pub(crate) type Queue<M> = VecDeque<Waiter<M>>;

/// FIFO queue of suspended waiters.
///
/// The queue is guarded by a short `parking_lot` lock that is never held
/// across a suspension. Waiters are granted in arrival order; a waiter that
/// gives up (timeout, cancellation) removes its own entry.
pub(crate) struct WaitList<M> {
    queue: Mutex<Queue<M>>,
}

impl<M> WaitList<M> {
    pub(crate) const fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Queue<M>> {
        self.queue.lock()
    }
}

/// Removes the entry owning `slot`; returns `false` if it was already
/// dequeued by a granter.
pub(crate) fn retract<M>(queue: &mut Queue<M>, slot: &Arc<WaitSlot>) -> bool {
    match queue.iter().position(|waiter| Arc::ptr_eq(&waiter.slot, slot)) {
        Some(index) => {
            queue.remove(index);
            true
        }
        None => false,
    }
}

/// Parks until `slot` is granted, `deadline` is reached, or (when
/// `cancellable`) the waiting task is cancelled.
///
/// On timeout or cancellation `give_up` is called to retract the entry. It
/// returns `false` when the entry was already dequeued, in which case the
/// grant won the race and the wait succeeds.
pub(crate) fn wait_granted(
    parker: &mut Parker,
    slot: &WaitSlot,
    deadline: Deadline,
    cancellable: bool,
    give_up: impl FnOnce() -> bool,
) -> Result<(), WaitError> {
    loop {
        if slot.is_granted() {
            return Ok(());
        }

        let reason = if deadline.is_reached() {
            Some(WaitError::Timeout)
        } else if cancellable && parker.should_cancel() {
            Some(WaitError::Cancelled)
        } else {
            None
        };

        if let Some(err) = reason {
            return if give_up() { Err(err) } else { Ok(()) };
        }

        parker.park(deadline);
    }
}
