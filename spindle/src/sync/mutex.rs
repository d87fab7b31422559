use super::wait_list::{self, WaitList, WaitSlot, Waiter};
use crate::error::WaitError;
use crate::runtime::context;
use crate::runtime::park::Parker;
use crate::time::Deadline;

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const UNLOCKED: u64 = 0;

/// Low bit of the owner word: the wait list is not empty.
const HAS_WAITERS: u64 = 1;

/// Owner word of the current task (or thread).
fn current_owner() -> u64 {
    context::current_agent_id() << 1
}

/// A mutex that suspends the waiting task instead of blocking its thread.
///
/// The state is a single owner word: `0` when unlocked, otherwise the owner
/// identity shifted left by one with the low bit set while waiters are
/// queued. An uncontended lock or unlock is one compare-and-swap.
///
/// Contended lockers queue in FIFO order. Unlock hands ownership directly
/// to the head waiter, so a released mutex cannot be barged by a newcomer
/// while a waiter is queued.
///
/// Outside of a task the calling thread is parked instead.
pub struct RawMutex {
    state: AtomicU64,
    waiters: WaitList<()>,
}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(UNLOCKED),
            waiters: WaitList::new(),
        }
    }

    /// Acquires the mutex if it is free; never suspends.
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, current_owner(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquires the mutex, suspending until it is available.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Cancelled`] if the task is cancelled while
    /// waiting.
    ///
    /// # Panics
    ///
    /// Panics if the caller already owns the mutex.
    pub fn lock(&self) -> Result<(), WaitError> {
        self.lock_until(Deadline::unreachable())
    }

    pub fn lock_for(&self, timeout: Duration) -> Result<(), WaitError> {
        self.lock_until(Deadline::from_duration(timeout))
    }

    /// Acquires the mutex unless `deadline` is reached first.
    ///
    /// A deadline already reached still succeeds on a free mutex.
    pub fn lock_until(&self, deadline: Deadline) -> Result<(), WaitError> {
        if self.try_lock() {
            return Ok(());
        }

        self.lock_slow(deadline, true)
    }

    /// Acquires the mutex ignoring cancellation, as needed to relock after a
    /// condition variable wait.
    pub(crate) fn lock_uncancellable(&self) {
        if self.try_lock() {
            return;
        }

        // Cannot fail: no deadline, no cancellation.
        let _ = self.lock_slow(Deadline::unreachable(), false);
    }

    fn lock_slow(&self, deadline: Deadline, cancellable: bool) -> Result<(), WaitError> {
        if deadline.is_reached() {
            return Err(WaitError::Timeout);
        }

        let mut parker = Parker::current();
        if cancellable && parker.should_cancel() {
            return Err(WaitError::Cancelled);
        }

        let me = parker.id() << 1;
        let slot = WaitSlot::new(parker.waker());

        {
            let mut queue = self.waiters.lock();
            let mut state = self.state.load(Ordering::Relaxed);

            loop {
                if state == UNLOCKED {
                    match self.state.compare_exchange(
                        UNLOCKED,
                        me,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => return Ok(()),
                        Err(actual) => {
                            state = actual;
                            continue;
                        }
                    }
                }

                assert!(
                    state & !HAS_WAITERS != me,
                    "recursive lock of a mutex by its owner"
                );

                if state & HAS_WAITERS != 0 {
                    break;
                }

                match self.state.compare_exchange(
                    state,
                    state | HAS_WAITERS,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(actual) => state = actual,
                }
            }

            queue.push_back(Waiter {
                id: me,
                mode: (),
                slot: slot.clone(),
            });
        }

        wait_list::wait_granted(&mut parker, &slot, deadline, cancellable, || {
            let mut queue = self.waiters.lock();
            if !wait_list::retract(&mut queue, &slot) {
                return false;
            }
            if queue.is_empty() {
                self.state.fetch_and(!HAS_WAITERS, Ordering::Relaxed);
            }
            true
        })
    }

    /// Releases the mutex, handing it to the first queued waiter if any.
    ///
    /// # Panics
    ///
    /// Panics if the caller does not own the mutex.
    pub fn unlock(&self) {
        let me = current_owner();

        if self
            .state
            .compare_exchange(me, UNLOCKED, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }

        let next = {
            let mut queue = self.waiters.lock();
            let state = self.state.load(Ordering::Relaxed);

            assert!(
                state & !HAS_WAITERS == me,
                "unlock of a mutex not owned by the caller"
            );

            match queue.pop_front() {
                Some(waiter) => {
                    let flag = if queue.is_empty() { 0 } else { HAS_WAITERS };
                    self.state.store(waiter.id | flag, Ordering::Release);
                    Some(waiter.slot)
                }
                None => {
                    self.state.store(UNLOCKED, Ordering::Release);
                    None
                }
            }
        };

        if let Some(slot) = next {
            slot.grant();
        }
    }

    /// Returns `true` while some task or thread holds the mutex.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// A mutual exclusion primitive protecting a value of type `T`.
///
/// `Mutex<T>` is the data-carrying wrapper of [`RawMutex`]: tasks that
/// cannot acquire the lock are suspended and resumed, in FIFO order, when
/// it becomes available.
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,

    /// The underlying data protected by the mutex.
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `raw`.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new, unlocked mutex wrapping `value`.
    ///
    /// # Example
    /// ```rust,ignore
    /// let mutex = Mutex::new(42);
    /// ```
    pub const fn new(value: T) -> Mutex<T> {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the mutex, suspending the current task until it is
    /// available.
    ///
    /// # Example
    /// ```rust,ignore
    /// let mut guard = mutex.lock()?;
    /// *guard += 1;
    /// ```
    pub fn lock(&self) -> Result<MutexGuard<'_, T>, WaitError> {
        self.raw.lock()?;
        Ok(MutexGuard::new(self))
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.raw.try_lock().then(|| MutexGuard::new(self))
    }

    pub fn lock_for(&self, timeout: Duration) -> Result<MutexGuard<'_, T>, WaitError> {
        self.raw.lock_for(timeout)?;
        Ok(MutexGuard::new(self))
    }

    pub fn lock_until(&self, deadline: Deadline) -> Result<MutexGuard<'_, T>, WaitError> {
        self.raw.lock_until(deadline)?;
        Ok(MutexGuard::new(self))
    }

    /// Mutable access without locking, statically exclusive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.raw.is_locked())
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`Mutex::lock`].
///
/// Releases the mutex when dropped. The guard cannot be sent to another
/// task: ownership is tied to the task that locked.
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn raw(&self) -> &'a RawMutex {
        &self.mutex.raw
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw.unlock();
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.mutex.data.get() }
    }
}
