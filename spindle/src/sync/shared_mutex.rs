use super::wait_list::{self, Queue, WaitList, WaitSlot, Waiter};
use crate::error::WaitError;
use crate::runtime::context;
use crate::runtime::park::Parker;
use crate::time::Deadline;

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Held exclusively.
const WRITER: u64 = 1;

/// The wait list is not empty; fast paths are disabled.
const WAITERS: u64 = 1 << 1;

/// One shared holder; the reader count lives above the flag bits.
const READER: u64 = 1 << 2;

fn readers(state: u64) -> u64 {
    state >> 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Shared,
    Exclusive,
}

/// A reader-writer lock that suspends the waiting task instead of blocking
/// its thread.
///
/// Writers are preferred: once anyone is queued, new readers queue behind
/// them instead of joining the current readers. When the lock is released
/// the queue head is admitted, either a single writer or the whole run of
/// consecutive readers at the front.
///
/// While the wait list is non-empty every state change happens under the
/// wait list lock; otherwise lock and unlock are single atomic operations.
pub struct RawSharedMutex {
    state: AtomicU64,

    /// Owner identity of the writer, for misuse detection.
    writer: AtomicU64,

    waiters: WaitList<Mode>,
}

impl RawSharedMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
            writer: AtomicU64::new(0),
            waiters: WaitList::new(),
        }
    }

    /// Acquires shared access if no writer holds or waits for the lock.
    pub fn try_lock_shared(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);

        loop {
            if state & (WRITER | WAITERS) != 0 {
                return false;
            }

            match self.state.compare_exchange_weak(
                state,
                state + READER,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => state = actual,
            }
        }
    }

    /// Acquires shared access, suspending while a writer holds or waits for
    /// the lock.
    pub fn lock_shared(&self) -> Result<(), WaitError> {
        self.lock_shared_until(Deadline::unreachable())
    }

    pub fn lock_shared_for(&self, timeout: Duration) -> Result<(), WaitError> {
        self.lock_shared_until(Deadline::from_duration(timeout))
    }

    pub fn lock_shared_until(&self, deadline: Deadline) -> Result<(), WaitError> {
        if self.try_lock_shared() {
            return Ok(());
        }

        self.lock_slow(Mode::Shared, deadline)
    }

    /// Releases shared access.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held in shared mode.
    pub fn unlock_shared(&self) {
        let mut state = self.state.load(Ordering::Relaxed);

        while state & WAITERS == 0 {
            assert!(
                readers(state) > 0,
                "unlock_shared of a shared mutex not held in shared mode"
            );

            match self.state.compare_exchange_weak(
                state,
                state - READER,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => state = actual,
            }
        }

        self.release_slow(|state| {
            assert!(
                readers(state) > 0,
                "unlock_shared of a shared mutex not held in shared mode"
            );
            state - READER
        });
    }

    /// Acquires exclusive access if the lock is completely free.
    pub fn try_lock(&self) -> bool {
        let me = context::current_agent_id();

        if self
            .state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.writer.store(me, Ordering::Relaxed);
            return true;
        }

        false
    }

    /// Acquires exclusive access, suspending until all holders are gone.
    ///
    /// # Panics
    ///
    /// Panics if the caller already holds the lock exclusively.
    pub fn lock(&self) -> Result<(), WaitError> {
        self.lock_until(Deadline::unreachable())
    }

    pub fn lock_for(&self, timeout: Duration) -> Result<(), WaitError> {
        self.lock_until(Deadline::from_duration(timeout))
    }

    pub fn lock_until(&self, deadline: Deadline) -> Result<(), WaitError> {
        if self.try_lock() {
            return Ok(());
        }

        self.lock_slow(Mode::Exclusive, deadline)
    }

    /// Releases exclusive access.
    ///
    /// # Panics
    ///
    /// Panics if the caller does not hold the lock exclusively.
    pub fn unlock(&self) {
        let me = context::current_agent_id();

        assert!(
            self.state.load(Ordering::Relaxed) & WRITER != 0
                && self.writer.load(Ordering::Relaxed) == me,
            "unlock of a shared mutex not held exclusively by the caller"
        );
        self.writer.store(0, Ordering::Relaxed);

        if self
            .state
            .compare_exchange(WRITER, 0, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }

        self.release_slow(|state| state & !WRITER);
    }

    fn lock_slow(&self, mode: Mode, deadline: Deadline) -> Result<(), WaitError> {
        if deadline.is_reached() {
            return Err(WaitError::Timeout);
        }

        let mut parker = Parker::current();
        if parker.should_cancel() {
            return Err(WaitError::Cancelled);
        }

        let me = parker.id();
        let slot = WaitSlot::new(parker.waker());

        {
            let mut queue = self.waiters.lock();
            let mut state = self.state.load(Ordering::Relaxed);

            loop {
                // An empty queue implies the WAITERS bit is clear.
                let free = match mode {
                    Mode::Shared => state & WRITER == 0,
                    Mode::Exclusive => state & WRITER == 0 && readers(state) == 0,
                };

                if free && queue.is_empty() {
                    let next = match mode {
                        Mode::Shared => state + READER,
                        Mode::Exclusive => state | WRITER,
                    };

                    match self.state.compare_exchange(
                        state,
                        next,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {
                            if mode == Mode::Exclusive {
                                self.writer.store(me, Ordering::Relaxed);
                            }
                            return Ok(());
                        }
                        Err(actual) => {
                            state = actual;
                            continue;
                        }
                    }
                }

                assert!(
                    !(mode == Mode::Exclusive
                        && state & WRITER != 0
                        && self.writer.load(Ordering::Relaxed) == me),
                    "recursive lock of a shared mutex by its writer"
                );

                if state & WAITERS != 0 {
                    break;
                }

                match self.state.compare_exchange(
                    state,
                    state | WAITERS,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(actual) => state = actual,
                }
            }

            queue.push_back(Waiter {
                id: me,
                mode,
                slot: slot.clone(),
            });
        }

        wait_list::wait_granted(&mut parker, &slot, deadline, true, || {
            let mut queue = self.waiters.lock();
            if !wait_list::retract(&mut queue, &slot) {
                return false;
            }

            // The retracted waiter may have been the one blocking the
            // readers behind it.
            let granted = self.update_locked(&mut queue, |state| state);
            drop(queue);
            grant_all(granted);
            true
        })
    }

    fn release_slow(&self, release: impl Fn(u64) -> u64) {
        let granted = {
            let mut queue = self.waiters.lock();
            self.update_locked(&mut queue, release)
        };

        grant_all(granted);
    }

    /// Applies `f` to the state and admits whoever can run next.
    ///
    /// Must be called with the wait list locked. If `WAITERS` is set the
    /// state only changes under this lock and the first exchange succeeds;
    /// otherwise the queue is empty and nothing is dequeued, so retrying
    /// is harmless.
    fn update_locked(&self, queue: &mut Queue<Mode>, f: impl Fn(u64) -> u64) -> Vec<Arc<WaitSlot>> {
        let mut state = self.state.load(Ordering::Relaxed);

        loop {
            let mut next = f(state);
            let granted = self.dispatch(queue, &mut next);

            match self.state.compare_exchange(state, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return granted,
                Err(actual) => {
                    debug_assert!(granted.is_empty());
                    state = actual;
                }
            }
        }
    }

    /// Dequeues the waiters that can be admitted in `state` and updates it.
    fn dispatch(&self, queue: &mut Queue<Mode>, state: &mut u64) -> Vec<Arc<WaitSlot>> {
        let mut granted = Vec::new();

        if *state & WRITER == 0 {
            match queue.front().map(|waiter| waiter.mode) {
                Some(Mode::Exclusive) if readers(*state) == 0 => {
                    if let Some(waiter) = queue.pop_front() {
                        *state |= WRITER;
                        self.writer.store(waiter.id, Ordering::Relaxed);
                        granted.push(waiter.slot);
                    }
                }
                Some(Mode::Shared) => {
                    while queue.front().is_some_and(|waiter| waiter.mode == Mode::Shared) {
                        if let Some(waiter) = queue.pop_front() {
                            *state += READER;
                            granted.push(waiter.slot);
                        }
                    }
                }
                _ => {}
            }
        }

        if queue.is_empty() {
            *state &= !WAITERS;
        } else {
            *state |= WAITERS;
        }

        granted
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & !WAITERS != 0
    }

    pub fn is_locked_exclusive(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER != 0
    }
}

fn grant_all(slots: Vec<Arc<WaitSlot>>) {
    for slot in slots {
        slot.grant();
    }
}

impl Default for RawSharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawSharedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Relaxed);
        f.debug_struct("RawSharedMutex")
            .field("writer", &(state & WRITER != 0))
            .field("readers", &readers(state))
            .finish()
    }
}

/// A reader-writer lock protecting a value of type `T`.
///
/// See [`RawSharedMutex`] for the admission policy.
pub struct SharedMutex<T: ?Sized> {
    raw: RawSharedMutex,
    data: UnsafeCell<T>,
}

// Safety: readers share `&T` across tasks, writers get exclusive access.
unsafe impl<T: ?Sized + Send> Send for SharedMutex<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for SharedMutex<T> {}

impl<T> SharedMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawSharedMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SharedMutex<T> {
    pub fn read(&self) -> Result<ReadGuard<'_, T>, WaitError> {
        self.raw.lock_shared()?;
        Ok(ReadGuard::new(self))
    }

    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        self.raw.try_lock_shared().then(|| ReadGuard::new(self))
    }

    pub fn read_for(&self, timeout: Duration) -> Result<ReadGuard<'_, T>, WaitError> {
        self.raw.lock_shared_for(timeout)?;
        Ok(ReadGuard::new(self))
    }

    pub fn read_until(&self, deadline: Deadline) -> Result<ReadGuard<'_, T>, WaitError> {
        self.raw.lock_shared_until(deadline)?;
        Ok(ReadGuard::new(self))
    }

    pub fn write(&self) -> Result<WriteGuard<'_, T>, WaitError> {
        self.raw.lock()?;
        Ok(WriteGuard::new(self))
    }

    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        self.raw.try_lock().then(|| WriteGuard::new(self))
    }

    pub fn write_for(&self, timeout: Duration) -> Result<WriteGuard<'_, T>, WaitError> {
        self.raw.lock_for(timeout)?;
        Ok(WriteGuard::new(self))
    }

    pub fn write_until(&self, deadline: Deadline) -> Result<WriteGuard<'_, T>, WaitError> {
        self.raw.lock_until(deadline)?;
        Ok(WriteGuard::new(self))
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for SharedMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for SharedMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMutex")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// Shared access guard returned by [`SharedMutex::read`].
pub struct ReadGuard<'a, T: ?Sized> {
    lock: &'a SharedMutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for ReadGuard<'_, T> {}

impl<'a, T: ?Sized> ReadGuard<'a, T> {
    fn new(lock: &'a SharedMutex<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock_shared();
    }
}

impl<T: ?Sized> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

/// Exclusive access guard returned by [`SharedMutex::write`].
pub struct WriteGuard<'a, T: ?Sized> {
    lock: &'a SharedMutex<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for WriteGuard<'_, T> {}

impl<'a, T: ?Sized> WriteGuard<'a, T> {
    fn new(lock: &'a SharedMutex<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
    }
}

impl<T: ?Sized> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}
