use super::mutex::MutexGuard;
use super::wait_list::{self, WaitList, WaitSlot, Waiter};
use crate::error::WaitError;
use crate::runtime::park::Parker;
use crate::time::Deadline;

use std::fmt;
use std::time::Duration;

/// How a condition variable wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CvStatus {
    /// Woken by a notification.
    NoTimeout,

    /// The deadline was reached first.
    Timeout,

    /// The waiting task was cancelled.
    Cancelled,
}

impl CvStatus {
    pub fn timed_out(self) -> bool {
        self == CvStatus::Timeout
    }
}

/// A condition variable for tasks, used together with [`Mutex`].
///
/// Waiting releases the mutex and suspends the task; the mutex is always
/// re-acquired before the wait returns, whatever its outcome. Notified
/// waiters are resumed in the order they started waiting.
///
/// [`Mutex`]: super::Mutex
pub struct ConditionVariable {
    waiters: WaitList<()>,
}

impl ConditionVariable {
    pub const fn new() -> Self {
        Self {
            waiters: WaitList::new(),
        }
    }

    /// Waits for a notification.
    pub fn wait<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>) -> CvStatus {
        self.wait_until(guard, Deadline::unreachable())
    }

    pub fn wait_for<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> CvStatus {
        self.wait_until(guard, Deadline::from_duration(timeout))
    }

    /// Waits for a notification until `deadline`.
    ///
    /// The mutex behind `guard` is released while waiting and re-acquired,
    /// ignoring cancellation, before returning.
    pub fn wait_until<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>, deadline: Deadline) -> CvStatus {
        if deadline.is_reached() {
            return CvStatus::Timeout;
        }

        let mut parker = Parker::current();
        if parker.should_cancel() {
            return CvStatus::Cancelled;
        }

        let slot = WaitSlot::new(parker.waker());
        self.waiters.lock().push_back(Waiter {
            id: parker.id(),
            mode: (),
            slot: slot.clone(),
        });

        let raw = guard.raw();
        raw.unlock();

        let outcome = wait_list::wait_granted(&mut parker, &slot, deadline, true, || {
            wait_list::retract(&mut self.waiters.lock(), &slot)
        });

        // Retracts the timer before a possibly long relock.
        drop(parker);
        raw.lock_uncancellable();

        match outcome {
            Ok(()) => CvStatus::NoTimeout,
            Err(WaitError::Timeout) => CvStatus::Timeout,
            Err(WaitError::Cancelled) => CvStatus::Cancelled,
        }
    }

    /// Waits until `stop_waiting` returns `true` or `deadline` is reached.
    ///
    /// Returns the last value of the predicate, evaluated with the mutex
    /// held.
    pub fn wait_while<T: ?Sized>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Deadline,
        mut stop_waiting: impl FnMut(&mut T) -> bool,
    ) -> bool {
        loop {
            if stop_waiting(&mut **guard) {
                return true;
            }
            if self.wait_until(guard, deadline) != CvStatus::NoTimeout {
                return stop_waiting(&mut **guard);
            }
        }
    }

    /// Wakes the longest-waiting task, if any.
    pub fn notify_one(&self) {
        let next = self.waiters.lock().pop_front();

        if let Some(waiter) = next {
            waiter.slot.grant();
        }
    }

    /// Wakes every waiting task.
    pub fn notify_all(&self) {
        let waiters: Vec<_> = self.waiters.lock().drain(..).collect();

        for waiter in waiters {
            waiter.slot.grant();
        }
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("waiters", &self.waiters.lock().len())
            .finish()
    }
}
