use super::Deadline;
use crate::error::WaitError;
use crate::runtime::park::Parker;

use std::time::Duration;

/// Suspends the current task for `duration`.
///
/// Outside of a task the calling thread sleeps instead.
///
/// # Errors
///
/// Returns [`WaitError::Cancelled`] if the task is cancelled before the
/// duration elapsed.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// time::sleep_for(Duration::from_millis(10))?;
/// ```
pub fn sleep_for(duration: Duration) -> Result<(), WaitError> {
    sleep_until(Deadline::from_duration(duration))
}

/// Suspends the current task until `deadline`.
///
/// An unreachable deadline suspends until cancellation.
pub fn sleep_until(deadline: Deadline) -> Result<(), WaitError> {
    let mut parker = Parker::current();

    loop {
        if parker.should_cancel() {
            return Err(WaitError::Cancelled);
        }
        if deadline.is_reached() {
            return Ok(());
        }
        parker.park(deadline);
    }
}
