use std::time::{Duration, Instant};

/// An optional absolute point in time bounding a wait.
///
/// An *unreachable* deadline never expires; waits bounded by it only end
/// when satisfied or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that is never reached.
    pub const fn unreachable() -> Self {
        Deadline(None)
    }

    /// A deadline `timeout` from now. Durations too large to be represented
    /// yield an unreachable deadline.
    pub fn from_duration(timeout: Duration) -> Self {
        Deadline(Instant::now().checked_add(timeout))
    }

    pub const fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    pub fn is_reachable(&self) -> bool {
        self.0.is_some()
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_reached(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Time remaining before the deadline; zero once reached, `None` if
    /// unreachable.
    pub fn time_left(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Deadline::at(instant)
    }
}
