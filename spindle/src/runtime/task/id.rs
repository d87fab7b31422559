use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of task ids. Threads waiting outside any task draw their owner
/// identity from the same counter, so ids never collide across the two.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    pub(crate) fn next() -> Self {
        let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        TaskId(NonZeroU64::MIN.saturating_add(n))
    }

    /// Raw value of the id; never zero.
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_nonzero() {
        let a = TaskId::next();
        let b = TaskId::next();

        assert_ne!(a, b);
        assert!(a.as_u64() > 0);
        assert_eq!(a.to_string(), format!("task-{}", a.as_u64()));
    }
}
