use super::stack::round_to_page;

/// Sizing of a coroutine [`Pool`](super::Pool).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Coroutines created eagerly when the pool is built.
    pub initial_size: usize,

    /// Upper bound on idle coroutines kept for reuse. Coroutines released
    /// while this many are idle are destroyed.
    pub max_size: usize,

    /// Usable stack size of every coroutine, rounded up to the page size.
    pub stack_size: usize,
}

impl PoolConfig {
    /// Default stack size: 256 KiB.
    pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

    pub(crate) fn fixup(mut self) -> Self {
        self.stack_size = round_to_page(self.stack_size);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 16,
            max_size: 1024,
            stack_size: Self::DEFAULT_STACK_SIZE,
        }
    }
}
