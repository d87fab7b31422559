use super::config::PoolConfig;
use super::coroutine::Coroutine;
use crate::error::PoolError;

use crossbeam_queue::SegQueue;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Coroutines a token keeps for its owner before spilling to the shared queue.
const TOKEN_CACHE: usize = 2;

/// Stack usage (in percent) above which a new high-water mark is logged.
const STACK_USAGE_WARN_PCT: usize = 80;

/// A token samples the stack usage of one release out of this many,
/// starting with its first.
const STACK_SAMPLE_INTERVAL: u32 = 16;

/// Point-in-time counters of a [`Pool`].
///
/// Counters are read independently and may be stale by a scheduling
/// quantum under concurrent use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Coroutines currently on loan.
    pub active: usize,

    /// Coroutines alive, idle or on loan.
    pub total: usize,

    /// Coroutines waiting in the pool.
    pub idle: usize,

    /// Highest stack usage observed, in percent of the stack size.
    pub max_stack_usage_pct: usize,
}

/// A pool of reusable coroutines.
///
/// Idle coroutines live in two lock-free queues: those never used yet and
/// those returned by a finished task. Acquisition prefers the latter, since
/// their stack pages are already faulted in; the fresh ones are only touched
/// once the working set runs dry.
///
/// Affinity is explicit: each worker owns a [`PoolToken`] that keeps a couple
/// of recently released coroutines for its next acquisitions.
pub struct Pool {
    config: PoolConfig,

    /// Coroutines created eagerly and never used.
    fresh: SegQueue<Coroutine>,

    /// Coroutines returned after running at least one task.
    used: SegQueue<Coroutine>,

    /// Coroutines alive, idle or on loan.
    created: AtomicUsize,

    /// Coroutines in `fresh`, `used` or any token cache.
    idle: AtomicUsize,

    /// Highest stack usage observed, in bytes.
    max_stack_usage: AtomicUsize,
}

/// Per-worker affinity handle for a [`Pool`].
///
/// Released coroutines stay in the token first, so the worker that just
/// released one reacquires it without touching the shared queues. Cached
/// coroutines count as idle and are handed back to the pool when the token
/// is dropped.
pub struct PoolToken<'a> {
    pool: &'a Pool,
    cache: Vec<Coroutine>,

    /// Releases until the next stack usage sample.
    until_sample: u32,

    /// `mincore` scratch buffer, reused across samples.
    residency: Vec<u8>,
}

impl Pool {
    /// Creates a pool and eagerly allocates `initial_size` coroutines.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ResourceExhausted`] if the initial coroutines
    /// cannot be allocated.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let config = config.fixup();

        let pool = Self {
            fresh: SegQueue::new(),
            used: SegQueue::new(),
            created: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            max_stack_usage: AtomicUsize::new(0),
            config,
        };

        for _ in 0..pool.config.initial_size {
            let coroutine = pool.create(true)?;
            pool.fresh.push(coroutine);
            pool.idle.fetch_add(1, Ordering::AcqRel);
        }

        Ok(pool)
    }

    /// Returns a new affinity token bound to this pool.
    pub fn token(&self) -> PoolToken<'_> {
        PoolToken {
            pool: self,
            cache: Vec::with_capacity(TOKEN_CACHE),
            until_sample: 0,
            residency: Vec::new(),
        }
    }

    /// Takes an idle coroutine, or allocates one if none is idle.
    ///
    /// Lookup order: the token cache, the used queue, the fresh queue.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ResourceExhausted`] when a new stack cannot be
    /// mapped. No coroutine is created in that case.
    pub fn acquire(&self, token: &mut PoolToken<'_>) -> Result<Coroutine, PoolError> {
        debug_assert!(ptr::eq(self, token.pool), "token belongs to another pool");

        let idle = token
            .cache
            .pop()
            .or_else(|| self.used.pop())
            .or_else(|| self.fresh.pop());

        if let Some(coroutine) = idle {
            self.idle.fetch_sub(1, Ordering::AcqRel);
            return Ok(coroutine);
        }

        self.create(false)
    }

    /// Returns a coroutine to the pool, or destroys it if `max_size`
    /// coroutines are already idle.
    ///
    /// The stack high-water mark is sampled on a fraction of the releases
    /// made through `token`.
    pub fn release(&self, token: &mut PoolToken<'_>, coroutine: Coroutine) {
        debug_assert!(ptr::eq(self, token.pool), "token belongs to another pool");

        if token.until_sample == 0 {
            token.until_sample = STACK_SAMPLE_INTERVAL;
            self.account_stack_usage(&coroutine, &mut token.residency);
        }
        token.until_sample -= 1;

        if self.idle.load(Ordering::Acquire) >= self.config.max_size {
            self.destroy(coroutine);
            return;
        }

        self.idle.fetch_add(1, Ordering::AcqRel);

        if token.cache.len() < TOKEN_CACHE {
            token.cache.push(coroutine);
        } else {
            self.used.push(coroutine);
        }
    }

    /// Moves the coroutines cached by `token` into the shared used queue.
    pub fn flush(&self, token: &mut PoolToken<'_>) {
        debug_assert!(ptr::eq(self, token.pool), "token belongs to another pool");

        for coroutine in token.cache.drain(..) {
            self.used.push(coroutine);
        }
    }

    /// Returns approximate pool counters.
    pub fn stats(&self) -> PoolStats {
        let total = self.created.load(Ordering::Acquire);
        let idle = self.idle.load(Ordering::Acquire);
        let max_usage = self.max_stack_usage.load(Ordering::Relaxed);

        PoolStats {
            active: total.saturating_sub(idle),
            total: total.max(idle),
            idle,
            max_stack_usage_pct: max_usage * 100 / self.config.stack_size,
        }
    }

    /// Stack size of every coroutine, after page rounding.
    pub fn stack_size(&self) -> usize {
        self.config.stack_size
    }

    /// Effective configuration, after page rounding.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn create(&self, quiet: bool) -> Result<Coroutine, PoolError> {
        match Coroutine::new(self.config.stack_size) {
            Ok(coroutine) => {
                let total = self.created.fetch_add(1, Ordering::AcqRel) + 1;
                if !quiet {
                    tracing::debug!(total, max = self.config.max_size, "created a coroutine");
                }
                Ok(coroutine)
            }
            Err(err) => {
                tracing::error!(
                    total = self.created.load(Ordering::Acquire),
                    error = %err,
                    "failed to allocate a coroutine; are you hitting the vm.max_map_count limit?"
                );
                Err(err)
            }
        }
    }

    fn destroy(&self, coroutine: Coroutine) {
        drop(coroutine);
        self.created.fetch_sub(1, Ordering::AcqRel);
    }

    fn account_stack_usage(&self, coroutine: &Coroutine, residency: &mut Vec<u8>) {
        let Some(used) = coroutine.stack_usage(residency) else {
            return;
        };

        let previous = self.max_stack_usage.fetch_max(used, Ordering::Relaxed);
        let pct = used * 100 / self.config.stack_size;

        if used > previous && pct >= STACK_USAGE_WARN_PCT {
            tracing::warn!(
                pct,
                stack_size = self.config.stack_size,
                "coroutine stack usage is approaching the limit"
            );
        }
    }
}

impl Drop for PoolToken<'_> {
    fn drop(&mut self) {
        let pool = self.pool;
        pool.flush(self);
    }
}
