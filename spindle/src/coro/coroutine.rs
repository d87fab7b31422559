use super::arch::{self, StackPointer};
use super::stack::Stack;
use crate::error::PoolError;

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::ptr::{self, NonNull};

/// A unit of work executed on a coroutine stack.
pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// How a coroutine handed control back to whoever resumed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    /// The job called [`suspend`] and can be resumed later.
    Suspended,

    /// The job returned; the coroutine is ready for another one.
    Finished,
}

thread_local! {
    /// Coroutine currently executing on this thread, if any.
    static CURRENT: Cell<*mut Inner> = const { Cell::new(ptr::null_mut()) };
}

struct Inner {
    stack: Stack,

    /// Saved stack pointer of the coroutine while it is not running.
    sp: StackPointer,

    /// Saved stack pointer of the resumer while the coroutine runs.
    caller: StackPointer,

    job: Option<Job>,
    transfer: Transfer,
    running: bool,

    /// Number of jobs that ran to completion on this coroutine.
    generation: u64,
}

/// An execution stack together with a suspended execution context.
///
/// A `Coroutine` is an opaque owned handle: it is held either by the
/// [`Pool`](super::Pool) or by the single task it is on loan to, and is never
/// shared. Jobs run inside an entry loop at the bottom of the stack, so the
/// same coroutine can run any number of jobs one after another.
pub struct Coroutine {
    inner: NonNull<Inner>,
}

// Safety: the handle owns `Inner` exclusively; jobs are `Send`.
unsafe impl Send for Coroutine {}

impl Coroutine {
    /// Allocates a stack of `stack_size` usable bytes and prepares it to
    /// enter the job loop on the first resume.
    pub(crate) fn new(stack_size: usize) -> Result<Self, PoolError> {
        let stack = Stack::new(stack_size)?;
        let top = stack.top();

        let inner = Box::into_raw(Box::new(Inner {
            stack,
            sp: 0,
            caller: 0,
            job: None,
            transfer: Transfer::Finished,
            running: false,
            generation: 0,
        }));

        // Safety: `inner` was just leaked from a box and the stack it points
        // to stays mapped until `Drop`.
        unsafe {
            (*inner).sp = arch::prepare(top, coroutine_main, inner.cast());
        }

        Ok(Self {
            // Safety: `Box::into_raw` never returns null.
            inner: unsafe { NonNull::new_unchecked(inner) },
        })
    }

    /// Number of jobs this coroutine has completed.
    pub fn generation(&self) -> u64 {
        // Safety: shared read through the owning handle.
        unsafe { self.inner.as_ref().generation }
    }

    /// Usable stack size in bytes.
    pub fn stack_size(&self) -> usize {
        // Safety: shared read through the owning handle.
        unsafe { self.inner.as_ref().stack.size() }
    }

    /// High-water mark of the stack in bytes, if it can be measured.
    pub(crate) fn stack_usage(&self, residency: &mut Vec<u8>) -> Option<usize> {
        // Safety: shared read through the owning handle.
        unsafe { self.inner.as_ref().stack.usage(residency) }
    }

    /// Hands `job` to the coroutine and runs it until it suspends or returns.
    pub(crate) fn start(&mut self, job: Job) -> Transfer {
        let inner = self.inner.as_ptr();

        // Safety: the coroutine is not running, we hold the only handle.
        unsafe {
            assert!(
                (*inner).transfer == Transfer::Finished && (*inner).job.is_none(),
                "coroutine started while a job is still in progress"
            );
            (*inner).job = Some(job);
        }

        self.resume()
    }

    /// Switches into the coroutine and returns once it suspends or its job
    /// finishes.
    pub(crate) fn resume(&mut self) -> Transfer {
        let inner = self.inner.as_ptr();

        // Safety: all accesses go through the raw pointer while the
        // coroutine runs; it only touches `Inner` through the same pointer.
        unsafe {
            assert!(!(*inner).running, "coroutine resumed while already running");
            (*inner).running = true;

            let previous = set_current(inner);
            arch::spindle_switch(&raw mut (*inner).caller, (*inner).sp);
            set_current(previous);

            (*inner).running = false;
            (*inner).transfer
        }
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        // Safety: reclaiming the box leaked in `new`.
        let inner = unsafe { Box::from_raw(self.inner.as_ptr()) };

        if inner.transfer == Transfer::Suspended {
            tracing::warn!(
                generation = inner.generation,
                "destroying a coroutine with a suspended job, its frames are leaked"
            );
        }
    }
}

/// Returns control from the running coroutine to its resumer.
///
/// Execution continues after this call once the coroutine is resumed, which
/// may happen on a different OS thread.
///
/// # Panics
///
/// Panics if called outside of a coroutine.
pub(crate) fn suspend() {
    let inner = current();
    assert!(!inner.is_null(), "suspend called outside of a coroutine");

    // Safety: `inner` is the coroutine running on this thread; its resumer
    // is blocked inside `resume` until we switch back.
    unsafe {
        (*inner).transfer = Transfer::Suspended;
        arch::spindle_switch(&raw mut (*inner).sp, (*inner).caller);
    }
}

/// Returns `true` when called from code running on a coroutine.
pub(crate) fn in_coroutine() -> bool {
    !current().is_null()
}

// Thread-local accessors are never inlined: a coroutine may resume on another
// thread, and a cached thread-local address would then point at the old one.
#[inline(never)]
fn current() -> *mut Inner {
    CURRENT.with(Cell::get)
}

#[inline(never)]
fn set_current(inner: *mut Inner) -> *mut Inner {
    CURRENT.with(|cell| cell.replace(inner))
}

/// Entry loop at the bottom of every coroutine stack.
unsafe extern "C" fn coroutine_main(arg: *mut u8) -> ! {
    let inner = arg.cast::<Inner>();

    loop {
        // Safety: `inner` outlives the stack we are running on.
        let job = unsafe { (*inner).job.take() };

        if let Some(job) = job {
            // Jobs catch their own panics; unwinding past this frame would
            // run into the trampoline.
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("panic escaped a coroutine job, aborting");
                process::abort();
            }
        }

        // Safety: see above; the resumer is blocked in `resume`.
        unsafe {
            (*inner).generation += 1;
            (*inner).transfer = Transfer::Finished;
            arch::spindle_switch(&raw mut (*inner).sp, (*inner).caller);
        }
    }
}
