use crate::error::PoolError;

use std::io;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

/// Returns the platform page size, queried once.
pub(crate) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| {
        // Safety: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as usize } else { 4096 }
    })
}

/// Rounds `size` up to a whole number of pages (at least one).
pub(crate) fn round_to_page(size: usize) -> usize {
    let page = page_size();
    size.max(1).div_ceil(page) * page
}

/// An mmap-ed coroutine stack.
///
/// The mapping starts with a `PROT_NONE` guard page; the usable region sits
/// above it and grows downwards from [`top`](Self::top). Running past the
/// bottom faults on the guard page, which terminates the process: a stack
/// that overflowed cannot be unwound safely.
///
/// Pages are committed lazily by the kernel, so the resident part of the
/// usable region is the high-water mark of everything that ever ran on it.
pub(crate) struct Stack {
    /// Start of the mapping, guard page included.
    base: NonNull<u8>,

    /// Length of the mapping, guard page included.
    len: usize,
}

// Safety: the mapping is owned exclusively by this value.
unsafe impl Send for Stack {}

impl Stack {
    /// Maps a new stack with `size` usable bytes (rounded up to the page size).
    ///
    /// Fails with [`PoolError::ResourceExhausted`] when the kernel refuses
    /// the mapping; nothing stays mapped in that case.
    pub(crate) fn new(size: usize) -> Result<Self, PoolError> {
        let page = page_size();
        let usable = round_to_page(size);

        let Some(len) = usable.checked_add(page) else {
            return Err(PoolError::ResourceExhausted {
                stack_size: usable,
                source: io::Error::from(io::ErrorKind::OutOfMemory),
            });
        };

        // Safety: anonymous private mapping, no address hint.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(PoolError::ResourceExhausted {
                stack_size: usable,
                source: io::Error::last_os_error(),
            });
        }

        // Safety: `base` is the start of a mapping at least one page long.
        if unsafe { libc::mprotect(base, page, libc::PROT_NONE) } != 0 {
            let source = io::Error::last_os_error();

            // Safety: unmapping exactly what was mapped above.
            unsafe { libc::munmap(base, len) };

            return Err(PoolError::ResourceExhausted {
                stack_size: usable,
                source,
            });
        }

        let base = NonNull::new(base.cast::<u8>()).ok_or_else(|| PoolError::ResourceExhausted {
            stack_size: usable,
            source: io::Error::from(io::ErrorKind::OutOfMemory),
        })?;

        Ok(Self { base, len })
    }

    /// Upper end of the usable region; the initial stack pointer.
    pub(crate) fn top(&self) -> *mut u8 {
        // Safety: one past the end of the mapping.
        unsafe { self.base.as_ptr().add(self.len) }
    }

    /// Number of usable bytes, guard page excluded.
    pub(crate) fn size(&self) -> usize {
        self.len - page_size()
    }

    /// Bytes between the top and the lowest page that was ever touched.
    ///
    /// `residency` is scratch space, grown to one byte per page and reused
    /// across calls. Returns `None` if residency cannot be queried.
    pub(crate) fn usage(&self, residency: &mut Vec<u8>) -> Option<usize> {
        let page = page_size();
        let pages = self.size() / page;
        residency.resize(pages, 0);

        // Safety: the usable region is mapped and page aligned, and the
        // buffer holds one byte per page.
        let rc = unsafe {
            libc::mincore(
                self.base.as_ptr().add(page) as _,
                self.size(),
                residency.as_mut_ptr() as _,
            )
        };

        if rc != 0 {
            return None;
        }

        let used = residency
            .iter()
            .position(|page| page & 1 != 0)
            .map_or(0, |lowest| (pages - lowest) * page);

        Some(used)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // Safety: the mapping was created in `new` and is unmapped once.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}
