use std::io::{Error, Result};
use std::ptr;

use super::{StackPointer, MIN_STACK_SIZE};

fn page_size() -> usize {
    let pagesize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    assert!(pagesize.is_power_of_two());
    pagesize
}

/// Fixed-capacity stack region allocated with `mmap`, with a guard page below
/// it so that overrunning the region faults instead of corrupting memory.
pub struct SharedStack {
    base: StackPointer,
    mmap_len: usize,
    size: usize,
}

// The region is plain memory owned by this value.
unsafe impl Send for SharedStack {}

impl SharedStack {
    /// Creates a new stack which has at least the given capacity.
    pub fn new(size: usize) -> Result<Self> {
        // Apply minimum stack size.
        let size = size.max(MIN_STACK_SIZE);

        // Add a guard page to the requested size and round the size up to
        // a page boundary.
        let page_size = page_size();
        let mmap_len = size
            .checked_add(page_size + page_size - 1)
            .expect("integer overflow while calculating stack size")
            & !(page_size - 1);

        // OpenBSD requires MAP_STACK on anything that is used as a stack.
        cfg_if::cfg_if! {
            if #[cfg(target_os = "openbsd")] {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
            } else {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
            }
        }

        unsafe {
            // Reserve some address space for the stack.
            let mmap = libc::mmap(ptr::null_mut(), mmap_len, libc::PROT_NONE, map_flags, -1, 0);
            if mmap == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }

            // Create the result here. If the mprotect call fails then this will
            // be dropped and the memory will be unmapped.
            let out = Self {
                base: StackPointer::new_unchecked(mmap as usize + mmap_len),
                mmap_len,
                size: mmap_len - page_size,
            };

            // Make everything except the guard page writable.
            if libc::mprotect(
                mmap.cast::<u8>().add(page_size).cast(),
                out.size,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                return Err(Error::last_os_error());
            }

            Ok(out)
        }
    }

    /// Returns the base address of the stack. This is the highest address
    /// since stacks grow downwards.
    #[inline]
    pub fn base(&self) -> StackPointer {
        self.base
    }

    /// Returns the usable size of the stack in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for SharedStack {
    fn drop(&mut self) {
        unsafe {
            // The mapping starts at the guard page.
            let ret = libc::munmap((self.base.get() - self.mmap_len) as *mut libc::c_void, self.mmap_len);
            debug_assert_eq!(ret, 0);
        }
    }
}
