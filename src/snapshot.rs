use core::ptr;

use crate::stack::StackPointer;

/// Saved copy of the live part of the shared stack for a suspended coroutine.
///
/// The buffer only ever grows: a coroutine that once yielded from deep in its
/// call stack keeps that much capacity until it finishes.
#[derive(Default)]
pub struct Snapshot {
    buf: Vec<u8>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stack bytes currently saved.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Copies the `len` bytes starting at `sp` into the buffer.
    ///
    /// If the buffer is too small it is replaced by one of exactly `len`
    /// bytes. The old contents are not carried over since they are about to be
    /// overwritten anyway.
    ///
    /// # Safety
    ///
    /// `[sp, sp + len)` must be readable.
    pub unsafe fn save(&mut self, sp: StackPointer, len: usize) {
        if self.buf.capacity() < len {
            self.buf = Vec::with_capacity(len);
        }
        self.buf.clear();
        ptr::copy_nonoverlapping(sp.get() as *const u8, self.buf.as_mut_ptr(), len);
        self.buf.set_len(len);
    }

    /// Copies the saved bytes back so that they end exactly at `stack_base`,
    /// and returns the stack pointer they were saved from.
    ///
    /// # Safety
    ///
    /// `[stack_base - len, stack_base)` must be writable and not aliased by
    /// any live reference.
    pub unsafe fn restore(&self, stack_base: StackPointer) -> StackPointer {
        let sp = stack_base.get() - self.buf.len();
        ptr::copy_nonoverlapping(self.buf.as_ptr(), sp as *mut u8, self.buf.len());
        StackPointer::new_unchecked(sp)
    }
}
