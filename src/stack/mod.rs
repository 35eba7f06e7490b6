//! The shared stack that every coroutine of a scheduler executes on.
//!
//! Only one coroutine occupies the region at a time. When it suspends, the
//! live part of the region is copied out into the coroutine's snapshot and the
//! region is free for the next one.

use core::num::NonZeroUsize;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use self::unix::SharedStack;
    } else {
        compile_error!("the shared stack is only implemented for unix targets");
    }
}

/// Type to represent a stack address.
pub type StackPointer = NonZeroUsize;

/// Minimum size of a shared stack, excluding the guard page.
///
/// A panic inside a coroutine is raised, reported by the panic hook and
/// unwound on the shared stack, which takes far more than a page.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Default size of a shared stack: 1 MiB.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

impl SharedStack {
    /// Returns whether `sp` lies within the usable part of this stack.
    ///
    /// The base itself counts as inside since it is the stack pointer of an
    /// empty stack.
    #[inline]
    pub fn contains(&self, sp: usize) -> bool {
        let base = self.base().get();
        sp <= base && sp > base - self.size()
    }

    /// Number of live bytes between `sp` and the base, or `None` if `sp` is
    /// not inside the usable part of the stack.
    #[inline]
    pub fn extent(&self, sp: StackPointer) -> Option<usize> {
        if self.contains(sp.get()) {
            Some(self.base().get() - sp.get())
        } else {
            None
        }
    }
}

#[test]
fn assert_send() {
    fn send<T: Send>() {}
    send::<SharedStack>();
}
