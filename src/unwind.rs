//! Carrying a coroutine's panic back to the host.
//!
//! Unwinding must never reach the assembly trampoline at the root of the
//! shared stack. The entry function runs under `catch_unwind`, the outcome is
//! left in the trampoline's frame and its address is handed to the host by
//! the final switch. The host moves it out and resumes unwinding from
//! `resume`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Outcome of a coroutine's entry function.
pub type RootResult = Result<(), Box<dyn Any + Send>>;

/// Runs the entry function of a coroutine, stopping any panic.
#[inline]
pub fn catch_at_root(f: impl FnOnce()) -> RootResult {
    panic::catch_unwind(AssertUnwindSafe(f))
}

/// Moves the outcome out of a finished coroutine's frame.
///
/// # Safety
///
/// `result` must come from the final switch of a coroutine, and nothing may
/// have run on its stack since. It must be taken exactly once.
#[inline]
pub unsafe fn take_result(result: *const RootResult) -> RootResult {
    ptr::read(result)
}

/// Continues a caught panic on the current stack.
#[inline]
pub fn rethrow(result: RootResult) {
    if let Err(payload) = result {
        panic::resume_unwind(payload);
    }
}
