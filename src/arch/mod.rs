//! Context switching between the host stack and the shared stack.
//!
//! Both backends expose the same four operations:
//! - `init_stack` lays out a fresh context whose first switch enters the
//!   coroutine trampoline.
//! - `switch_and_link` enters a context and refreshes the parent link.
//! - `switch_yield` leaves a context so that it can be entered again.
//! - `switch_and_reset` leaves a context for good, handing the host a pointer
//!   to the outcome of its entry function.
//!
//! Three words at the top of the shared stack are common to every coroutine:
//! the entry function, the parent link and the scheduler handle.

use core::mem;

use crate::scheduler::Handle;
use crate::stack::StackPointer;

// Symbol naming and section directives differ between Mach-O and ELF.
cfg_if::cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        macro_rules! asm_mangle {
            ($name:literal) => { concat!("_", $name) };
        }
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".private_extern ", asm_mangle!($name), "\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        // Keeps the return label in the same atom as the trampoline.
        macro_rules! asm_function_alt_entry {
            ($name:literal) => {
                concat!(".alt_entry ", asm_mangle!($name), "\n", asm_function_begin!($name))
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => { "" };
        }
        // Darwin's unwinder rejects signal frames.
        macro_rules! cfi_signal_frame {
            () => { "" };
        }
    } else {
        macro_rules! asm_mangle {
            ($name:literal) => { $name };
        }
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".hidden ", asm_mangle!($name), "\n",
                    ".type ", asm_mangle!($name), ", @function\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_alt_entry {
            ($name:literal) => { asm_function_begin!($name) };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                concat!(".size ", asm_mangle!($name), ", . - ", asm_mangle!($name), "\n")
            };
        }
        macro_rules! cfi_signal_frame {
            () => { ".cfi_signal_frame" };
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", not(windows)))] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(all(target_arch = "aarch64", not(windows)))] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        compile_error!("sharestack only supports x86_64 and aarch64 on non-Windows targets");
    }
}

/// Function the trampoline jumps to on the first switch into a context.
///
/// It receives the parent link slot and the scheduler handle stored by
/// `init_stack`, and leaves through `switch_and_reset`.
pub type InitialFunc = unsafe extern "C" fn(parent_link: &mut StackPointer, handle: *const Handle) -> !;

/// Distance of the parent link below the stack base.
pub const PARENT_LINK_DEPTH: usize = 16;

/// Distance of the scheduler handle below the stack base.
pub const HANDLE_DEPTH: usize = 24;

/// Writes the three words shared by every context and returns the stack
/// pointer below them, aligned to `STACK_ALIGNMENT`.
#[inline]
unsafe fn push_header(stack_base: StackPointer, func: InitialFunc, handle: *const Handle) -> usize {
    let mut sp = stack_base.get();
    push(&mut sp, Some(func as *const () as StackWord));
    // Parent link, written by every switch_and_link().
    push(&mut sp, None);
    push(&mut sp, Some(handle as StackWord));
    push(&mut sp, None);
    debug_assert_eq!(stack_base.get() - sp, HANDLE_DEPTH + mem::size_of::<StackWord>());
    debug_assert_eq!(sp % STACK_ALIGNMENT, 0);
    sp
}

#[inline]
unsafe fn push(sp: &mut usize, val: Option<StackWord>) {
    *sp -= mem::size_of::<StackWord>();
    if let Some(val) = val {
        *(*sp as *mut StackWord) = val;
    }
}

/// Address of the parent link slot of a stack with the given base.
#[inline]
pub fn parent_link(stack_base: StackPointer) -> *mut StackPointer {
    (stack_base.get() - PARENT_LINK_DEPTH) as *mut StackPointer
}
