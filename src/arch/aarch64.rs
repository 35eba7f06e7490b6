//! Low-level AArch64 support.
//!
//! This file follows the x86_64 implementation closely. Relevant differences
//! are highlighted in comments; refer to x86_64.rs for the rest.
//!
//! ## Stack layout
//!
//! Here is what the layout of the stack looks like when a coroutine is
//! suspended.
//!
//! ```text
//! +--------------+  <- Stack base
//! | Initial func |
//! +--------------+
//! | Parent link  |
//! +--------------+
//! |              |
//! ~     ...      ~
//! |              |
//! +--------------+
//! | Padding      |
//! +--------------+
//! | Saved PC     |
//! +--------------+
//! | Saved X29    |
//! +--------------+
//! | Saved X19    |
//! +--------------+  <- Saved stack pointer
//! ```
//!
//! And this is the layout of the host stack when a coroutine is running:
//!
//! ```text
//! |           |
//! ~    ...    ~
//! |           |
//! +-----------+
//! | Padding   |
//! +-----------+
//! | Saved X19 |
//! +-----------+
//! | Saved PC  |
//! +-----------+
//! | Saved X29 |
//! +-----------+
//! ```
//!
//! And finally, this is the stack layout right after `init_stack`:
//!
//! ```text
//! +--------------+  <- Stack base
//! | Initial func |
//! +--------------+
//! | Parent link  |
//! +--------------+
//! | Handle       |
//! +--------------+
//! | Padding      |
//! +--------------+
//! | Padding      |
//! +--------------+
//! | Initial PC   |
//! +--------------+
//! | Padding      |
//! +--------------+
//! | Padding      |
//! +--------------+  <- Initial stack pointer
//! ```

use core::arch::{asm, global_asm};

use super::{push, push_header, InitialFunc};
use crate::scheduler::Handle;
use crate::stack::StackPointer;
use crate::unwind::RootResult;

pub const STACK_ALIGNMENT: usize = 16;
pub type StackWord = u64;

global_asm!(
    ".balign 4",
    asm_function_begin!("sharestack_init_trampoline"),
    ".cfi_startproc",
    cfi_signal_frame!(),
    // Register state on entry:
    // - SP points to the top of the host stack.
    // - LR contains the return address in the host.
    // - X19 and X29 contain their value from the host.
    // - X2 points to the top of the coroutine stack.
    // - X1 points to the base of our stack.
    //
    // Frame record and X19 of the host go on the host stack.
    "stp x29, lr, [sp, #-32]!",
    "str x19, [sp, #16]",
    // Fill in the parent link and point X0, the first argument, at it.
    "mov x3, sp",
    "str x3, [x1, #-16]!",
    "mov x0, x1",
    // The handle is the second argument.
    "ldr x1, [x0, #-8]",
    // Switch to the coroutine stack, dropping the initial PC and padding.
    "add sp, x2, #32",
    // The frame pointer points at the parent link.
    "mov x29, x0",
    // 0x0f: DW_CFA_def_cfa_expression
    // 5: byte length of the following DWARF expression
    // 0x8d 0x00: DW_OP_breg29 (x29 + 0)
    // 0x06: DW_OP_deref
    // 0x23, 0x20: DW_OP_plus_uconst 32
    ".cfi_escape 0x0f, 5, 0x8d, 0x00, 0x06, 0x23, 0x20",
    ".cfi_offset x19, -16",
    ".cfi_offset lr, -24",
    ".cfi_offset x29, -32",
    // Jump to the entry function with LR pointing inside this function, so
    // that no entry is pushed onto the return prediction stack.
    "adr lr, 2f",
    "ldr x3, [x0, #8]",
    "br x3",
    // ADR can't reference a global symbol on Mach-O, hence the local label.
    "2:",
    asm_function_alt_entry!("sharestack_init_trampoline_return"),
    // The entry function never returns.
    "brk #0",
    ".cfi_endproc",
    asm_function_end!("sharestack_init_trampoline"),
);

// Uses a custom calling convention and must only be reached through inline
// assembly.
extern "C" {
    fn sharestack_init_trampoline(stack_base: StackPointer, stack_ptr: StackPointer);
}

/// Lays out a fresh context on the stack so that the first switch into it
/// calls `func(parent_link, handle)`.
#[inline]
pub unsafe fn init_stack(stack_base: StackPointer, func: InitialFunc, handle: *const Handle) -> StackPointer {
    let mut sp = push_header(stack_base, func, handle);

    // switch_and_link() loads the target PC 16 bytes above the stack pointer
    // and then pops 32 bytes.
    push(&mut sp, None);
    push(&mut sp, Some(sharestack_init_trampoline as *const () as StackWord));
    push(&mut sp, None);
    push(&mut sp, None);

    StackPointer::new_unchecked(sp)
}

/// Transfers control to the context at `sp`, storing a link back to our
/// context in the parent link slot below `stack_base`.
///
/// Returns the stack pointer of the context if it yielded. If it finished
/// instead, returns `None` together with the outcome it handed over.
#[inline]
pub unsafe fn switch_and_link(
    sp: StackPointer,
    stack_base: StackPointer,
) -> (*const RootResult, Option<StackPointer>) {
    let (result, ret_sp): (usize, usize);

    asm!(
        // Read the saved PC from the coroutine stack and call it.
        "ldr x3, [x2, #16]",
        "blr x3",

        // Upon returning:
        // - X2: Our stack pointer.
        // - X1: The top of the coroutine stack, or 0 if coming from
        //       switch_and_reset.
        // - X0: The outcome pointer if coming from switch_and_reset.

        // Switch back to our stack and free the saved registers.
        "add sp, x2, #32",

        lateout("x0") result,
        lateout("x1") ret_sp,
        in("x1") stack_base.get() as u64,
        in("x2") sp.get() as u64,

        // clobber_abi() marks X18 as clobbered if the platform does not
        // reserve it.
        lateout("x20") _, lateout("x21") _, lateout("x22") _, lateout("x23") _,
        lateout("x24") _, lateout("x25") _, lateout("x26") _, lateout("x27") _,
        lateout("x28") _,
        clobber_abi("C"),
    );

    (result as *const RootResult, StackPointer::new(ret_sp))
}

/// Returns control to the host that last resumed this context.
#[inline(always)]
pub unsafe fn switch_yield(parent_link: *mut StackPointer) {
    asm!(
        // Save X19 and X29 and reserve room for our saved PC.
        "stp x19, x29, [sp, #-32]!",
        "adr lr, 2f",
        "str lr, [sp, #16]",

        // Hand our stack pointer to the host in X1 and the host's own in X2.
        "ldr x2, [x2]",
        "mov x1, sp",

        // Restore the host's X19, X29 and LR, and return into it.
        "ldr x19, [x2, #16]",
        "ldp x29, lr, [x2]",
        "ret",

        // Entered from switch_and_link(), possibly after the stack was copied
        // back in:
        // - SP points to the top of the host stack.
        // - LR contains the return address in the host.
        // - X19 and X29 contain their value from the host.
        // - X2 points to the top of the coroutine stack.
        // - X1 points to the base of our stack.
        "2:",

        "stp x29, lr, [sp, #-32]!",
        "str x19, [sp, #16]",

        // Refresh the parent link.
        "mov x3, sp",
        "str x3, [x1, #-16]",

        // Restore our X19 and X29, then drop them along with the saved PC.
        "ldp x19, x29, [x2]",
        "add sp, x2, #32",

        in("x2") parent_link as u64,

        lateout("x20") _, lateout("x21") _, lateout("x22") _, lateout("x23") _,
        lateout("x24") _, lateout("x25") _, lateout("x26") _, lateout("x27") _,
        lateout("x28") _,
        clobber_abi("C"),
    );
}

/// Leaves the context for the last time. The host receives a stack pointer
/// of 0 and `result`, which points into this stack.
#[inline(always)]
pub unsafe fn switch_and_reset(result: *const RootResult, parent_link: *mut StackPointer) -> ! {
    asm!(
        "ldr x2, [{parent_link}]",
        "ldr x19, [x2, #16]",
        "ldp x29, lr, [x2]",
        "ret",

        parent_link = in(reg) parent_link as u64,
        in("x0") result as u64,
        in("x1") 0u64,

        options(noreturn),
    );
}

/// Reads the current stack pointer.
#[inline(always)]
pub fn current_stack_ptr() -> usize {
    let sp: usize;
    unsafe {
        asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}
