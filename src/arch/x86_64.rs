//! This file contains the low level operations that switch between the host
//! stack and the shared coroutine stack.
//!
//! The core operations are:
//! - `init_stack` to initialize the shared stack for a first resume.
//! - `switch_and_link` to switch control into a coroutine.
//! - `switch_yield` to return control from a coroutine back to the host.
//! - `switch_and_reset` to return control for the last time.
//!
//! ## Linked stacks
//!
//! A copy of the host stack pointer is stashed near the base of the shared
//! stack and refreshed every time we switch into a coroutine with
//! `switch_and_link`. The coroutine finds its way back through that slot when
//! it yields or returns. Since every coroutine runs on the same region, they
//! all share the one slot.
//!
//! DWARF CFI on the initial trampoline tells the unwinder how to get from the
//! root of a coroutine back into the host frame that resumed it, so backtraces
//! taken inside a coroutine continue into the host.
//!
//! ## Saved state
//!
//! A suspended coroutine keeps *all* of its state at or above its stack
//! pointer: callee-saved registers are spilled into its own frames by the
//! compiler (they are declared as clobbers) or pushed explicitly below. This
//! is what allows the scheduler to copy `[sp, base)` out of the shared stack
//! and later copy it back to the same addresses.
//!
//! ## Stack layout
//!
//! Here is what the layout of the stack looks like when a coroutine is
//! suspended.
//!
//! ```text
//! +--------------+  <- Stack base
//! | Initial func |  <- Only used once when resuming for the first time.
//! +--------------+
//! | Parent link  |  <- Points to the top of the host stack while a
//! +--------------+     coroutine is running.
//! |              |
//! ~     ...      ~
//! |              |
//! +--------------+
//! | Saved RBP    |
//! +--------------+
//! | Saved RBX    |
//! +--------------+
//! | Saved RIP    |
//! +--------------+  <- Saved stack pointer
//! ```
//!
//! And this is the layout of the host stack when a coroutine is running:
//!
//! ```text
//! |             |
//! ~     ...     ~
//! |             |
//! +-------------+
//! | Saved RBX   |
//! +-------------+
//! | Saved RIP   |  <- These 2 values form a valid entry in the frame pointer
//! +-------------+   | chain.
//! | Saved RBP   |
//! +-------------+  <- Parent link points here.
//! ```
//!
//! And finally, this is the stack layout right after `init_stack`:
//!
//! ```text
//! +--------------+  <- Stack base
//! | Initial func |
//! +--------------+
//! | Parent link  |  <- This hasn't been filled in yet at this point.
//! +--------------+
//! | Handle       |
//! +--------------+
//! | Padding      |
//! +--------------+
//! | Initial RIP  |  <- Points to sharestack_init_trampoline
//! +--------------+  <- Initial stack pointer
//! ```

use core::arch::{asm, global_asm};

use super::{push, push_header, InitialFunc};
use crate::scheduler::Handle;
use crate::stack::StackPointer;
use crate::unwind::RootResult;

pub const STACK_ALIGNMENT: usize = 16;
pub type StackWord = u64;

// The "base" function of every coroutine. init_stack() arranges for the first
// switch_and_link() into a fresh stack to land here.
//
// The frame also stays on the stack for the whole life of the coroutine and
// carries the DWARF information needed to unwind into the host.
global_asm!(
    ".balign 16",
    asm_function_begin!("sharestack_init_trampoline"),
    ".cfi_startproc",
    // Marking this as a signal frame keeps GDB from rejecting backtraces
    // where the frame addresses do not monotonically increase, which happens
    // whenever the shared stack sits above the host stack.
    cfi_signal_frame!(),
    // Register state on entry:
    // - RSP points to the top of the host stack.
    // - RBP holds its value from the host.
    // - RDX points to the top of our stack.
    // - RSI points to the base of our stack.
    //
    // Save the host RBP so it forms a frame record with the return address.
    "push rbp",
    // Fill in the parent link, which is also the first argument.
    "mov [rsi - 16], rsp",
    "lea rdi, [rsi - 16]",
    // The handle is the second argument.
    "mov rsi, [rsi - 24]",
    // Switch to the coroutine stack, skipping the address of this trampoline.
    "lea rsp, [rdx + 8]",
    // Set up the frame pointer to point at the parent link.
    "mov rbp, rdi",
    // Canonical Frame Address of the host: read the parent link through RBP
    // and skip the 3 values saved on the host stack.
    //
    // 0x0f: DW_CFA_def_cfa_expression
    // 5: byte length of the following DWARF expression
    // 0x76 0x00: DW_OP_breg6 (rbp + 0)
    // 0x06: DW_OP_deref
    // 0x23, 0x18: DW_OP_plus_uconst 24
    ".cfi_escape 0x0f, 5, 0x76, 0x00, 0x06, 0x23, 0x18",
    ".cfi_offset rbx, -8",
    ".cfi_offset rip, -16",
    ".cfi_offset rbp, -24",
    // Fake the call with PUSH + JMP so that the RET in switch_yield() or
    // switch_and_reset() does not unbalance the return address predictor.
    concat!(
        "lea rcx, [rip + ",
        asm_mangle!("sharestack_init_trampoline_return"),
        "]"
    ),
    "push rcx",
    // The entry function sits just above the parent link.
    "jmp [rdi + 8]",
    // The entry function never returns.
    asm_function_alt_entry!("sharestack_init_trampoline_return"),
    // Keep the return address inside the function bounds for GDB. Never
    // executed.
    "int3",
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

    // Popped by the CALL in switch_and_link().
    push(&mut sp, Some(sharestack_init_trampoline as *const () as StackWord));

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
        // RBX is an LLVM reserved register and can't be a clobber. RBP is
        // pushed later to form a frame record.
        "push rbx",

        // Push a return address onto our stack and jump to the address at the
        // top of the coroutine stack: either the init trampoline or the 2:
        // label in switch_yield.
        "call [rdx]",

        // Upon returning:
        // - RSP: Our stack, with the return address and RBP popped.
        // - RSI: The top of the coroutine stack, or 0 if coming from
        //        switch_and_reset.
        // - RDI: The outcome pointer if coming from switch_and_reset.
        "pop rbx",

        lateout("rdi") result,
        lateout("rsi") ret_sp,
        in("rsi") stack_base.get() as u64,
        in("rdx") sp.get() as u64,

        // Everything the coroutine could touch is clobbered. Letting the
        // compiler spill the callee-saved registers is cheaper than saving
        // them all by hand.
        lateout("r12") _, lateout("r13") _, lateout("r14") _, lateout("r15") _,
        clobber_abi("sysv64"),
    );

    (result as *const RootResult, StackPointer::new(ret_sp))
}

/// Returns control to the host that last resumed this context. The host gets
/// our stack pointer back from `switch_and_link`.
// Must be inlined because it is very sensitive to the CPU's return address
// predictor.
#[inline(always)]
pub unsafe fn switch_yield(parent_link: *mut StackPointer) {
    asm!(
        // Save RBP and RBX.
        "push rbp",
        "push rbx",

        // Return address used by switch_and_link() the next time this
        // context is resumed.
        "lea rax, [rip + 2f]",
        "push rax",

        // Our stack pointer goes back to the host in RSI.
        "mov rsi, rsp",

        // Load the host stack pointer and restore its RBP.
        "mov rsp, [rdx]",
        "pop rbp",

        // Return into switch_and_link() after its CALL.
        "ret",

        // Entered from switch_and_link(), possibly after the stack was copied
        // back in:
        // - RSP points to the top of the host stack.
        // - RBP holds its value from the host.
        // - RDX points to the top of our stack, including the return address.
        // - RSI points to the base of our stack.
        "2:",

        // Frame record for the host, then refresh the parent link.
        "push rbp",
        "mov [rsi - 16], rsp",

        // Back onto our stack, skipping the return address.
        "lea rsp, [rdx + 8]",

        "pop rbx",
        "pop rbp",

        in("rdx") parent_link as u64,

        lateout("r12") _, lateout("r13") _, lateout("r14") _, lateout("r15") _,
        clobber_abi("sysv64"),
    );
}

/// Leaves the context for the last time. The host receives a stack pointer
/// of 0 and `result`.
///
/// `result` points into this stack: the host reads it before anything else
/// runs on the shared stack. No object with a pending destructor may be left
/// on the stack.
#[inline(always)]
pub unsafe fn switch_and_reset(result: *const RootResult, parent_link: *mut StackPointer) -> ! {
    asm!(
        "mov rsp, [{parent_link}]",
        "pop rbp",
        "ret",

        parent_link = in(reg) parent_link as u64,
        in("rdi") result as u64,
        in("rsi") 0u64,

        options(noreturn),
    );
}

/// Reads the current stack pointer.
#[inline(always)]
pub fn current_stack_ptr() -> usize {
    let sp: usize;
    unsafe {
        asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}
