//! Architecture-specific context switching.
//!
//! A suspended context is represented by the stack pointer it was saved at.
//! The callee-saved registers live on that stack, right below the return
//! address of the switch call, so resuming is a matter of loading the
//! pointer, popping the registers back and returning.

use std::arch::global_asm;

/// Stack pointer of a suspended execution context.
pub(crate) type StackPointer = usize;

/// First Rust function executed on a fresh coroutine stack.
pub(crate) type Entry = unsafe extern "C" fn(arg: *mut u8) -> !;

unsafe extern "C" {
    /// Spills callee-saved registers onto the current stack, stores the stack
    /// pointer into `save`, switches to `load` and restores the registers
    /// found there.
    pub(crate) fn spindle_switch(save: *mut StackPointer, load: StackPointer);

    /// Bottom frame of every coroutine. Moves the argument into place and
    /// calls the entry function, which never returns.
    fn spindle_trampoline();
}

#[cfg(not(all(unix, any(target_arch = "x86_64", target_arch = "aarch64"))))]
compile_error!("spindle supports x86_64 and aarch64 unix targets only");

/// Lays out an initial frame at the top of a stack so that the first
/// [`spindle_switch`] into it lands in `entry(arg)`.
///
/// # Safety
///
/// `top` must be the upper end of a writable region of at least a few
/// hundred bytes that stays mapped for as long as the context is used.
#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn prepare(top: *mut u8, entry: Entry, arg: *mut u8) -> StackPointer {
    // r15, r14, r13, r12, rbx, rbp, return address, then two padding words so
    // that rsp is 16-byte aligned right before the trampoline's `call`.
    let top = top as usize & !0xF;
    let sp = top - 9 * 8;
    let frame = sp as *mut usize;

    unsafe {
        frame.add(0).write(0);
        frame.add(1).write(0);
        frame.add(2).write(entry as usize);
        frame.add(3).write(arg as usize);
        frame.add(4).write(0);
        frame.add(5).write(0);
        frame.add(6).write(spindle_trampoline as *const () as usize);
        frame.add(7).write(0);
        frame.add(8).write(0);
    }

    sp
}

/// Lays out an initial frame at the top of a stack so that the first
/// [`spindle_switch`] into it lands in `entry(arg)`.
///
/// # Safety
///
/// `top` must be the upper end of a writable region of at least a few
/// hundred bytes that stays mapped for as long as the context is used.
#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn prepare(top: *mut u8, entry: Entry, arg: *mut u8) -> StackPointer {
    // x19..x30 followed by d8..d15, matching the spill area of the switch.
    let top = top as usize & !0xF;
    let sp = top - 20 * 8;
    let frame = sp as *mut usize;

    unsafe {
        for i in 0..20 {
            frame.add(i).write(0);
        }
        frame.add(0).write(arg as usize);
        frame.add(1).write(entry as usize);
        frame.add(11).write(spindle_trampoline as *const () as usize);
    }

    sp
}

#[cfg(all(target_arch = "x86_64", not(target_vendor = "apple")))]
global_asm!(
    ".text",
    ".global spindle_switch",
    ".p2align 4",
    "spindle_switch:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
    "",
    ".global spindle_trampoline",
    ".p2align 4",
    "spindle_trampoline:",
    "mov rdi, r12",
    "call r13",
    "ud2",
);

#[cfg(all(target_arch = "x86_64", target_vendor = "apple"))]
global_asm!(
    ".text",
    ".global _spindle_switch",
    ".p2align 4",
    "_spindle_switch:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
    "",
    ".global _spindle_trampoline",
    ".p2align 4",
    "_spindle_trampoline:",
    "mov rdi, r12",
    "call r13",
    "ud2",
);

#[cfg(all(target_arch = "aarch64", not(target_vendor = "apple")))]
global_asm!(
    ".text",
    ".global spindle_switch",
    ".p2align 2",
    "spindle_switch:",
    "sub sp, sp, #0xa0",
    "stp x19, x20, [sp, #0x00]",
    "stp x21, x22, [sp, #0x10]",
    "stp x23, x24, [sp, #0x20]",
    "stp x25, x26, [sp, #0x30]",
    "stp x27, x28, [sp, #0x40]",
    "stp x29, x30, [sp, #0x50]",
    "stp d8, d9, [sp, #0x60]",
    "stp d10, d11, [sp, #0x70]",
    "stp d12, d13, [sp, #0x80]",
    "stp d14, d15, [sp, #0x90]",
    "mov x9, sp",
    "str x9, [x0]",
    "mov sp, x1",
    "ldp x19, x20, [sp, #0x00]",
    "ldp x21, x22, [sp, #0x10]",
    "ldp x23, x24, [sp, #0x20]",
    "ldp x25, x26, [sp, #0x30]",
    "ldp x27, x28, [sp, #0x40]",
    "ldp x29, x30, [sp, #0x50]",
    "ldp d8, d9, [sp, #0x60]",
    "ldp d10, d11, [sp, #0x70]",
    "ldp d12, d13, [sp, #0x80]",
    "ldp d14, d15, [sp, #0x90]",
    "add sp, sp, #0xa0",
    "ret",
    "",
    ".global spindle_trampoline",
    ".p2align 2",
    "spindle_trampoline:",
    "mov x0, x19",
    "blr x20",
    "brk #1",
);

#[cfg(all(target_arch = "aarch64", target_vendor = "apple"))]
global_asm!(
    ".text",
    ".global _spindle_switch",
    ".p2align 2",
    "_spindle_switch:",
    "sub sp, sp, #0xa0",
    "stp x19, x20, [sp, #0x00]",
    "stp x21, x22, [sp, #0x10]",
    "stp x23, x24, [sp, #0x20]",
    "stp x25, x26, [sp, #0x30]",
    "stp x27, x28, [sp, #0x40]",
    "stp x29, x30, [sp, #0x50]",
    "stp d8, d9, [sp, #0x60]",
    "stp d10, d11, [sp, #0x70]",
    "stp d12, d13, [sp, #0x80]",
    "stp d14, d15, [sp, #0x90]",
    "mov x9, sp",
    "str x9, [x0]",
    "mov sp, x1",
    "ldp x19, x20, [sp, #0x00]",
    "ldp x21, x22, [sp, #0x10]",
    "ldp x23, x24, [sp, #0x20]",
    "ldp x25, x26, [sp, #0x30]",
    "ldp x27, x28, [sp, #0x40]",
    "ldp x29, x30, [sp, #0x50]",
    "ldp d8, d9, [sp, #0x60]",
    "ldp d10, d11, [sp, #0x70]",
    "ldp d12, d13, [sp, #0x80]",
    "ldp d14, d15, [sp, #0x90]",
    "add sp, sp, #0xa0",
    "ret",
    "",
    ".global _spindle_trampoline",
    ".p2align 2",
    "_spindle_trampoline:",
    "mov x0, x19",
    "blr x20",
    "brk #1",
);
