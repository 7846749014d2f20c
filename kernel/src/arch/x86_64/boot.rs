//! x86_64 boot entry point
//!
//! Limine прыгает сюда в long mode с выключенными прерываниями, уже на своих
//! таблицах страниц (HHDM + образ ядра). Корень этих таблиц и станет
//! постоянным корнем, в котором строится shadow.
//! Limine jumps here in long mode with interrupts off, already running on its
//! own page tables (HHDM + kernel image). That root becomes the permanent root
//! the shadow is built into.
//!
//! `__bss_end` — конец образа; ядро берёт его как `_end` для shadow образа.
//! `__bss_end` ends the image; the kernel uses it as `_end` for image shadow.

use core::arch::global_asm;

global_asm!(
    r#"
.section .text
.global _start
_start:
    cli

    /* 64 KiB boot stack, 16-byte aligned */
    leaq boot_stack_top(%rip), %rsp
    andq $-16, %rsp
    xorl %ebp, %ebp

    /* Zero BSS: rdi = __bss_start, rcx = byte count, al = 0 */
    leaq __bss_start(%rip), %rdi
    leaq __bss_end(%rip),   %rcx
    subq %rdi, %rcx
    xorl %eax, %eax
    rep stosb

    callq kernel_main

.hang:
    cli
    hlt
    jmp .hang

.section .bss
.balign 4096
boot_stack_bottom:
    .skip 65536
boot_stack_top:
"#,
    options(att_syntax)
);
