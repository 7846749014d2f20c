//! x86_64 platform initialization

pub mod boot;
pub mod idt;
pub mod mm;

/// x86_64 init sequence
///
/// GDT остаётся от Limine: свой нужен только для TSS/IST.
/// The Limine GDT stays; ours would only matter for TSS/IST.
pub fn init() {
    idt::init();   // Interrupt Descriptor Table
}

/// Ждать прерывания / Wait for an interrupt
pub fn halt() {
    // SAFETY: hlt only pauses the CPU.
    unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
}
