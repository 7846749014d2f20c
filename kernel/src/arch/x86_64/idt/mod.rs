//! Interrupt Descriptor Table (IDT) — x86_64
//!
//! Только исключения процессора: IRQ не разрешаются.
//! CPU exceptions only; IRQs stay disabled.
//!
//! Важные векторы / Important vectors:
//!   0x00 #DE  — Division Error
//!   0x06 #UD  — Invalid Opcode
//!   0x08 #DF  — Double Fault     (критический / critical)
//!   0x0D #GP  — General Protection Fault → цепочка уведомлений / fault chain
//!   0x0E #PF  — Page Fault               → цепочка уведомлений / fault chain

use core::arch::{asm, naked_asm};

use kshadow::hal::{FaultEvent, FaultKind, NotifyAction};
use kshadow::VirtAddr;

// ── Дескриптор прерывания / Interrupt descriptor (16 байт) ───────────────────

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low:  u16, // биты 0–15 обработчика  / handler bits 0–15
    selector:    u16, // сегмент кода / code segment
    ist:         u8,  // Interrupt Stack Table index (0 = не использовать)
    type_attr:   u8,  // тип + атрибуты / type + attributes
    offset_mid:  u16, // биты 16–31 обработчика / handler bits 16–31
    offset_high: u32, // биты 32–63 обработчика / handler bits 32–63
    reserved:    u32,
}

/// Present | ring 0 | Interrupt Gate (IF сбрасывается / IF cleared)
const GATE_KERNEL: u8 = 0x8E;

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0, selector: 0, ist: 0,
            type_attr: 0, offset_mid: 0,
            offset_high: 0, reserved: 0,
        }
    }

    fn new(handler: u64, selector: u16) -> Self {
        Self {
            offset_low:  (handler & 0xFFFF) as u16,
            selector,
            ist:         0,
            type_attr:   GATE_KERNEL,
            offset_mid:  ((handler >> 16) & 0xFFFF) as u16,
            offset_high: (handler >> 32) as u32,
            reserved:    0,
        }
    }
}

// ── IDTR ─────────────────────────────────────────────────────────────────────

#[repr(C, packed)]
struct IdtDescriptor {
    size:   u16,
    offset: u64,
}

// ── Таблица IDT / IDT table ───────────────────────────────────────────────────

const IDT_SIZE: usize = 256;
static mut IDT: [IdtEntry; IDT_SIZE] = [IdtEntry::missing(); IDT_SIZE];

// ── Контекст прерывания / Interrupt frame ─────────────────────────────────────

/// CPU автоматически помещает на стек при прерывании.
/// CPU automatically pushes on the stack on interrupt.
#[repr(C)]
pub struct InterruptFrame {
    pub rip:    u64,
    pub cs:     u64,
    pub rflags: u64,
    pub rsp:    u64,
    pub ss:     u64,
}

// ── Макрос для обработчиков / Handler macro ───────────────────────────────────
//
// Обработчик получает (rdi = &InterruptFrame, rsi = error code) и не
// возвращается: все исключения здесь фатальны.
// The handler gets (rdi = &InterruptFrame, rsi = error code) and never
// returns; every exception here is fatal.

/// Создать naked обработчик прерывания без error code.
macro_rules! isr_handler {
    ($name:ident, $handler:path) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                "xor esi, esi",
                "mov rdi, rsp",
                "and rsp, -16",
                "call {handler}",
                "ud2",
                handler = sym $handler,
            );
        }
    };
}

/// Создать обработчик с error code.
macro_rules! isr_handler_err {
    ($name:ident, $handler:path) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!(
                // error code уже на стеке / error code already on stack
                "mov rsi, [rsp]",
                "lea rdi, [rsp + 8]",
                "and rsp, -16",
                "call {handler}",
                "ud2",
                handler = sym $handler,
            );
        }
    };
}

// ── Обработчики исключений / Exception handlers ───────────────────────────────

extern "C" fn handle_divide_error(frame: &InterruptFrame, _error: u64) -> ! {
    panic!("Division Error at RIP={:#x}", frame.rip);
}

extern "C" fn handle_invalid_opcode(frame: &InterruptFrame, _error: u64) -> ! {
    panic!("Invalid Opcode at RIP={:#x}", frame.rip);
}

extern "C" fn handle_double_fault(frame: &InterruptFrame, error: u64) -> ! {
    panic!("Double Fault (error={:#x}) at RIP={:#x}", error, frame.rip);
}

/// #GP — сначала подписчики (подсказка KASAN), потом паника.
/// #GP — subscribers first (the KASAN hint), then panic.
extern "C" fn handle_general_protection(frame: &InterruptFrame, error: u64) -> ! {
    let event = FaultEvent {
        kind:       FaultKind::GeneralProtection,
        ip:         frame.rip,
        error_code: error,
        addr:       None,
    };
    if crate::fault::notify(&event) == NotifyAction::Stop {
        log::warn!("General Protection Fault claimed by a subscriber");
    }
    panic!("General Protection Fault (error={:#x}) at RIP={:#x}", error, frame.rip);
}

extern "C" fn handle_page_fault(frame: &InterruptFrame, error: u64) -> ! {
    // Виновный виртуальный адрес — в регистре CR2
    // Faulting virtual address is in CR2
    let cr2: u64;
    // SAFETY: reading CR2 has no side effects.
    unsafe { asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack)) };
    let addr = VirtAddr::new(cr2);

    let event = FaultEvent {
        kind:       FaultKind::PageFault,
        ip:         frame.rip,
        error_code: error,
        addr:       Some(addr),
    };
    crate::fault::notify(&event);

    if let Some(area) = crate::mm::vmm::area_of(addr) {
        log::error!("Page Fault inside early area {}", area.name);
    }
    panic!(
        "Page Fault at RIP={:#x} addr={:#x} error={:#x}",
        frame.rip, cr2, error
    );
}

// ── Naked заглушки / Naked stubs ──────────────────────────────────────────────

isr_handler!(isr_divide_error,      handle_divide_error);
isr_handler!(isr_invalid_opcode,    handle_invalid_opcode);
isr_handler_err!(isr_double_fault,  handle_double_fault);
isr_handler_err!(isr_gp_fault,      handle_general_protection);
isr_handler_err!(isr_page_fault,    handle_page_fault);

// ── Инициализация / Initialization ───────────────────────────────────────────

/// Текущий селектор кода (GDT от Limine) / Current code selector (Limine GDT)
fn code_selector() -> u16 {
    let cs: u16;
    // SAFETY: reading CS has no side effects.
    unsafe { asm!("mov {0:x}, cs", out(reg) cs, options(nomem, nostack)) };
    cs
}

/// Инициализировать IDT и загрузить IDTR.
/// Initialize IDT and load IDTR.
pub fn init() {
    let selector = code_selector();

    // SAFETY: single CPU, interrupts off; nothing else touches IDT yet.
    unsafe {
        let idt = &mut *core::ptr::addr_of_mut!(IDT);
        let mut set = |vec: usize, handler: unsafe extern "C" fn()| {
            idt[vec] = IdtEntry::new(handler as usize as u64, selector);
        };

        // Исключения процессора / CPU exceptions
        set(0x00, isr_divide_error);
        set(0x06, isr_invalid_opcode);
        set(0x08, isr_double_fault);
        set(0x0D, isr_gp_fault);
        set(0x0E, isr_page_fault);

        // Загрузить IDTR / Load IDTR
        let descriptor = IdtDescriptor {
            size:   (core::mem::size_of::<[IdtEntry; IDT_SIZE]>() - 1) as u16,
            offset: idt.as_ptr() as u64,
        };
        asm!("lidt [{desc}]", desc = in(reg) &descriptor, options(readonly, nostack));
    }
}
