//! kshadow kernel — точка входа / entry point
//!
//! Минимальное ядро под Limine, которое поднимает shadow-память KASAN.
//! A minimal Limine kernel that brings up KASAN shadow memory.

#![no_std]
#![no_main]
#![deny(unsafe_op_in_unsafe_fn)]

use core::panic::PanicInfo;

use kshadow::hal::RootSwitch;
use kshadow::kasan::map_early_shadow;
use kshadow::mm::paging::Table;
use kshadow::{init_shadow_memory, BootInfo, InstrumentationDepth, Placeholders, ShadowLayout, ShadowState};

mod arch;
mod bootinfo;
mod drivers;
mod fault;
mod logger;
mod mm;

/// Уровень журнала / Log level
const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Debug;

/// kasan_depth начального контекста / kasan_depth of the initial context
static KASAN_DEPTH: InstrumentationDepth = InstrumentationDepth::new();
static SHADOW_STATE: ShadowState = ShadowState::new();

extern "C" {
    /// Конец образа ядра (последний байт BSS) / End of the kernel image
    static __bss_end: u8;
}

/// Точка входа ядра — вызывается из `_start`.
/// Kernel entry point — called from `_start`.
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    // 0. UART и журнал — первым делом / UART and logging first
    drivers::uart::init();
    logger::init(LOG_LEVEL);
    kprintln!("kshadow booting...");

    // 1. IDT
    arch::init();
    log::info!("[arch] IDT loaded");

    // 2. Что дал Limine / What Limine handed over
    let boot = bootinfo::collect();
    log::info!(
        "[boot] hhdm={:#x}, {} memory extents, {} usable",
        boot.hhdm.as_u64(),
        boot.ram.extents().len(),
        boot.usable.extents().len()
    );

    // 3. Аллокатор кадров ранней стадии / Early frame allocator
    mm::pmm::init(&boot.usable, boot.hhdm);

    let mut platform = arch::current::mm::BootPlatform::new(boot.hhdm);

    // 4. Заглушки и ранняя ядовитая shadow / Placeholders and early poisoned shadow
    let placeholders = match Placeholders::new(&mut platform) {
        Ok(placeholders) => placeholders,
        Err(err) => panic!("kasan: unable to allocate placeholders ({})", err),
    };
    // SAFETY: CR3 holds the live top-level table Limine built.
    let root = unsafe { Table::from_frame(platform.active_root()) };
    map_early_shadow(&platform, root, &placeholders);

    // 5. Настоящая shadow / Real shadow
    let info = BootInfo {
        layout:     ShadowLayout::X86_64.with_direct_map_base(boot.hhdm),
        memory_map: boot.ram.with_sentinel(),
        // SAFETY: linker-provided symbol; only its address is taken.
        kernel_end: kshadow::VirtAddr::new(unsafe { core::ptr::addr_of!(__bss_end) } as u64),
    };
    let stats = init_shadow_memory(&mut platform, &placeholders, info, &KASAN_DEPTH, &SHADOW_STATE);

    kprintln!("");
    kprintln!("  shadow ready: {} pages, {} tables, {} shared entries",
        stats.real_pages, stats.private_tables, stats.shared_entries);
    kprintln!("  boot frames used: {}", mm::pmm::allocated());
    kprintln!("");

    loop {
        arch::current::halt();
    }
}

/// Panic handler — выводим в UART и halt.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kprintln!("\n[KERNEL PANIC] {}", info);
    loop {
        core::hint::spin_loop();
    }
}
