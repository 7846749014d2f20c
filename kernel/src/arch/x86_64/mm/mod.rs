//! x86_64 сторона HAL для shadow / x86_64 side of the shadow HAL
//!
//! CR3, HHDM, аллокатор ранней стадии, ранние резервы и цепочка исключений,
//! собранные в одну платформу для `kshadow`.
//! CR3, the HHDM, the early allocator, early reservations and the fault chain
//! gathered into one platform for `kshadow`.

use core::arch::asm;

use kshadow::hal::{FaultBus, FaultHandler, FrameAllocator, PhysMap, RootSwitch, VmReserve};

use crate::mm::{pmm, vmm, PhysAddr, VirtAddr};

/// Биты 12–51 CR3; младшие — PCID/флаги / Bits 12–51; the low bits are PCID/flags
const CR3_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

pub struct BootPlatform {
    hhdm: VirtAddr,
}

impl BootPlatform {
    pub fn new(hhdm: VirtAddr) -> Self {
        Self { hhdm }
    }
}

impl FrameAllocator for BootPlatform {
    fn alloc_zeroed_page(&mut self) -> Option<PhysAddr> {
        pmm::alloc_zeroed()
    }
}

impl PhysMap for BootPlatform {
    fn phys_to_virt(&self, phys: PhysAddr) -> VirtAddr {
        VirtAddr::new(self.hhdm.as_u64() + phys.as_u64())
    }
}

impl RootSwitch for BootPlatform {
    fn active_root(&self) -> PhysAddr {
        let cr3: u64;
        // SAFETY: reading CR3 has no side effects.
        unsafe { asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack)) };
        PhysAddr::new(cr3 & CR3_ADDR_MASK)
    }

    unsafe fn load_root(&mut self, root: PhysAddr) {
        // Запись CR3 сбрасывает не-global TLB / Writing CR3 flushes non-global TLB
        // SAFETY: the caller guarantees `root` maps all live code and data.
        unsafe { asm!("mov cr3, {}", in(reg) root.as_u64(), options(nostack)) };
        flush_global_tlb();
    }
}

/// Заглушки shadow помечены GLOBAL, поэтому переключаем CR4.PGE.
/// Shadow placeholders are GLOBAL, so toggle CR4.PGE to drop them too.
fn flush_global_tlb() {
    const CR4_PGE: u64 = 1 << 7;
    let cr4: u64;
    // SAFETY: toggling PGE off and back on only flushes the TLB.
    unsafe {
        asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack));
        if cr4 & CR4_PGE != 0 {
            asm!("mov cr4, {}", in(reg) cr4 & !CR4_PGE, options(nostack));
            asm!("mov cr4, {}", in(reg) cr4, options(nostack));
        }
    }
}

impl VmReserve for BootPlatform {
    fn reserve(&mut self, base: VirtAddr, size: u64) {
        if !vmm::reserve_early(base, size, "kasan shadow") {
            log::warn!("[vmm] shadow window not recorded");
        }
    }
}

impl FaultBus for BootPlatform {
    fn subscribe(&mut self, handler: FaultHandler) {
        if !crate::fault::register(handler) {
            log::warn!("[fault] chain full, subscriber dropped");
        }
    }
}
