//! Геометрия shadow и трансляция адресов
//! Shadow geometry and address translation
//!
//! ```text
//!  0xffff_8000_0000_0000 ┬ kernel half        ─┐
//!                        │ direct map          │ >> 3
//!                        │ ...                 │ + SHADOW_OFFSET
//!  0xffff_ffff_8000_0000 ┼ kernel image        │
//!  0xffff_ffff_a000_0000 ┼ modules             │
//!  0xffff_ffff_ffff_ffff ┴                    ─┘
//!
//!  0xffff_ec00_0000_0000 ┬ SHADOW_START  (16 TiB)
//!  0xffff_fc00_0000_0000 ┴ SHADOW_END
//! ```

use crate::mm::VirtAddr;

/// log2 коэффициента сжатия: 8 байт → 1 байт shadow
/// log2 of the compression ratio: 8 real bytes → 1 shadow byte
pub const SCALE_SHIFT: u32 = 3;

pub const SHADOW_OFFSET: u64 = 0xdfff_fc00_0000_0000;
pub const SHADOW_START:  u64 = 0xffff_ec00_0000_0000;
pub const SHADOW_END:    u64 = 0xffff_fc00_0000_0000;

/// Размер резервируемого окна shadow / Reserved shadow window size
pub const SHADOW_SIZE: u64 = 16 << 40;

/// Реальный адрес → адрес его shadow-байта.
/// Real address → address of its shadow byte.
///
/// Чистая функция: годится в обработчиках прерываний.
/// Pure; safe to call from interrupt and fault context.
#[inline(always)]
pub const fn mem_to_shadow(addr: VirtAddr) -> VirtAddr {
    VirtAddr::new((addr.as_u64() >> SCALE_SHIFT) + SHADOW_OFFSET)
}

/// Первый реальный байт гранулы, которую описывает shadow-адрес.
/// First real byte of the granule a shadow address describes.
#[inline]
pub const fn shadow_to_mem(shadow: VirtAddr) -> VirtAddr {
    VirtAddr::new(shadow.as_u64().wrapping_sub(SHADOW_OFFSET) << SCALE_SHIFT)
}

pub const fn is_shadow(addr: VirtAddr) -> bool {
    addr.as_u64() >= SHADOW_START && addr.as_u64() < SHADOW_END
}

/// Раскладка виртуального адресного пространства ядра.
/// Kernel virtual address space layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowLayout {
    /// PAGE_OFFSET — начало прямого отображения физической памяти
    pub direct_map_base: VirtAddr,
    /// MAXMEM
    pub direct_map_size: u64,
    /// __START_KERNEL_map
    pub kernel_map_base: VirtAddr,
    /// MODULES_VADDR
    pub modules_base:    VirtAddr,
}

impl ShadowLayout {
    pub const X86_64: Self = Self {
        direct_map_base: VirtAddr::new(0xffff_8800_0000_0000),
        direct_map_size: 1 << 46,
        kernel_map_base: VirtAddr::new(0xffff_ffff_8000_0000),
        modules_base:    VirtAddr::new(0xffff_ffff_a000_0000),
    };

    /// Limine даёт свой HHDM offset / Limine hands us its own HHDM offset
    pub const fn with_direct_map_base(mut self, base: VirtAddr) -> Self {
        self.direct_map_base = base;
        self
    }

    pub const fn direct_map(&self, phys: crate::mm::PhysAddr) -> VirtAddr {
        VirtAddr::new(self.direct_map_base.as_u64() + phys.as_u64())
    }

    pub const fn direct_map_end(&self) -> VirtAddr {
        VirtAddr::new(self.direct_map_base.as_u64().saturating_add(self.direct_map_size))
    }
}

impl Default for ShadowLayout {
    fn default() -> Self { Self::X86_64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_half_fits_shadow() {
        assert_eq!(mem_to_shadow(VirtAddr::new(0xffff_8000_0000_0000)).as_u64(), SHADOW_START);
        assert!(mem_to_shadow(VirtAddr::new(u64::MAX)).as_u64() < SHADOW_END);
        assert_eq!(SHADOW_END - SHADOW_START, SHADOW_SIZE);
    }

    #[test]
    fn test_order_preserving() {
        let mut prev = mem_to_shadow(VirtAddr::new(0xffff_8000_0000_0000));
        let mut addr = 0xffff_8000_0000_0000u64;
        while let Some(next) = addr.checked_add(0x0000_0123_4567_89ab) {
            let shadow = mem_to_shadow(VirtAddr::new(next));
            assert!(prev <= shadow, "{:#x} went backwards", next);
            prev = shadow;
            addr = next;
        }
        // Внутри гранулы — один байт / One shadow byte per granule
        let a = mem_to_shadow(VirtAddr::new(0xffff_8800_0000_1000));
        assert_eq!(mem_to_shadow(VirtAddr::new(0xffff_8800_0000_1007)), a);
        assert_eq!(mem_to_shadow(VirtAddr::new(0xffff_8800_0000_1008)).as_u64(), a.as_u64() + 1);
    }

    #[test]
    fn test_shadow_to_mem_inverse() {
        let addr = VirtAddr::new(0xffff_8800_1234_5678);
        let shadow = mem_to_shadow(addr);
        assert!(is_shadow(shadow));
        assert_eq!(shadow_to_mem(shadow), addr.align_down(8));
    }

    #[test]
    fn test_default_layout() {
        let layout = ShadowLayout::default();
        assert_eq!(layout.direct_map_end().as_u64(), 0xffff_c800_0000_0000);
        let moved = layout.with_direct_map_base(VirtAddr::new(0xffff_8000_0000_0000));
        assert_eq!(moved.direct_map(crate::mm::PhysAddr::new(0x1000)).as_u64(), 0xffff_8000_0000_1000);
        assert_eq!(moved.kernel_map_base, layout.kernel_map_base);
    }
}
