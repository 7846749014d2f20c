//! Shadow для реальной памяти / Shadow for real memory
//!
//! Каждый диапазон из карты памяти и образ ядра получают собственные
//! страницы shadow.
//! Every extent of the platform memory map and the kernel image get private
//! shadow pages.

use crate::hal::{FrameAllocator, PhysMap};
use crate::kasan::layout::{mem_to_shadow, ShadowLayout};
use crate::kasan::populate::{Policy, Populator, ShadowWindow};
use crate::mm::{PhysRange, VirtAddr};
use crate::Result;

/// Диапазоны карты памяти до первого пустого (sentinel).
/// Memory map extents up to the first sentinel.
pub fn mapped_ranges(map: &[PhysRange]) -> impl Iterator<Item = &PhysRange> + '_ {
    map.iter().take_while(|range| !range.is_sentinel())
}

/// Окно shadow для [start, end) с запасом в одну гранулу.
/// Shadow window for [start, end), overscanned by one granule.
///
/// Быстрая проверка читает несколько shadow-байт наперёд и изредка может
/// выйти за границу, поэтому отображаем на байт больше.
/// The fast path reads a few shadow bytes ahead and can step just past the
/// boundary, so one extra byte is mapped.
pub fn real_window(start: VirtAddr, end: VirtAddr) -> ShadowWindow {
    let end = mem_to_shadow(end);
    ShadowWindow::new(mem_to_shadow(start), VirtAddr::new(end.as_u64() + 1))
}

/// Отобразить shadow одного физического диапазона.
/// Map the shadow of one physical extent (through the direct map).
pub fn map_range<P: FrameAllocator + PhysMap>(
    populator: &mut Populator<'_, P>,
    layout:    &ShadowLayout,
    range:     &PhysRange,
) -> Result<ShadowWindow> {
    let window = real_window(layout.direct_map(range.start), layout.direct_map(range.end));
    log::debug!(
        "kasan: map [{:#x}, {:#x}) -> shadow [{:#x}, {:#x})",
        range.start.as_u64(),
        range.end.as_u64(),
        window.start.as_u64(),
        window.end.as_u64()
    );
    populator.populate(window, Policy::RealBacking)?;
    Ok(window)
}

/// Отобразить shadow образа ядра [start, end).
/// Map the shadow of the kernel image [start, end).
pub fn map_kernel_image<P: FrameAllocator + PhysMap>(
    populator: &mut Populator<'_, P>,
    start:     VirtAddr,
    end:       VirtAddr,
) -> Result<ShadowWindow> {
    let window = real_window(start, end);
    log::debug!(
        "kasan: map kernel image [{:#x}, {:#x})",
        start.as_u64(),
        end.as_u64()
    );
    populator.populate(window, Policy::RealBacking)?;
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kasan::placeholder::Placeholders;
    use crate::kasan::walk::translate;
    use crate::mm::PAGE_SIZE;
    use crate::mock::MockMachine;

    #[test]
    fn test_mapped_ranges_stop_at_sentinel() {
        let map = [
            PhysRange::new(0, 0x10_0000),
            PhysRange::new(0x20_0000, 0x30_0000),
            PhysRange::SENTINEL,
            PhysRange::new(0x40_0000, 0x50_0000),
        ];
        let ranges: Vec<_> = mapped_ranges(&map).collect();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].end.as_u64(), 0x30_0000);
        assert_eq!(mapped_ranges(&[PhysRange::SENTINEL]).count(), 0);
    }

    #[test]
    fn test_real_window_overscan() {
        let w = real_window(VirtAddr::new(0xffff_8800_0000_0000), VirtAddr::new(0xffff_8800_0010_0000));
        assert_eq!(w.start.as_u64(), 0xffff_ed00_0000_0000);
        assert_eq!(w.end.as_u64(), 0xffff_ed00_0002_0001);
    }

    #[test]
    fn test_map_range_maps_overscan_page() {
        let mut m = MockMachine::new();
        let p = Placeholders::new(&mut m).unwrap();
        let root = m.root_table();
        let layout = ShadowLayout::X86_64;

        let mut pop = Populator::new(&mut m, &p, root);
        let window = map_range(&mut pop, &layout, &PhysRange::new(0, 0x10_0000)).unwrap();
        // 32 страницы + страница запаса + 3 таблицы / 32 pages + overscan page + 3 tables
        assert_eq!(pop.allocated(), 36);

        let last = VirtAddr::new(window.end.as_u64() - 1);
        let t = translate(&m, root, last).unwrap();
        assert!(t.writable);
        assert!(translate(&m, root, VirtAddr::new(last.as_u64() + PAGE_SIZE)).is_none());
    }
}
