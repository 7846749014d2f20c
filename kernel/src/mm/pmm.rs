//! Physical Memory Manager — bump allocator ранней загрузки
//!
//! Берёт самый большой свободный диапазон из карты Limine и раздаёт его
//! страницы по одной, не освобождая. Хватает до появления настоящего
//! аллокатора; shadow живёт вечно.
//! Takes the largest usable extent from the Limine map and hands out its pages
//! one at a time, never freeing. Shadow pages live forever anyway.

use spin::Mutex;

use kshadow::mm::MemoryMap;

use super::{PhysAddr, VirtAddr, PAGE_SIZE};

/// Первый мегабайт не трогаем / Leave the first megabyte alone
const LOW_MEMORY: u64 = 0x10_0000;

struct BumpAllocator {
    next:      u64,
    end:       u64,
    hhdm:      u64,
    allocated: usize,
}

impl BumpAllocator {
    const fn empty() -> Self {
        Self { next: 0, end: 0, hhdm: 0, allocated: 0 }
    }

    fn alloc_zeroed(&mut self) -> Option<PhysAddr> {
        if self.next + PAGE_SIZE > self.end {
            return None;
        }
        let frame = self.next;
        self.next += PAGE_SIZE;
        self.allocated += 1;

        let virt = VirtAddr::new(self.hhdm + frame);
        // SAFETY: the frame is usable RAM mapped by the HHDM and now ours.
        unsafe { core::ptr::write_bytes(virt.as_mut_ptr::<u8>(), 0, PAGE_SIZE as usize) };
        Some(PhysAddr::new(frame))
    }
}

static PMM: Mutex<BumpAllocator> = Mutex::new(BumpAllocator::empty());

/// Выбрать диапазон для раздачи / Pick the extent to hand out
///
/// `usable` — только USABLE-записи: склеенная RAM может захватить образ ядра.
/// `usable` must hold USABLE entries alone; merged RAM can span the kernel image.
pub fn init<const N: usize>(usable: &MemoryMap<N>, hhdm: VirtAddr) {
    let best = usable.largest_above(LOW_MEMORY);

    let mut pmm = PMM.lock();
    pmm.hhdm = hhdm.as_u64();
    match best {
        Some(range) => {
            pmm.next = range.start.as_u64();
            pmm.end = range.end.as_u64();
            log::info!(
                "[pmm] bump over [{:#x}, {:#x}), {} MiB",
                pmm.next,
                pmm.end,
                range.len() >> 20
            );
        }
        None => log::error!("[pmm] no usable memory above 1 MiB"),
    }
}

/// Выделить обнулённую страницу / Allocate a zeroed page
pub fn alloc_zeroed() -> Option<PhysAddr> {
    PMM.lock().alloc_zeroed()
}

/// Страниц выдано / Pages handed out
pub fn allocated() -> usize {
    PMM.lock().allocated
}
