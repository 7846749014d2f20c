//! Запросы к Limine / Limine requests
//!
//! Карта памяти превращается в два списка с sentinel в конце: вся RAM из
//! прямого отображения (HHDM) для shadow и только USABLE для аллокатора.
//! The memory map becomes two sentinel-terminated lists: every RAM extent in
//! the direct map (HHDM) for shadow, and USABLE entries alone for the allocator.

use limine::memory_map::EntryType;
use limine::request::{HhdmRequest, MemoryMapRequest, RequestsEndMarker, RequestsStartMarker};
use limine::BaseRevision;

use kshadow::mm::MemoryMap;

use crate::mm::{PhysRange, VirtAddr, PAGE_SIZE};

#[used]
#[link_section = ".requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[link_section = ".requests"]
static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

#[used]
#[link_section = ".requests"]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[link_section = ".requests_start_marker"]
static _START_MARKER: RequestsStartMarker = RequestsStartMarker::new();

#[used]
#[link_section = ".requests_end_marker"]
static _END_MARKER: RequestsEndMarker = RequestsEndMarker::new();

/// Максимум диапазонов (как E820_MAX_ENTRIES) / Extent limit
pub const MAX_EXTENTS: usize = 128;

/// Карта на `MAX_EXTENTS` диапазонов плюс sentinel / Map of `MAX_EXTENTS` plus the sentinel
pub type BootMemoryMap = MemoryMap<{ MAX_EXTENTS + 1 }>;

/// Что нужно для запуска shadow / What shadow bring-up needs
pub struct BootParams {
    pub hhdm:   VirtAddr,
    /// Вся RAM в HHDM, смежные склеены / All HHDM RAM, adjacent extents merged
    pub ram:    BootMemoryMap,
    /// Только USABLE, без склейки / USABLE entries only, never merged
    pub usable: BootMemoryMap,
}

/// RAM, которую ядро отображает напрямую / RAM the kernel maps directly
fn is_ram(kind: EntryType) -> bool {
    kind == EntryType::USABLE
        || kind == EntryType::BOOTLOADER_RECLAIMABLE
        || kind == EntryType::EXECUTABLE_AND_MODULES
        || kind == EntryType::ACPI_RECLAIMABLE
}

fn overflow(range: PhysRange) -> ! {
    panic!(
        "limine: memory map has more than {} extents (dropped [{:#x}, {:#x}))",
        MAX_EXTENTS,
        range.start.as_u64(),
        range.end.as_u64()
    );
}

/// Собрать ответы Limine; без них загрузка невозможна.
/// Collect the Limine responses; boot cannot go on without them.
pub fn collect() -> BootParams {
    if !BASE_REVISION.is_supported() {
        panic!("limine: base revision not supported");
    }
    let Some(hhdm) = HHDM_REQUEST.get_response() else {
        panic!("limine: no HHDM response");
    };
    let Some(memory_map) = MEMORY_MAP_REQUEST.get_response() else {
        panic!("limine: no memory map response");
    };

    let mut params = BootParams {
        hhdm:   VirtAddr::new(hhdm.offset()),
        ram:    BootMemoryMap::new(),
        usable: BootMemoryMap::new(),
    };
    // Limine отдаёт записи по возрастанию адреса / Limine sorts entries by base
    for entry in memory_map.entries().iter().filter(|entry| is_ram(entry.entry_type)) {
        let base = entry.base;
        let top = entry.base + entry.length;

        // Shadow покрывает страницы целиком: округляем наружу
        // Shadow covers whole pages: round outward
        let outer = PhysRange::new(base & !(PAGE_SIZE - 1), (top + PAGE_SIZE - 1) & !(PAGE_SIZE - 1));
        log::debug!("[boot] ram [{:#x}, {:#x})", outer.start.as_u64(), outer.end.as_u64());
        params.ram.push(outer).unwrap_or_else(|range| overflow(range));

        // Аллокатору — только целые свободные страницы: округляем внутрь
        // The allocator gets whole free pages only: round inward
        if entry.entry_type == EntryType::USABLE {
            let inner = PhysRange::new((base + PAGE_SIZE - 1) & !(PAGE_SIZE - 1), top & !(PAGE_SIZE - 1));
            params.usable.push_exact(inner).unwrap_or_else(|range| overflow(range));
        }
    }
    params
}
