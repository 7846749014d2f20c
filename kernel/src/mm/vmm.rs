//! Virtual Memory Manager — ранние резервы адресного пространства
//!
//! До появления vmalloc регионы, занятые навсегда (окно shadow), только
//! записываются в список, чтобы позднейший распределитель их обходил.
//! Before a real VA allocator exists, regions claimed for good (the shadow
//! window) are only recorded so a later allocator steers around them.

use spin::Mutex;

use super::VirtAddr;

const MAX_EARLY_AREAS: usize = 8;

/// Зарезервированный регион / Reserved region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmArea {
    pub start: VirtAddr,
    pub size:  u64,
    pub name:  &'static str,
}

impl VmArea {
    pub fn end(&self) -> u64 { self.start.as_u64().saturating_add(self.size) }

    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr >= self.start && addr.as_u64() < self.end()
    }
}

static EARLY_AREAS: Mutex<[Option<VmArea>; MAX_EARLY_AREAS]> = Mutex::new([None; MAX_EARLY_AREAS]);

/// Записать регион. `false` — список полон или регион пересекается с другим.
/// Record a region; `false` when the list is full or it overlaps another.
pub fn reserve_early(start: VirtAddr, size: u64, name: &'static str) -> bool {
    let area = VmArea { start, size, name };
    let mut areas = EARLY_AREAS.lock();

    if let Some(other) = areas
        .iter()
        .flatten()
        .find(|other| other.start.as_u64() < area.end() && area.start.as_u64() < other.end())
    {
        log::error!(
            "[vmm] {} [{:#x}, {:#x}) overlaps {}",
            name,
            start.as_u64(),
            area.end(),
            other.name
        );
        return false;
    }
    match areas.iter_mut().find(|slot| slot.is_none()) {
        Some(slot) => {
            *slot = Some(area);
            log::debug!("[vmm] reserved {} [{:#x}, {:#x})", name, start.as_u64(), area.end());
            true
        }
        None => {
            log::error!("[vmm] no room for early area {}", name);
            false
        }
    }
}

/// Ранний регион, которому принадлежит адрес / Early area holding `addr`
///
/// Зовётся из обработчика исключений, поэтому не ждёт блокировку.
/// Called from fault handlers, so it never waits on the lock.
pub fn area_of(addr: VirtAddr) -> Option<VmArea> {
    EARLY_AREAS.try_lock()?.iter().flatten().find(|area| area.contains(addr)).copied()
}
