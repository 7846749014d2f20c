//! Программный обход таблиц / Software table walk
//!
//! Для диагностики и проверок: куда отображён shadow-адрес и сколько памяти
//! ушло на shadow.
//! Diagnostics and checks: where a shadow address lands and how much memory
//! the shadow costs.

use crate::hal::PhysMap;
use crate::kasan::layout::{SHADOW_END, SHADOW_START};
use crate::kasan::placeholder::Placeholders;
use crate::mm::paging::{Entry, Level, Table, ENTRIES_PER_TABLE};
use crate::mm::{PhysAddr, VirtAddr, PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    /// Физический адрес байта / Physical address of the byte
    pub phys:     PhysAddr,
    /// Разрешена ли запись на всех уровнях / Writable at every level
    pub writable: bool,
}

/// Пройти 4 уровня для `addr`; `None` — где-то запись отсутствует.
/// Walk four levels for `addr`; `None` if any level is not present.
pub fn translate(map: &impl PhysMap, root: Table, addr: VirtAddr) -> Option<Translation> {
    let mut table = root;
    let mut writable = true;
    for level in Level::ALL {
        let raw = table.read(map, level.index(addr));
        if !raw.is_present() {
            return None;
        }
        writable &= raw.is_writable();
        if level.is_leaf() {
            let phys = PhysAddr::new(raw.frame().as_u64() + (addr.as_u64() & (PAGE_SIZE - 1)));
            return Some(Translation { phys, writable });
        }
        // SAFETY: a present non-leaf entry links a table frame.
        table = unsafe { Table::from_frame(raw.frame()) };
    }
    None
}

/// Сколько стоит shadow / What the shadow costs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowStats {
    /// Собственные страницы shadow (leaf RealBacked)
    pub real_pages:          usize,
    /// Собственные таблицы PUD/PMD/PTE
    pub private_tables:      usize,
    /// Записи, указывающие на общие нулевые заглушки
    pub shared_entries:      usize,
    /// Записи, всё ещё указывающие на раннюю цепочку
    pub provisional_entries: usize,
}

impl ShadowStats {
    /// Байт памяти под shadow / Bytes of memory spent on shadow
    pub fn footprint(&self) -> u64 {
        (self.real_pages + self.private_tables) as u64 * PAGE_SIZE
    }
}

/// Посчитать записи в окне shadow корня `root`.
/// Count entries over the shadow region of `root`.
pub fn shadow_stats(map: &impl PhysMap, placeholders: &Placeholders, root: Table) -> ShadowStats {
    let mut stats = ShadowStats::default();
    let first = Level::Top.index(VirtAddr::new(SHADOW_START));
    let last = Level::Top.index(VirtAddr::new(SHADOW_END));
    for index in first..last {
        visit(map, placeholders, root, index, Level::Top, &mut stats);
    }
    stats
}

fn visit(
    map: &impl PhysMap,
    placeholders: &Placeholders,
    table: Table,
    index: usize,
    level: Level,
    stats: &mut ShadowStats,
) {
    match placeholders.decode(table.read(map, index), level) {
        Entry::Unmapped => {}
        Entry::SharedZero | Entry::SharedSubtable => stats.shared_entries += 1,
        Entry::Provisional => stats.provisional_entries += 1,
        Entry::RealBacked(_) if level.is_leaf() => stats.real_pages += 1,
        Entry::RealBacked(frame) => {
            stats.private_tables += 1;
            if let Some(child) = level.child() {
                // SAFETY: a real-backed non-leaf entry links a private table.
                let next = unsafe { Table::from_frame(frame) };
                for i in 0..ENTRIES_PER_TABLE {
                    visit(map, placeholders, next, i, child, stats);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kasan::clear::map_early_shadow;
    use crate::kasan::populate::{Policy, Populator, ShadowWindow};
    use crate::mock::MockMachine;

    #[test]
    fn test_translate_offset_and_writability() {
        let mut m = MockMachine::new();
        let p = Placeholders::new(&mut m).unwrap();
        let root = m.root_table();
        let base = 0xffff_ed00_0000_0000;

        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(ShadowWindow::new(VirtAddr::new(base), VirtAddr::new(base + PAGE_SIZE)), Policy::RealBacking)
            .unwrap();

        let t = translate(&m, root, VirtAddr::new(base + 0x123)).unwrap();
        assert_eq!(t.phys.as_u64() & 0xfff, 0x123);
        assert!(t.writable);
        assert!(translate(&m, root, VirtAddr::new(base - PAGE_SIZE)).is_none());
    }

    #[test]
    fn test_stats_count_each_kind() {
        let mut m = MockMachine::new();
        let p = Placeholders::new(&mut m).unwrap();
        let root = m.root_table();
        map_early_shadow(&m, root, &p);
        assert_eq!(shadow_stats(&m, &p, root).provisional_entries, 32);

        // Одна запись верхнего уровня → собственная / One top entry made private
        let base = 0xffff_ed00_0000_0000;
        root.write(&m, Level::Top.index(VirtAddr::new(base)), crate::mm::paging::RawEntry::EMPTY);
        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(ShadowWindow::new(VirtAddr::new(base), VirtAddr::new(base + 2 * PAGE_SIZE)), Policy::RealBacking)
            .unwrap();
        pop.populate(
            ShadowWindow::new(VirtAddr::new(base), VirtAddr::new(base + Level::Middle.span())),
            Policy::SharedZero,
        )
        .unwrap();

        let stats = shadow_stats(&m, &p, root);
        assert_eq!(stats.provisional_entries, 31);
        assert_eq!(stats.real_pages, 2);
        assert_eq!(stats.private_tables, 3);
        assert_eq!(stats.shared_entries, 510);
        assert_eq!(stats.footprint(), 5 * PAGE_SIZE);
    }
}
