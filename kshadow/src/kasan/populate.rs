//! Заполнение таблиц shadow / Shadow table population
//!
//! Обходит 4 уровня для каждой страницы окна. Пустая запись верхнего уровня
//! получает либо общую нулевую таблицу (если окно целиком накрывает её
//! диапазон и политика SharedZero), либо собственную таблицу.
//! Walks four levels for every page of a window. An empty upper-level entry
//! gets either the shared zero table (policy SharedZero and the window covers
//! the entry's whole span) or a private table of its own.

use crate::hal::{FrameAllocator, PhysMap};
use crate::kasan::placeholder::Placeholders;
use crate::mm::paging::{Entry, Level, Table};
use crate::mm::{PhysAddr, VirtAddr, PAGE_SIZE};
use crate::{Result, ShadowError};

/// Чем заполнять пустые записи / What empty entries get
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Собственные обнулённые страницы, доступные на запись.
    /// Private zeroed pages, writable.
    RealBacking,
    /// Общие заглушки только для чтения / Shared read-only placeholders
    SharedZero,
}

/// Окно в пространстве shadow [start, end).
/// Window [start, end) in shadow space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowWindow {
    pub start: VirtAddr,
    pub end:   VirtAddr,
}

impl ShadowWindow {
    pub const fn new(start: VirtAddr, end: VirtAddr) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool { self.start >= self.end }

    fn page_aligned(self) -> Self {
        Self { start: self.start.align_down(PAGE_SIZE), end: self.end.align_up(PAGE_SIZE) }
    }

    /// Лежит ли весь диапазон записи внутри окна.
    /// Whether the whole span of the `level` entry holding `addr` is inside.
    fn covers_entry(&self, addr: VirtAddr, level: Level) -> bool {
        let base = addr.align_down(level.span());
        base >= self.start && matches!(base.checked_add(level.span()), Some(end) if end <= self.end)
    }
}

/// Следующая запись того же уровня; `None` у вершины адресного пространства.
/// Start of the next entry at `level`; `None` past the top of the address space.
fn next_entry(addr: VirtAddr, level: Level) -> Option<VirtAddr> {
    addr.align_down(level.span()).checked_add(level.span())
}

pub struct Populator<'a, P> {
    platform:     &'a mut P,
    placeholders: &'a Placeholders,
    root:         Table,
    allocated:    usize,
}

impl<'a, P: FrameAllocator + PhysMap> Populator<'a, P> {
    pub fn new(platform: &'a mut P, placeholders: &'a Placeholders, root: Table) -> Self {
        Self { platform, placeholders, root, allocated: 0 }
    }

    pub fn root(&self) -> Table { self.root }

    pub fn platform(&self) -> &P { &*self.platform }

    /// Страниц взято у аллокатора этим заполнителем.
    /// Frames this populator took from the allocator.
    pub fn allocated(&self) -> usize { self.allocated }

    /// Заполнить окно по политике. Ошибка аллокации прерывает обход сразу.
    /// Populate a window under `policy`; an allocation failure aborts at once.
    pub fn populate(&mut self, window: ShadowWindow, policy: Policy) -> Result<()> {
        let window = window.page_aligned();
        log::trace!(
            "kasan: populate [{:#x}, {:#x}) {:?}",
            window.start.as_u64(),
            window.end.as_u64(),
            policy
        );

        let mut addr = window.start;
        'walk: while addr < window.end {
            let mut table = self.root;

            for level in [Level::Top, Level::Upper, Level::Middle] {
                let index = level.index(addr);
                let entry = self.placeholders.decode(table.read(&*self.platform, index), level);

                let next = match entry {
                    Entry::Unmapped if policy == Policy::SharedZero && window.covers_entry(addr, level) => {
                        self.install(table, index, level, Entry::SharedSubtable);
                        None
                    }
                    Entry::Unmapped => {
                        let frame = self.alloc(level, addr)?;
                        self.install(table, index, level, Entry::RealBacked(frame));
                        Some(frame)
                    }
                    Entry::SharedSubtable | Entry::SharedZero => {
                        if policy == Policy::RealBacking {
                            return Err(ShadowError::SharedOverlap { level, addr });
                        }
                        None
                    }
                    Entry::Provisional => return Err(ShadowError::StaleProvisional { level, addr }),
                    Entry::RealBacked(frame) => Some(frame),
                };

                match next {
                    // SAFETY: the frame is a table we allocated or found linked in.
                    Some(frame) => table = unsafe { Table::from_frame(frame) },
                    // Весь диапазон записи уже читается нулями — перепрыгнуть.
                    // The whole entry already reads as zeros; jump over it.
                    None => match next_entry(addr, level) {
                        Some(skip) => {
                            addr = skip;
                            continue 'walk;
                        }
                        None => break 'walk,
                    },
                }
            }

            let index = Level::Leaf.index(addr);
            match self.placeholders.decode(table.read(&*self.platform, index), Level::Leaf) {
                Entry::Unmapped => match policy {
                    Policy::SharedZero => self.install(table, index, Level::Leaf, Entry::SharedZero),
                    Policy::RealBacking => {
                        let page = self.alloc(Level::Leaf, addr)?;
                        self.install(table, index, Level::Leaf, Entry::RealBacked(page));
                    }
                },
                Entry::SharedZero | Entry::SharedSubtable if policy == Policy::RealBacking => {
                    return Err(ShadowError::SharedOverlap { level: Level::Leaf, addr });
                }
                Entry::Provisional => {
                    return Err(ShadowError::StaleProvisional { level: Level::Leaf, addr });
                }
                _ => {}
            }

            addr = match next_entry(addr, Level::Leaf) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(())
    }

    fn alloc(&mut self, level: Level, addr: VirtAddr) -> Result<PhysAddr> {
        let frame = self
            .platform
            .alloc_zeroed_page()
            .ok_or(ShadowError::BackingExhausted { level, addr })?;
        self.allocated += 1;
        Ok(frame)
    }

    fn install(&mut self, table: Table, index: usize, level: Level, entry: Entry) {
        table.write(&*self.platform, index, self.placeholders.encode(entry, level));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kasan::walk::translate;
    use crate::mock::MockMachine;

    const BASE: u64 = 0xffff_ed00_0000_0000;
    const GIB:  u64 = 1 << 30;

    fn window(start: u64, end: u64) -> ShadowWindow {
        ShadowWindow::new(VirtAddr::new(start), VirtAddr::new(end))
    }

    fn setup() -> (MockMachine, Placeholders, Table) {
        let mut m = MockMachine::new();
        let p = Placeholders::new(&mut m).unwrap();
        let root = m.root_table();
        (m, p, root)
    }

    #[test]
    fn test_real_backing_allocates_private_pages() {
        let (mut m, p, root) = setup();
        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(window(BASE, BASE + 4 * PAGE_SIZE), Policy::RealBacking).unwrap();
        // PUD + PMD + PTE + 4 страницы / 3 tables + 4 pages
        assert_eq!(pop.allocated(), 7);

        let mut frames = Vec::new();
        for i in 0..4 {
            let t = translate(&m, root, VirtAddr::new(BASE + i * PAGE_SIZE)).unwrap();
            assert!(t.writable);
            assert_ne!(t.phys, p.zero.page());
            frames.push(t.phys);
        }
        frames.sort();
        frames.dedup();
        assert_eq!(frames.len(), 4);
        assert!(translate(&m, root, VirtAddr::new(BASE + 4 * PAGE_SIZE)).is_none());
    }

    #[test]
    fn test_unaligned_window_covers_partial_pages() {
        let (mut m, p, root) = setup();
        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(window(BASE + 0x200, BASE + PAGE_SIZE + 0x100), Policy::RealBacking).unwrap();
        assert!(translate(&m, root, VirtAddr::new(BASE)).is_some());
        assert!(translate(&m, root, VirtAddr::new(BASE + PAGE_SIZE + 0xff)).is_some());
    }

    #[test]
    fn test_repopulate_is_stable() {
        let (mut m, p, root) = setup();
        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(window(BASE, BASE + 2 * PAGE_SIZE), Policy::RealBacking).unwrap();
        let before = pop.allocated();
        pop.populate(window(BASE, BASE + 2 * PAGE_SIZE), Policy::RealBacking).unwrap();
        pop.populate(window(BASE, BASE + 2 * PAGE_SIZE), Policy::SharedZero).unwrap();
        assert_eq!(pop.allocated(), before);
        assert!(translate(&m, root, VirtAddr::new(BASE)).unwrap().writable);
    }

    #[test]
    fn test_shared_zero_full_top_entries_cost_nothing() {
        let (mut m, p, root) = setup();
        let span = Level::Top.span();
        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(window(BASE, BASE + 4 * span), Policy::SharedZero).unwrap();
        assert_eq!(pop.allocated(), 0);

        for i in 0..4 {
            let addr = VirtAddr::new(BASE + i * span);
            let raw = root.read(&m, Level::Top.index(addr));
            assert_eq!(p.decode(raw, Level::Top), Entry::SharedSubtable);
            let t = translate(&m, root, VirtAddr::new(addr.as_u64() + 0x1234_5678)).unwrap();
            assert_eq!(t.phys.as_u64() & !0xfff, p.zero.page().as_u64());
            assert!(!t.writable);
        }
    }

    #[test]
    fn test_shared_zero_partial_entry_gets_private_table() {
        let (mut m, p, root) = setup();
        // Окно начинается с середины PUD-записи / Window starts mid-PUD entry
        let start = BASE + GIB / 2;
        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(window(start, BASE + 2 * GIB), Policy::SharedZero).unwrap();
        // PUD и PMD собственные, хвост первого GiB — общие PMD записи.
        // Private PUD and PMD tables; the rest is shared.
        assert_eq!(pop.allocated(), 2);

        let top = root.read(&m, Level::Top.index(VirtAddr::new(start)));
        let Entry::RealBacked(pud) = p.decode(top, Level::Top) else { panic!("top not private") };
        let pud = unsafe { Table::from_frame(pud) };
        let first = p.decode(pud.read(&m, 0), Level::Upper);
        let second = p.decode(pud.read(&m, 1), Level::Upper);
        assert!(matches!(first, Entry::RealBacked(_)));
        assert_eq!(second, Entry::SharedSubtable);

        // До окна ничего не отображено / Nothing below the window
        assert!(translate(&m, root, VirtAddr::new(start - PAGE_SIZE)).is_none());
        assert!(translate(&m, root, VirtAddr::new(start)).is_some());
    }

    #[test]
    fn test_real_backing_into_shared_is_rejected() {
        let (mut m, p, root) = setup();
        let span = Level::Top.span();
        let mut pop = Populator::new(&mut m, &p, root);
        pop.populate(window(BASE, BASE + span), Policy::SharedZero).unwrap();
        let err = pop.populate(window(BASE, BASE + PAGE_SIZE), Policy::RealBacking).unwrap_err();
        assert_eq!(err, ShadowError::SharedOverlap { level: Level::Top, addr: VirtAddr::new(BASE) });
    }

    #[test]
    fn test_provisional_entry_is_rejected() {
        let (mut m, p, root) = setup();
        let index = Level::Top.index(VirtAddr::new(BASE));
        root.write(&m, index, p.encode(Entry::Provisional, Level::Top));
        let mut pop = Populator::new(&mut m, &p, root);
        let err = pop.populate(window(BASE, BASE + PAGE_SIZE), Policy::SharedZero).unwrap_err();
        assert!(matches!(err, ShadowError::StaleProvisional { level: Level::Top, .. }));
    }

    #[test]
    fn test_allocation_failure_aborts() {
        let (mut m, p, root) = setup();
        m.fail_after(4);
        let mut pop = Populator::new(&mut m, &p, root);
        let err = pop.populate(window(BASE, BASE + 8 * PAGE_SIZE), Policy::RealBacking).unwrap_err();
        assert_eq!(
            err,
            ShadowError::BackingExhausted { level: Level::Leaf, addr: VirtAddr::new(BASE + PAGE_SIZE) }
        );
        assert_eq!(pop.allocated(), 4);
    }
}
