//! Общие заглушки shadow / Shared shadow placeholders
//!
//! Цепочка: PUD → PMD → PTE → страница, все 512 записей каждой таблицы
//! указывают на одну и ту же таблицу уровнем ниже, всё только для чтения.
//! Chain: PUD → PMD → PTE → page; every entry of each table points at the one
//! table below, all read-only. 16 TiB of "don't care" shadow costs 4 frames.
//!
//!   zero  — нули, итоговое состояние / zeros, the final state
//!   early — яд ранней стадии загрузки / poison of the earliest boot stage

use crate::hal::{FrameAllocator, PhysMap};
use crate::mm::paging::{fill_frame, Entry, Level, PageFlags, RawEntry, Table};
use crate::mm::{PhysAddr, VirtAddr};
use crate::{Result, ShadowError};

/// Байт, которым заполнена ранняя страница / Fill byte of the early page
pub const EARLY_SHADOW_POISON: u8 = 0xF9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderChain {
    page: PhysAddr,
    pte:  PhysAddr,
    pmd:  PhysAddr,
    pud:  PhysAddr,
}

impl PlaceholderChain {
    /// Собрать цепочку из четырёх свежих кадров.
    /// Build the chain out of four fresh frames.
    pub fn build<P: FrameAllocator + PhysMap>(platform: &mut P, fill: u8) -> Result<Self> {
        let mut frame = |level| {
            platform
                .alloc_zeroed_page()
                .ok_or(ShadowError::BackingExhausted { level, addr: VirtAddr::new(0) })
        };
        let page = frame(Level::Leaf)?;
        let pte  = frame(Level::Middle)?;
        let pmd  = frame(Level::Upper)?;
        let pud  = frame(Level::Top)?;

        if fill != 0 {
            // SAFETY: the frame was just handed to us by the allocator.
            unsafe { fill_frame(&*platform, page, fill) };
        }
        // SAFETY: fresh table frames, owned by the chain from now on.
        let link = |table: PhysAddr, target: PhysAddr| unsafe {
            Table::from_frame(table).fill(&*platform, RawEntry::new(target, PageFlags::KERNEL_RO));
        };
        link(pte, page);
        link(pmd, pte);
        link(pud, pmd);

        Ok(Self { page, pte, pmd, pud })
    }

    /// Кадр, на который указывает запись уровня `level`.
    /// Frame an entry at `level` points to.
    pub const fn target(&self, level: Level) -> PhysAddr {
        match level {
            Level::Top    => self.pud,
            Level::Upper  => self.pmd,
            Level::Middle => self.pte,
            Level::Leaf   => self.page,
        }
    }

    pub const fn page(&self) -> PhysAddr { self.page }
}

/// Оба набора заглушек / Both placeholder sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholders {
    pub zero:  PlaceholderChain,
    pub early: PlaceholderChain,
}

impl Placeholders {
    pub fn new<P: FrameAllocator + PhysMap>(platform: &mut P) -> Result<Self> {
        let zero  = PlaceholderChain::build(platform, 0)?;
        let early = PlaceholderChain::build(platform, EARLY_SHADOW_POISON)?;
        log::debug!(
            "kasan: placeholders zero_pud={:#x} early_pud={:#x}",
            zero.pud.as_u64(),
            early.pud.as_u64()
        );
        Ok(Self { zero, early })
    }

    /// Аппаратная запись → смысл / Hardware entry → meaning
    pub fn decode(&self, raw: RawEntry, level: Level) -> Entry {
        if !raw.is_present() {
            return Entry::Unmapped;
        }
        let frame = raw.frame();
        if frame == self.zero.target(level) {
            if level.is_leaf() { Entry::SharedZero } else { Entry::SharedSubtable }
        } else if frame == self.early.target(level) {
            Entry::Provisional
        } else {
            Entry::RealBacked(frame)
        }
    }

    /// Смысл → аппаратная запись / Meaning → hardware entry
    pub fn encode(&self, entry: Entry, level: Level) -> RawEntry {
        match entry {
            Entry::Unmapped => RawEntry::EMPTY,
            Entry::SharedZero | Entry::SharedSubtable => {
                RawEntry::new(self.zero.target(level), PageFlags::KERNEL_RO)
            }
            Entry::Provisional => RawEntry::new(self.early.target(level), PageFlags::KERNEL_RO),
            Entry::RealBacked(frame) if level.is_leaf() => RawEntry::new(frame, PageFlags::KERNEL_RW),
            Entry::RealBacked(frame) => RawEntry::new(frame, PageFlags::KERNEL_TABLE),
        }
    }

    /// Обезвредить ранний яд: страница начинает читаться как нули.
    /// Neutralise the early poison so the page reads as zeros.
    pub fn clear_early_poison(&self, map: &impl PhysMap) {
        // SAFETY: the early page belongs to the chain; nothing else writes it.
        unsafe { fill_frame(map, self.early.page, 0) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::paging::ENTRIES_PER_TABLE;
    use crate::mock::MockMachine;

    #[test]
    fn test_chain_links_read_only() {
        let mut m = MockMachine::new();
        let p = Placeholders::new(&mut m).unwrap();
        assert_eq!(m.allocations(), 8);

        for (table, target) in [
            (p.zero.pud, p.zero.pmd),
            (p.zero.pmd, p.zero.pte),
            (p.zero.pte, p.zero.page),
        ] {
            let t = unsafe { Table::from_frame(table) };
            for i in 0..ENTRIES_PER_TABLE {
                let e = t.read(&m, i);
                assert_eq!(e.frame(), target);
                assert!(e.is_present());
                assert!(!e.is_writable());
            }
        }
        assert!(m.frame_bytes(p.zero.page).iter().all(|&b| b == 0));
        assert!(m.frame_bytes(p.early.page).iter().all(|&b| b == EARLY_SHADOW_POISON));
    }

    #[test]
    fn test_decode_encode() {
        let mut m = MockMachine::new();
        let p = Placeholders::new(&mut m).unwrap();

        assert_eq!(p.decode(RawEntry::EMPTY, Level::Top), Entry::Unmapped);
        assert_eq!(p.decode(p.encode(Entry::SharedSubtable, Level::Upper), Level::Upper), Entry::SharedSubtable);
        assert_eq!(p.decode(p.encode(Entry::SharedZero, Level::Leaf), Level::Leaf), Entry::SharedZero);
        assert_eq!(p.decode(p.encode(Entry::Provisional, Level::Top), Level::Top), Entry::Provisional);

        let frame = PhysAddr::new(0x7000_0000);
        let leaf = p.encode(Entry::RealBacked(frame), Level::Leaf);
        assert!(leaf.is_writable());
        assert!(leaf.flags().contains(PageFlags::NO_EXEC));
        assert_eq!(p.decode(leaf, Level::Leaf), Entry::RealBacked(frame));
        let table = p.encode(Entry::RealBacked(frame), Level::Middle);
        assert!(table.is_writable());
        assert!(!table.flags().contains(PageFlags::NO_EXEC));
    }

    #[test]
    fn test_clear_early_poison() {
        let mut m = MockMachine::new();
        let p = Placeholders::new(&mut m).unwrap();
        p.clear_early_poison(&m);
        assert!(m.frame_bytes(p.early.page).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_build_out_of_memory() {
        let mut m = MockMachine::new();
        m.fail_after(2);
        let err = PlaceholderChain::build(&mut m, 0).unwrap_err();
        assert!(matches!(err, ShadowError::BackingExhausted { level: Level::Upper, .. }));
    }
}
