//! x86_64 Page Tables (4-level paging)
//!
//! Структура: PML4 → PDPT → PD → PT → физический адрес
//! Structure:  PML4 → PDPT → PD → PT → physical address
//!
//! Здесь только аппаратный формат записи. Смысловое представление — `Entry`,
//! перевод между ними делает `kasan::placeholder::Placeholders`.
//! Only the hardware entry format lives here. The semantic view is `Entry`;
//! `kasan::placeholder::Placeholders` translates between the two.

use bitflags::bitflags;

use super::{PhysAddr, VirtAddr, PAGE_SIZE};
use crate::hal::PhysMap;

pub const ENTRIES_PER_TABLE: usize = 512;

/// Биты 12–51 записи / Entry bits 12–51
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

bitflags! {
    /// Флаги страницы / Page flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT   = 1 << 0;
        const WRITABLE  = 1 << 1;
        const USER      = 1 << 2;
        const ACCESSED  = 1 << 5;
        const DIRTY     = 1 << 6;
        const GLOBAL    = 1 << 8;
        const NO_EXEC   = 1 << 63;
    }
}

impl PageFlags {
    /// Запись на собственную таблицу следующего уровня / Private next-level table
    pub const KERNEL_TABLE: Self = Self::PRESENT
        .union(Self::WRITABLE)
        .union(Self::ACCESSED)
        .union(Self::DIRTY);

    /// Только чтение — общие заглушки / Read-only, for shared placeholders
    pub const KERNEL_RO: Self = Self::PRESENT
        .union(Self::ACCESSED)
        .union(Self::GLOBAL)
        .union(Self::NO_EXEC);

    /// Собственная страница shadow / Exclusively owned shadow page
    pub const KERNEL_RW: Self = Self::KERNEL_RO
        .union(Self::WRITABLE)
        .union(Self::DIRTY);
}

/// Уровень иерархии / Hierarchy level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// PML4
    Top,
    /// PDPT
    Upper,
    /// PD
    Middle,
    /// PT
    Leaf,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Top, Level::Upper, Level::Middle, Level::Leaf];

    pub const fn shift(self) -> u32 {
        match self {
            Level::Top    => 39,
            Level::Upper  => 30,
            Level::Middle => 21,
            Level::Leaf   => 12,
        }
    }

    /// Сколько адресов покрывает одна запись / Bytes covered by one entry
    pub const fn span(self) -> u64 { 1 << self.shift() }

    pub const fn index(self, addr: VirtAddr) -> usize {
        ((addr.as_u64() >> self.shift()) & 0x1FF) as usize
    }

    /// Уровень таблицы, на которую указывает запись / Level the entry points into
    pub const fn child(self) -> Option<Level> {
        match self {
            Level::Top    => Some(Level::Upper),
            Level::Upper  => Some(Level::Middle),
            Level::Middle => Some(Level::Leaf),
            Level::Leaf   => None,
        }
    }

    pub const fn is_leaf(self) -> bool { matches!(self, Level::Leaf) }
}

/// Аппаратная запись таблицы (64 бита) / Hardware table entry (64-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawEntry(u64);

impl RawEntry {
    pub const EMPTY: Self = Self(0);

    pub const fn new(frame: PhysAddr, flags: PageFlags) -> Self {
        Self((frame.as_u64() & ADDR_MASK) | flags.bits())
    }

    pub const fn from_raw(raw: u64) -> Self { Self(raw) }
    pub const fn raw(self) -> u64 { self.0 }

    pub const fn is_present(self) -> bool { self.0 & PageFlags::PRESENT.bits() != 0 }

    pub const fn is_writable(self) -> bool { self.0 & PageFlags::WRITABLE.bits() != 0 }

    pub const fn frame(self) -> PhysAddr { PhysAddr(self.0 & ADDR_MASK) }

    pub const fn flags(self) -> PageFlags { PageFlags::from_bits_truncate(self.0) }
}

/// Смысловое состояние записи / Semantic entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Unmapped,
    /// Leaf → общая нулевая страница / Leaf → shared zero page
    SharedZero,
    /// Non-leaf → общая нулевая таблица уровнем ниже / shared zero table one level down
    SharedSubtable,
    /// Временная запись ранней стадии загрузки / Earliest bring-up stage entry
    Provisional,
    /// Собственная страница или таблица / Exclusively owned page or table
    RealBacked(PhysAddr),
}

/// Таблица страниц, адресуемая по кадру.
/// A page table addressed by its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    frame: PhysAddr,
}

impl Table {
    /// # Safety
    /// `frame` must be a page-aligned, 4 KiB frame holding a translation table
    /// that stays alive for the rest of boot, reachable through the `PhysMap`
    /// passed to the accessors.
    pub const unsafe fn from_frame(frame: PhysAddr) -> Self {
        Self { frame }
    }

    pub const fn frame(&self) -> PhysAddr { self.frame }

    fn slot(&self, map: &impl PhysMap, index: usize) -> *mut u64 {
        debug_assert!(index < ENTRIES_PER_TABLE);
        let base: *mut u64 = map.phys_to_virt(self.frame).as_mut_ptr();
        base.wrapping_add(index)
    }

    pub fn read(&self, map: &impl PhysMap, index: usize) -> RawEntry {
        // SAFETY: from_frame contract; index < 512 keeps us inside the frame.
        RawEntry(unsafe { self.slot(map, index).read_volatile() })
    }

    pub fn write(&self, map: &impl PhysMap, index: usize, entry: RawEntry) {
        // SAFETY: same as `read`.
        unsafe { self.slot(map, index).write_volatile(entry.0) }
    }

    /// Заполнить все 512 записей / Fill all 512 entries
    pub fn fill(&self, map: &impl PhysMap, entry: RawEntry) {
        for i in 0..ENTRIES_PER_TABLE {
            self.write(map, i, entry);
        }
    }

    /// Скопировать все записи из `other` (memcpy PML4).
    /// Copy every entry from `other`.
    pub fn copy_from(&self, map: &impl PhysMap, other: &Table) {
        for i in 0..ENTRIES_PER_TABLE {
            self.write(map, i, other.read(map, i));
        }
    }
}

/// Заполнить кадр байтом / Fill a whole frame with a byte
///
/// # Safety
/// `frame` must be a 4 KiB frame owned by the caller and reachable through `map`.
pub unsafe fn fill_frame(map: &impl PhysMap, frame: PhysAddr, byte: u8) {
    let ptr: *mut u8 = map.phys_to_virt(frame).as_mut_ptr();
    // SAFETY: caller guarantees the frame is ours and PAGE_SIZE long.
    unsafe { core::ptr::write_bytes(ptr, byte, PAGE_SIZE as usize) }
}
