//! Memory primitives
//!
//! Два модуля / Two modules:
//!   (здесь) — адреса и диапазоны / addresses and ranges
//!   paging  — 4-уровневые таблицы x86_64 / x86_64 4-level tables

pub mod paging;

pub const PAGE_SIZE: u64 = 4096;

/// Физический адрес / Physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// Виртуальный адрес / Virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

impl PhysAddr {
    pub const fn new(addr: u64) -> Self { Self(addr) }
    pub const fn as_u64(self) -> u64   { self.0 }
}

impl VirtAddr {
    pub const fn new(addr: u64) -> Self { Self(addr) }
    pub const fn as_u64(self) -> u64   { self.0 }

    pub const fn as_mut_ptr<T>(self) -> *mut T { self.0 as *mut T }

    /// Round down to `align` (power of two).
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }

    /// Round up to `align`, saturating at the top of the address space.
    pub const fn align_up(self, align: u64) -> Self {
        match self.0.checked_add(align - 1) {
            Some(v) => Self(v & !(align - 1)),
            None    => Self(u64::MAX & !(align - 1)),
        }
    }

    pub const fn checked_add(self, bytes: u64) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(v) => Some(Self(v)),
            None    => None,
        }
    }
}

/// Физический диапазон [start, end) из карты памяти платформы.
/// Physical extent [start, end) reported by the platform memory map.
///
/// `end == 0` is the sentinel that terminates a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysRange {
    pub start: PhysAddr,
    pub end:   PhysAddr,
}

impl PhysRange {
    pub const SENTINEL: Self = Self { start: PhysAddr(0), end: PhysAddr(0) };

    pub const fn new(start: u64, end: u64) -> Self {
        Self { start: PhysAddr(start), end: PhysAddr(end) }
    }

    pub const fn is_sentinel(&self) -> bool { self.end.0 == 0 }

    pub const fn len(&self) -> u64 { self.end.0 - self.start.0 }

    pub const fn is_empty(&self) -> bool { self.end.0 <= self.start.0 }
}

// ── Карта памяти / Memory map ────────────────────────────────────────────────

/// Список физических диапазонов фиксированной ёмкости с завершающим sentinel.
/// Fixed-capacity extent list that always keeps a terminating sentinel.
///
/// Последний слот занят sentinel, поэтому данных не больше `N - 1`.
/// The last slot holds the sentinel, so at most `N - 1` extents fit.
pub struct MemoryMap<const N: usize> {
    ranges: [PhysRange; N],
    count:  usize,
}

impl<const N: usize> MemoryMap<N> {
    pub const fn new() -> Self {
        Self { ranges: [PhysRange::SENTINEL; N], count: 0 }
    }

    pub fn extents(&self) -> &[PhysRange] { &self.ranges[..self.count] }

    /// Диапазоны вместе с sentinel / Extents followed by the sentinel
    pub fn with_sentinel(&self) -> &[PhysRange] { &self.ranges[..=self.count] }

    /// Добавить диапазон, склеив его с предыдущим, если они смежны.
    /// Append an extent, merging it into the previous one when adjacent.
    ///
    /// `Err(range)` — места нет; sentinel остаётся на месте.
    /// `Err(range)` when full; the sentinel stays in place.
    pub fn push(&mut self, range: PhysRange) -> core::result::Result<(), PhysRange> {
        if range.is_empty() {
            return Ok(());
        }
        if let Some(last) = self.ranges[..self.count].last_mut() {
            if last.end == range.start {
                last.end = range.end;
                return Ok(());
            }
        }
        self.push_exact(range)
    }

    /// Добавить диапазон без склейки / Append an extent without merging
    pub fn push_exact(&mut self, range: PhysRange) -> core::result::Result<(), PhysRange> {
        if range.is_empty() {
            return Ok(());
        }
        if self.count + 1 >= N {
            return Err(range);
        }
        self.ranges[self.count] = range;
        self.count += 1;
        Ok(())
    }

    /// Самый длинный диапазон после обрезки снизу по `floor`.
    /// The longest extent once every start is clamped up to `floor`.
    pub fn largest_above(&self, floor: u64) -> Option<PhysRange> {
        self.extents()
            .iter()
            .map(|r| PhysRange::new(r.start.0.max(floor), r.end.0))
            .filter(|r| !r.is_empty())
            .max_by_key(|r| r.len())
    }
}

impl<const N: usize> Default for MemoryMap<N> {
    fn default() -> Self { Self::new() }
}
