//! kshadow — shadow memory bring-up for inline KASAN checks (x86_64)
//!
//! Строит shadow-память: на каждые 8 байт реальной памяти — 1 байт shadow.
//! Builds shadow memory: one shadow byte per 8 bytes of real memory.
//!
//! Аппаратная часть (CR3, IDT, аллокатор кадров) приходит через трейты `hal`.
//! Hardware pieces (CR3, IDT, frame allocator) come in through the `hal` traits.
//!
//! Использование / Usage:
//!   let placeholders = Placeholders::new(&mut platform)?;
//!   kasan::map_early_shadow(&platform, root, &placeholders);
//!   ...
//!   kasan::init_shadow_memory(&mut platform, &placeholders, boot, &DEPTH, &STATE);

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

use core::fmt;

pub mod hal;
pub mod kasan;
pub mod mm;

#[cfg(test)]
mod mock;

pub use kasan::{
    init_shadow_memory, mem_to_shadow, BootInfo, InstrumentationDepth, Placeholders, ShadowBoot,
    ShadowLayout, ShadowState, ShadowStats,
};
pub use mm::{PhysAddr, PhysRange, VirtAddr};

use mm::paging::Level;

/// Ошибки построения shadow / Shadow construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowError {
    /// Аллокатор не дал страницу / The boot allocator returned no page.
    BackingExhausted { level: Level, addr: VirtAddr },
    /// Окно с реальной памятью пересеклось с общими заглушками.
    /// A real-backed window ran into shared placeholders.
    SharedOverlap { level: Level, addr: VirtAddr },
    /// Временная запись ранней стадии не была очищена.
    /// An early-stage provisional entry was never cleared.
    StaleProvisional { level: Level, addr: VirtAddr },
}

impl fmt::Display for ShadowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackingExhausted { level, addr } => {
                write!(f, "no backing page for {:?} entry at {:#x}", level, addr.as_u64())
            }
            Self::SharedOverlap { level, addr } => {
                write!(f, "real shadow overlaps shared {:?} entry at {:#x}", level, addr.as_u64())
            }
            Self::StaleProvisional { level, addr } => {
                write!(f, "provisional {:?} entry still installed at {:#x}", level, addr.as_u64())
            }
        }
    }
}

pub type Result<T> = core::result::Result<T, ShadowError>;
