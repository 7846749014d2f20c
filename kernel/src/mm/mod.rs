//! Memory Management subsystem
//!
//! Два уровня ранней загрузки / Two early-boot layers:
//!   pmm — bump-аллокатор кадров / bump frame allocator
//!   vmm — ранние резервы виртуальных адресов / early VA reservations

pub mod pmm;
pub mod vmm;

pub use kshadow::mm::{PhysAddr, PhysRange, VirtAddr, PAGE_SIZE};
