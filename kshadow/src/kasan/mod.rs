//! KASAN shadow memory
//!
//! Модули / Modules:
//!   layout      — трансляция адресов и раскладка / address translation, layout
//!   placeholder — общие нулевые и ранние таблицы / shared zero and early tables
//!   populate    — заполнение таблиц / table population
//!   mapper      — shadow для реальной памяти / shadow for real memory
//!   clear       — временные записи ранней стадии / early provisional entries
//!   init        — последовательность запуска / bring-up sequence
//!   fault_hint  — подсказка при GPF / GPF hint
//!   walk        — обход и статистика / walk and statistics

pub mod clear;
pub mod fault_hint;
pub mod init;
pub mod layout;
pub mod mapper;
pub mod placeholder;
pub mod populate;
pub mod walk;


pub use clear::{clear_window, map_early_shadow};
pub use init::{init_shadow_memory, BootInfo, InstrumentationDepth, ShadowBoot, ShadowState};
pub use layout::{mem_to_shadow, ShadowLayout};
pub use placeholder::Placeholders;
pub use populate::{Policy, Populator, ShadowWindow};
pub use walk::{translate, ShadowStats};
