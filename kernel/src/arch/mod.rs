//! HAL — Hardware Abstraction Layer
//!
//! Shadow-раскладка задана только для x86_64.
//! The shadow layout is only defined for x86_64.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64 as current;

#[cfg(not(target_arch = "x86_64"))]
compile_error!("kshadow-kernel only supports x86_64");

/// Инициализация платформы — вызывается первой из kernel_main.
/// Platform initialization — called first from kernel_main.
pub fn init() {
    current::init();
}
