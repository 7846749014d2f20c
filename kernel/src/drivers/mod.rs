//! Kernel-space drivers
//!
//! Только отладочный вывод / Debug output only:
//!   - UART/Serial — вывод в терминал QEMU, за ним `kprint!` и `log`

pub mod uart;

/// Макрос для отладочного вывода.
/// Debug print macro.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::drivers::uart::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kprintln {
    ()           => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}
