//! UART Serial driver — COM1 (0x3F8)
//!
//! Весь вывод ядра и `log` идут сюда.
//! All kernel output and `log` records end up here.
//!
//! Запуск / Run:
//!   qemu-system-x86_64 -serial stdio ...

use core::fmt;
use spin::Mutex;

const COM1: u16 = 0x3F8;

/// Line Status Register, бит 5 — THR пуст / bit 5, THR empty
const LSR_THR_EMPTY: u8 = 0x20;

unsafe fn outb(port: u16, val: u8) {
    // SAFETY: the caller owns the port.
    unsafe { core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack)) };
}

unsafe fn inb(port: u16) -> u8 {
    let val: u8;
    // SAFETY: the caller owns the port.
    unsafe { core::arch::asm!("in al, dx", out("al") val, in("dx") port, options(nomem, nostack)) };
    val
}

/// Инициализировать COM1 на 115200 baud.
/// Initialize COM1 at 115200 baud.
pub fn init() {
    // SAFETY: COM1 belongs to this driver.
    unsafe {
        outb(COM1 + 1, 0x00); // Отключить прерывания / Disable interrupts
        outb(COM1 + 3, 0x80); // DLAB
        outb(COM1,     0x01); // Делитель 1 → 115200 baud
        outb(COM1 + 1, 0x00);
        outb(COM1 + 3, 0x03); // 8N1
        outb(COM1 + 2, 0xC7); // FIFO, clear, 14-byte threshold
        outb(COM1 + 4, 0x03); // RTS/DTR, без IRQ / no IRQ
    }
}

fn send_byte(byte: u8) {
    // SAFETY: COM1 belongs to this driver.
    unsafe {
        while inb(COM1 + 5) & LSR_THR_EMPTY == 0 {
            core::hint::spin_loop();
        }
        outb(COM1, byte);
    }
}

struct UartWriter;

impl fmt::Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                send_byte(b'\r');
            }
            send_byte(byte);
        }
        Ok(())
    }
}

static UART_LOCK: Mutex<UartWriter> = Mutex::new(UartWriter);

/// Внутренняя функция для макроса kprint!
/// Internal function for kprint! macro
///
/// Если блокировку держит прерванный код (паника внутри вывода), пишем мимо
/// неё: строки могут перемешаться, но зависания не будет.
/// If interrupted code holds the lock (a panic inside printing), write past
/// it; lines may interleave but the machine never hangs.
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    match UART_LOCK.try_lock() {
        Some(mut writer) => writer.write_fmt(args).ok(),
        None => UartWriter.write_fmt(args).ok(),
    };
}
