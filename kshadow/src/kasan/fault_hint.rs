//! Подсказка при GPF / Hint on general protection faults
//!
//! С inline-инструментацией обращение к shadow по неканоническому адресу
//! (NULL или user-указатель, сдвинутый на SHADOW_OFFSET) даёт GPF, а не
//! отчёт KASAN. Подписчик только подсказывает, ничего не подавляет.
//! With inline instrumentation a shadow access for a NULL or user pointer
//! lands on a non-canonical address and raises a GPF instead of a KASAN
//! report. The subscriber only hints; it never suppresses anything.

use crate::hal::{FaultEvent, FaultKind, NotifyAction};
use crate::kasan::layout::{is_shadow, shadow_to_mem};

pub fn shadow_fault_hint(event: &FaultEvent) -> NotifyAction {
    if event.kind == FaultKind::GeneralProtection {
        log::error!("kasan: inline instrumentation enabled");
        log::error!("kasan: GPF could be caused by NULL-ptr deref or user memory access");
    }
    if let Some(addr) = event.addr.filter(|addr| is_shadow(*addr)) {
        log::error!(
            "kasan: fault on shadow {:#x} (covers {:#x})",
            addr.as_u64(),
            shadow_to_mem(addr).as_u64()
        );
    }
    NotifyAction::Continue
}
