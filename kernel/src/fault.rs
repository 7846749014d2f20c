//! Цепочка уведомлений об исключениях (die chain)
//! Fault notifier chain
//!
//! Обработчики #GP/#PF сначала опрашивают подписчиков, потом паникуют.
//! The #GP/#PF handlers poll subscribers first, then panic.

use kshadow::hal::{FaultEvent, FaultHandler, NotifyAction};
use spin::Mutex;

const MAX_HANDLERS: usize = 8;

static CHAIN: Mutex<[Option<FaultHandler>; MAX_HANDLERS]> = Mutex::new([None; MAX_HANDLERS]);

/// Подписаться; `false` — мест нет.
/// Subscribe; `false` when the chain is full.
pub fn register(handler: FaultHandler) -> bool {
    let mut chain = CHAIN.lock();
    match chain.iter_mut().find(|slot| slot.is_none()) {
        Some(slot) => {
            *slot = Some(handler);
            true
        }
        None => false,
    }
}

/// Опросить подписчиков по порядку, пока кто-то не скажет `Stop`.
/// Poll subscribers in order until one answers `Stop`.
pub fn notify(event: &FaultEvent) -> NotifyAction {
    // Исключение могло случиться под блокировкой / The fault may hit under the lock
    let Some(chain) = CHAIN.try_lock() else {
        return NotifyAction::Continue;
    };
    for handler in chain.iter().flatten() {
        if handler(event) == NotifyAction::Stop {
            return NotifyAction::Stop;
        }
    }
    NotifyAction::Continue
}
