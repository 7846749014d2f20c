//! Временные записи верхнего уровня / Provisional top-level entries
//!
//! Самая ранняя стадия загрузки закрывает всё окно shadow ядовитой цепочкой
//! (`map_early_shadow`), чтобы инструментированный код не падал до того, как
//! появится настоящая shadow. Перед заполнением окна эти записи снимаются
//! (`clear_window`), иначе заполнитель «провалится» в ядовитую цепочку.
//!
//! The earliest boot stage covers the whole shadow region with the poisoned
//! chain so instrumented code never faults before real shadow exists. Before a
//! window is populated those entries are torn down again.

use crate::hal::PhysMap;
use crate::kasan::layout::{SHADOW_END, SHADOW_START};
use crate::kasan::placeholder::Placeholders;
use crate::kasan::populate::ShadowWindow;
use crate::mm::paging::{Entry, Level, RawEntry, Table};
use crate::mm::VirtAddr;

/// Вызвать `f` для каждой записи верхнего уровня, задевающей окно.
/// Call `f` for every top-level entry the window touches.
fn for_each_top_entry(window: ShadowWindow, mut f: impl FnMut(usize)) {
    let span = Level::Top.span();
    let mut addr = window.start.align_down(span);
    while addr < window.end {
        f(Level::Top.index(addr));
        addr = match addr.checked_add(span) {
            Some(next) => next,
            None => break,
        };
    }
}

/// Снять записи верхнего уровня над окном, шаг — один PGDIR.
/// Reset to unmapped every top-level entry over the window, one PGDIR at a time.
pub fn clear_window(map: &impl PhysMap, root: Table, window: ShadowWindow) -> usize {
    let mut cleared = 0;
    for_each_top_entry(window, |index| {
        root.write(map, index, RawEntry::EMPTY);
        cleared += 1;
    });
    log::debug!(
        "kasan: cleared {} top-level entries over [{:#x}, {:#x})",
        cleared,
        window.start.as_u64(),
        window.end.as_u64()
    );
    cleared
}

/// Закрыть всё окно shadow временной ядовитой цепочкой.
/// Cover the whole shadow region with the provisional poisoned chain.
pub fn map_early_shadow(map: &impl PhysMap, root: Table, placeholders: &Placeholders) {
    let window = ShadowWindow::new(VirtAddr::new(SHADOW_START), VirtAddr::new(SHADOW_END));
    let entry = placeholders.encode(Entry::Provisional, Level::Top);
    for_each_top_entry(window, |index| root.write(map, index, entry));
}
