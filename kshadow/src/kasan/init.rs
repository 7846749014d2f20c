//! Запуск KASAN — единственная точка входа / KASAN bring-up, the single entry point
//!
//! Порядок шагов жёсткий / The step order is fixed:
//!   1  подписка на GPF                      / fault hint subscription (inline)
//!   2  резерв окна shadow                   / reserve the shadow window
//!   3  копия корня, переключение на неё     / copy the root, switch to the copy
//!   4  очистка окна прямого отображения     / clear the direct-map window
//!   5  shadow для каждого диапазона памяти  / shadow for every memory extent
//!   6  очистка окна образа ядра и выше      / clear kernel image window and up
//!   7  shadow для образа ядра               / shadow for the kernel image
//!   8  нулевые заглушки для модулей и выше  / zero placeholders, modules and up
//!   9  обнуление ранней ядовитой страницы   / neutralise the early poison page
//!  10  возврат на постоянный корень         / back to the permanent root
//!  11  сброс счётчика глубины               / reset the depth counter
//!
//! Заполняется постоянный корень, а работает процессор всё это время на копии:
//! снятые в нём временные записи не видны текущему коду.
//! Population targets the permanent root while the CPU runs on the copy, so
//! the running code never sees the cleared provisional entries.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::hal::Platform;
use crate::kasan::clear::clear_window;
use crate::kasan::layout::{mem_to_shadow, ShadowLayout, SHADOW_SIZE, SHADOW_START};
use crate::kasan::mapper::{map_kernel_image, map_range, mapped_ranges};
use crate::kasan::placeholder::Placeholders;
use crate::kasan::populate::{Policy, Populator, ShadowWindow};
use crate::kasan::walk::{shadow_stats, ShadowStats};
use crate::mm::paging::{Level, Table};
use crate::mm::{PhysRange, VirtAddr};
use crate::{Result, ShadowError};

/// Счётчик рекурсии инструментации (kasan_depth).
/// Instrumentation recursion counter.
///
/// Ненулевое значение — проверки выключены. Начальный контекст стартует с 1.
/// Non-zero means checks are off. The initial context starts at 1.
#[derive(Debug)]
pub struct InstrumentationDepth(AtomicU32);

impl InstrumentationDepth {
    pub const fn new() -> Self { Self(AtomicU32::new(1)) }

    pub fn depth(&self) -> u32 { self.0.load(Ordering::Relaxed) }

    pub fn checks_enabled(&self) -> bool { self.depth() == 0 }

    pub fn reset(&self) { self.0.store(0, Ordering::Relaxed); }
}

impl Default for InstrumentationDepth {
    fn default() -> Self { Self::new() }
}

const UNINIT:      u8 = 0;
const IN_PROGRESS: u8 = 1;
const READY:       u8 = 2;

/// Состояние shadow на всю систему / System-wide shadow state
#[derive(Debug)]
pub struct ShadowState(AtomicU8);

impl ShadowState {
    pub const fn new() -> Self { Self(AtomicU8::new(UNINIT)) }

    /// Shadow готова: всё, что было до, видно всем после.
    /// Shadow is valid; everything before happens-before any reader after.
    pub fn is_ready(&self) -> bool { self.0.load(Ordering::Acquire) == READY }

    fn begin(&self) {
        if self
            .0
            .compare_exchange(UNINIT, IN_PROGRESS, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("kasan: shadow memory initialized twice");
        }
    }

    fn finish(&self) { self.0.store(READY, Ordering::Release); }
}

impl Default for ShadowState {
    fn default() -> Self { Self::new() }
}

/// Что загрузчик знает о памяти / What boot knows about memory
#[derive(Debug, Clone, Copy)]
pub struct BootInfo<'a> {
    pub layout:     ShadowLayout,
    /// Диапазоны прямого отображения, sentinel в конце
    /// Direct-mapped extents, sentinel-terminated
    pub memory_map: &'a [PhysRange],
    /// _end — конец образа ядра / end of the kernel image
    pub kernel_end: VirtAddr,
}

pub struct ShadowBoot<'a, P> {
    platform:     &'a mut P,
    placeholders: &'a Placeholders,
    boot:         BootInfo<'a>,
    depth:        &'a InstrumentationDepth,
}

impl<'a, P: Platform> ShadowBoot<'a, P> {
    pub fn new(
        platform:     &'a mut P,
        placeholders: &'a Placeholders,
        boot:         BootInfo<'a>,
        depth:        &'a InstrumentationDepth,
    ) -> Self {
        Self { platform, placeholders, boot, depth }
    }

    /// Выполнить все шаги. Ошибка на любом шаге обрывает последовательность.
    /// Run every step; an error at any step cuts the sequence short.
    pub fn run(self, state: &ShadowState) -> Result<ShadowStats> {
        state.begin();
        let layout = self.boot.layout;

        // 1. Подсказка для GPF / GPF hint
        #[cfg(feature = "inline")]
        self.platform.subscribe(crate::kasan::fault_hint::shadow_fault_hint);

        // 2. Резерв окна / Reserve the window
        self.platform.reserve(VirtAddr::new(SHADOW_START), SHADOW_SIZE);

        // 3. Работаем на копии корня / Run on a copy of the root
        let permanent_frame = self.platform.active_root();
        // SAFETY: the active root is a live top-level table.
        let permanent = unsafe { Table::from_frame(permanent_frame) };
        let scratch_frame = self.platform.alloc_zeroed_page().ok_or(
            ShadowError::BackingExhausted { level: Level::Top, addr: VirtAddr::new(SHADOW_START) },
        )?;
        // SAFETY: fresh frame from the allocator.
        let scratch = unsafe { Table::from_frame(scratch_frame) };
        scratch.copy_from(&*self.platform, &permanent);
        // SAFETY: the copy maps everything the permanent root does.
        unsafe { self.platform.load_root(scratch_frame) };
        log::debug!(
            "kasan: running on scratch root {:#x}, populating {:#x}",
            scratch_frame.as_u64(),
            permanent_frame.as_u64()
        );

        let mut populator = Populator::new(&mut *self.platform, self.placeholders, permanent);

        // 4. Очистка окна прямого отображения / Clear the direct-map window
        let direct = ShadowWindow::new(
            mem_to_shadow(layout.direct_map_base),
            mem_to_shadow(layout.direct_map_end()),
        );
        clear_window(populator.platform(), permanent, direct);

        // 5. Реальная память / Real memory
        let mut real_end = VirtAddr::new(0);
        for range in mapped_ranges(self.boot.memory_map).filter(|range| !range.is_empty()) {
            let window = map_range(&mut populator, &layout, range)?;
            real_end = real_end.max(window.end);
        }
        populator.populate(swept(direct), Policy::SharedZero)?;

        // 6. Очистка окна образа ядра и выше / Clear kernel image window and up
        let kernel = ShadowWindow::new(
            mem_to_shadow(layout.kernel_map_base),
            mem_to_shadow(VirtAddr::new(u64::MAX)),
        );
        clear_window(populator.platform(), permanent, kernel);

        // 7. Образ ядра / Kernel image
        let image = map_kernel_image(&mut populator, layout.kernel_map_base, self.boot.kernel_end)?;
        real_end = real_end.max(image.end);
        populator.populate(
            ShadowWindow::new(swept(kernel).start, mem_to_shadow(layout.modules_base)),
            Policy::SharedZero,
        )?;

        // 8. Модули и выше — только нули / Modules and up read as zeros only
        let dont_care = ShadowWindow::new(mem_to_shadow(layout.modules_base), kernel.end);
        if real_end > dont_care.start {
            return Err(ShadowError::SharedOverlap { level: Level::Leaf, addr: dont_care.start });
        }
        populator.populate(dont_care, Policy::SharedZero)?;
        let allocated = populator.allocated();

        // 9. Ранний яд больше не нужен / The early poison is no longer needed
        self.placeholders.clear_early_poison(&*self.platform);

        // 10. Назад на постоянный корень / Back to the permanent root
        // SAFETY: the permanent root keeps every mapping and now carries the shadow.
        unsafe { self.platform.load_root(permanent_frame) };

        // 11. Проверки включены / Checks on
        self.depth.reset();
        state.finish();

        let stats = shadow_stats(&*self.platform, self.placeholders, permanent);
        log::info!(
            "kasan: KernelAddressSanitizer initialized ({} pages allocated, {} KiB of shadow, {} shared entries)",
            allocated,
            stats.footprint() / 1024,
            stats.shared_entries
        );
        Ok(stats)
    }
}

/// Всё, что снимает `clear_window`: окно, расширенное до записей верхнего уровня.
/// Everything `clear_window` tears down: the window widened to top-level entries.
fn swept(window: ShadowWindow) -> ShadowWindow {
    let span = Level::Top.span();
    ShadowWindow::new(window.start.align_down(span), window.end.align_up(span))
}

/// Единственная точка входа: построить shadow или остановить загрузку.
/// The single entry point: build the shadow or halt the boot.
pub fn init_shadow_memory<P: Platform>(
    platform:     &mut P,
    placeholders: &Placeholders,
    boot:         BootInfo<'_>,
    depth:        &InstrumentationDepth,
    state:        &ShadowState,
) -> ShadowStats {
    match ShadowBoot::new(platform, placeholders, boot, depth).run(state) {
        Ok(stats) => stats,
        Err(err) => panic!("kasan: unable to allocate shadow! ({})", err),
    }
}
