//! HAL — внешние сервисы, которыми пользуется shadow
//! HAL — external services the shadow bring-up consumes
//!
//! Ядро реализует их поверх железа, тесты — поверх `mock::MockMachine`.
//! The kernel implements them on hardware, tests on `mock::MockMachine`.

use crate::mm::{PhysAddr, VirtAddr};

/// Загрузочный аллокатор страниц / Boot-time page allocator
///
/// Узел NUMA не выбирается: годится любая страница (NUMA_NO_NODE).
/// No NUMA node is requested; any frame will do.
pub trait FrameAllocator {
    /// Обнулённая 4 KiB страница; `None` — память кончилась.
    /// A zeroed 4 KiB frame; `None` when memory is exhausted.
    fn alloc_zeroed_page(&mut self) -> Option<PhysAddr>;
}

/// Доступ к физическим кадрам через прямое отображение.
/// Access to physical frames through the direct map.
pub trait PhysMap {
    fn phys_to_virt(&self, phys: PhysAddr) -> VirtAddr;
}

/// Переключение корня трансляции (CR3).
/// Translation root switch (CR3).
pub trait RootSwitch {
    fn active_root(&self) -> PhysAddr;

    /// Загрузить таблицу; кэш трансляций сбрасывается.
    /// Load a table; cached translations are flushed.
    ///
    /// # Safety
    /// `root` must be a complete top-level table that maps everything the
    /// running code touches.
    unsafe fn load_root(&mut self, root: PhysAddr);
}

/// Ранний трекер резервирования виртуальных адресов (vm_area_add_early).
/// Early virtual address reservation tracker.
pub trait VmReserve {
    fn reserve(&mut self, base: VirtAddr, size: u64);
}

/// Вид аппаратного исключения / Hardware fault kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    GeneralProtection,
    PageFault,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultEvent {
    pub kind:       FaultKind,
    pub ip:         u64,
    pub error_code: u64,
    /// CR2 for page faults, if known
    pub addr:       Option<VirtAddr>,
}

/// Ответ подписчика / Subscriber verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    /// Продолжить обычный отчёт / Continue normal reporting
    Continue,
    /// Подавить / Suppress
    Stop,
}

pub type FaultHandler = fn(&FaultEvent) -> NotifyAction;

/// Шина уведомлений о неразобранных исключениях (die chain).
/// Notification bus for unhandled low-level faults.
pub trait FaultBus {
    fn subscribe(&mut self, handler: FaultHandler);
}

/// Всё сразу / Everything the orchestrator needs
pub trait Platform: FrameAllocator + PhysMap + RootSwitch + VmReserve + FaultBus {}

impl<T: FrameAllocator + PhysMap + RootSwitch + VmReserve + FaultBus> Platform for T {}
