//! Mock machine for tests
//!
//! Кадры — настоящие 4 KiB страницы хоста, физический адрес = указатель.
//! Frames are real 4 KiB host pages; the physical address is the pointer.

use crate::hal::{FaultBus, FaultHandler, FrameAllocator, PhysMap, RootSwitch, VmReserve};
use crate::kasan::walk::translate;
use crate::mm::paging::Table;
use crate::mm::{PhysAddr, VirtAddr, PAGE_SIZE};

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE as usize]);

pub struct MockMachine {
    frames:           Vec<*mut Frame>,
    root:             PhysAddr,
    active:           PhysAddr,
    loads:            Vec<PhysAddr>,
    allocations:      usize,
    budget:           Option<usize>,
    pub reservations: Vec<(VirtAddr, u64)>,
    pub handlers:     Vec<FaultHandler>,
}

impl MockMachine {
    /// Машина с пустым постоянным корнем / Machine with an empty permanent root
    pub fn new() -> Self {
        let mut m = Self {
            frames:       Vec::new(),
            root:         PhysAddr::new(0),
            active:       PhysAddr::new(0),
            loads:        Vec::new(),
            allocations:  0,
            budget:       None,
            reservations: Vec::new(),
            handlers:     Vec::new(),
        };
        m.root = m.new_frame();
        m.active = m.root;
        m
    }

    fn new_frame(&mut self) -> PhysAddr {
        let frame = Box::into_raw(Box::new(Frame([0; PAGE_SIZE as usize])));
        self.frames.push(frame);
        PhysAddr::new(frame as u64)
    }

    fn owns(&self, phys: PhysAddr) -> bool {
        let frame = phys.as_u64() & !(PAGE_SIZE - 1);
        self.frames.iter().any(|&f| f as u64 == frame)
    }

    /// Постоянный корень, с которым машина «загрузилась».
    /// The permanent root the machine booted with.
    pub fn root(&self) -> PhysAddr { self.root }

    pub fn root_table(&self) -> Table {
        unsafe { Table::from_frame(self.root) }
    }

    /// История загрузок CR3 / CR3 load history
    pub fn loads(&self) -> &[PhysAddr] { &self.loads }

    pub fn allocations(&self) -> usize { self.allocations }

    /// Разрешить ещё `n` аллокаций, потом отказывать.
    /// Allow `n` more allocations, then fail.
    pub fn fail_after(&mut self, n: usize) { self.budget = Some(n); }

    pub fn frame_bytes(&self, frame: PhysAddr) -> &[u8] {
        assert!(self.owns(frame), "{:#x} is not a mock frame", frame.as_u64());
        unsafe { core::slice::from_raw_parts(frame.as_u64() as *const u8, PAGE_SIZE as usize) }
    }

    pub fn read_phys(&self, phys: PhysAddr) -> u8 {
        assert!(self.owns(phys), "{:#x} is not a mock frame", phys.as_u64());
        unsafe { (phys.as_u64() as *const u8).read() }
    }

    /// Прочитать shadow-байт так, как его увидит процессор.
    /// Read a shadow byte the way the CPU would; `None` is a fault.
    pub fn read_shadow(&self, addr: VirtAddr) -> Option<u8> {
        let active = unsafe { Table::from_frame(self.active) };
        translate(self, active, addr).map(|t| self.read_phys(t.phys))
    }

    /// Записать shadow-байт; `false` — запись упала бы.
    /// Write a shadow byte; `false` when the write would fault.
    pub fn write_shadow(&mut self, addr: VirtAddr, value: u8) -> bool {
        let active = unsafe { Table::from_frame(self.active) };
        match translate(self, active, addr) {
            Some(t) if t.writable => {
                assert!(self.owns(t.phys));
                unsafe { (t.phys.as_u64() as *mut u8).write(value) };
                true
            }
            _ => false,
        }
    }
}

impl Drop for MockMachine {
    fn drop(&mut self) {
        for &frame in &self.frames {
            drop(unsafe { Box::from_raw(frame) });
        }
    }
}

impl FrameAllocator for MockMachine {
    fn alloc_zeroed_page(&mut self) -> Option<PhysAddr> {
        match self.budget {
            Some(0) => return None,
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        self.allocations += 1;
        Some(self.new_frame())
    }
}

impl PhysMap for MockMachine {
    fn phys_to_virt(&self, phys: PhysAddr) -> VirtAddr {
        VirtAddr::new(phys.as_u64())
    }
}

impl RootSwitch for MockMachine {
    fn active_root(&self) -> PhysAddr { self.active }

    unsafe fn load_root(&mut self, root: PhysAddr) {
        assert!(self.owns(root));
        self.active = root;
        self.loads.push(root);
    }
}

impl VmReserve for MockMachine {
    fn reserve(&mut self, base: VirtAddr, size: u64) {
        self.reservations.push((base, size));
    }
}

impl FaultBus for MockMachine {
    fn subscribe(&mut self, handler: FaultHandler) {
        self.handlers.push(handler);
    }
}
