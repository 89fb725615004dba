//! # Simulated Machine
//!
//! Host-side stand-in for physical memory and the MMU, so the walker, the
//! self-map and both region allocators can be exercised without hardware.
//!
//! - [`SimulatedMachine`] owns a contiguous run of 4 KiB frames starting at a
//!   chosen physical base. Addresses outside that run panic.
//! - [`SimulatedMachine::tables`] reaches tables by physical frame (like the
//!   loader's identity mapping).
//! - [`SimulatedMachine::self_map`] reaches tables and bytes through the
//!   fractal window, resolving every virtual address with a software walk
//!   that follows the hardware's present-bit rules.
//! - [`FrameBump`] hands out consecutive frames.

use crate::entry::PageEntry;
use crate::fractal::table_address;
use crate::table::{PageTable, TableLevel, split_indices};
use crate::{FrameAlloc, PhysicalWindow, TableMapper, VirtualWindow};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::{RefCell, UnsafeCell};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

#[repr(C, align(4096))]
struct Frame([u8; 4096]);

pub struct SimulatedMachine {
    base: PhysicalAddress,
    frames: Box<[UnsafeCell<Frame>]>,
}

impl SimulatedMachine {
    /// `frame_count` zeroed frames starting at `base`.
    #[must_use]
    pub fn new(base: PhysicalAddress, frame_count: usize) -> Self {
        assert!(base.is_aligned::<Size4K>(), "simulated memory must be page aligned");
        let frames = (0..frame_count)
            .map(|_| UnsafeCell::new(Frame([0; 4096])))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { base, frames }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// First physical address past the simulated memory.
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.base + (self.frames.len() as u64) * 4096
    }

    fn frame_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!(
            pa >= self.base && pa < self.end(),
            "{pa} is outside simulated memory [{}, {})",
            self.base,
            self.end()
        );
        let index = ((pa - self.base) / 4096) as usize;
        self.frames[index].get().cast::<u8>()
    }

    /// Bytes `[pa, pa + len)` of simulated physical memory.
    ///
    /// # Safety
    /// No other reference to the range may be alive.
    #[must_use]
    pub unsafe fn phys_bytes_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8] {
        if len > 0 {
            // Validates the last byte too; frames are contiguous in the box.
            let _ = self.frame_ptr(pa + (len as u64 - 1));
        }
        let offset = pa.offset::<Size4K>().as_u64() as usize;
        unsafe { core::slice::from_raw_parts_mut(self.frame_ptr(pa).add(offset), len) }
    }

    /// The paging structure stored in `frame`.
    ///
    /// # Safety
    /// No other reference to the frame may be alive.
    #[must_use]
    pub unsafe fn table_at<'a>(&self, frame: PhysicalPage<Size4K>) -> &'a mut PageTable {
        unsafe { &mut *self.frame_ptr(frame.base()).cast::<PageTable>() }
    }

    /// Read-only software walk from `root`; the present leaf for `va`.
    #[must_use]
    pub fn walk(&self, root: PhysicalPage<Size4K>, va: VirtualAddress) -> Option<PageEntry> {
        let mut frame = root;
        for (level, index) in TableLevel::ALL.into_iter().zip(split_indices(va)) {
            let entry = unsafe { self.table_at(frame) }.get(index);
            if !entry.is_present() {
                return None;
            }
            if level == TableLevel::Pt {
                return Some(entry);
            }
            frame = entry.frame();
        }
        None
    }

    /// Translate `va` the way the MMU would with `root` in `CR3`.
    #[must_use]
    pub fn translate(&self, root: PhysicalPage<Size4K>, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.walk(root, va)
            .map(|leaf| leaf.frame().join(va.offset::<Size4K>()))
    }

    /// Table access by physical frame.
    #[must_use]
    pub const fn tables(&self) -> SimulatedTables<'_> {
        SimulatedTables { machine: self }
    }

    /// Table and byte access through the fractal window of `root`.
    #[must_use]
    pub const fn self_map(&self, root: PhysicalPage<Size4K>) -> SimulatedSelfMap<'_> {
        SimulatedSelfMap {
            machine: self,
            root,
            invalidated: RefCell::new(Vec::new()),
        }
    }
}

pub struct SimulatedTables<'s> {
    machine: &'s SimulatedMachine,
}

impl TableMapper for SimulatedTables<'_> {
    unsafe fn table_mut<'a>(
        &self,
        _level: TableLevel,
        _va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
    ) -> &'a mut PageTable {
        unsafe { self.machine.table_at(frame) }
    }
}

impl PhysicalWindow for SimulatedTables<'_> {
    unsafe fn phys_bytes_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8] {
        unsafe { self.machine.phys_bytes_mut(pa, len) }
    }
}

/// The active address space as seen through the self-map of `root`.
pub struct SimulatedSelfMap<'s> {
    machine: &'s SimulatedMachine,
    root: PhysicalPage<Size4K>,
    invalidated: RefCell<Vec<VirtualAddress>>,
}

impl SimulatedSelfMap<'_> {
    fn resolve(&self, va: VirtualAddress) -> PhysicalAddress {
        match self.machine.translate(self.root, va) {
            Some(pa) => pa,
            None => panic!("page fault: {va} is not mapped"),
        }
    }

    /// Every address passed to `invlpg`, in order.
    #[must_use]
    pub fn invalidated(&self) -> Vec<VirtualAddress> {
        self.invalidated.borrow().clone()
    }
}

impl TableMapper for SimulatedSelfMap<'_> {
    unsafe fn table_mut<'a>(
        &self,
        level: TableLevel,
        va: VirtualAddress,
        _frame: PhysicalPage<Size4K>,
    ) -> &'a mut PageTable {
        let pa = self.resolve(table_address(level, va));
        unsafe { self.machine.table_at(pa.page()) }
    }

    fn table_linked(&self, level: TableLevel, va: VirtualAddress) {
        self.invalidated.borrow_mut().push(table_address(level, va));
    }

    fn leaf_installed(&self, va: VirtualAddress) {
        self.invalidated.borrow_mut().push(va);
    }
}

impl VirtualWindow for SimulatedSelfMap<'_> {
    unsafe fn bytes_mut<'a>(&self, va: VirtualAddress, len: usize) -> &'a mut [u8] {
        let start = self.resolve(va);
        // The window must be backed by physically contiguous frames.
        let mut page = va.page::<Size4K>().base();
        while page.as_u64() < va.as_u64() + len as u64 {
            let expected = start.align_down::<Size4K>() + (page - va.page::<Size4K>().base());
            assert_eq!(self.resolve(page), expected, "{page} breaks contiguity");
            page += 4096;
        }
        unsafe { self.machine.phys_bytes_mut(start, len) }
    }
}

/// Hands out `count` consecutive frames starting at `start`.
pub struct FrameBump {
    next: PhysicalPage<Size4K>,
    remaining: usize,
    used: usize,
}

impl FrameBump {
    #[must_use]
    pub const fn new(start: PhysicalAddress, count: usize) -> Self {
        Self {
            next: start.page(),
            remaining: count,
            used: 0,
        }
    }

    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }
}

impl FrameAlloc for FrameBump {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.remaining == 0 {
            return None;
        }
        let frame = self.next;
        self.next = frame.add_pages(1);
        self.remaining -= 1;
        self.used += 1;
        Some(frame)
    }
}
