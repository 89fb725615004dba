//! # Address Space (x86-64, PML4-rooted)
//!
//! The table walker shared by both stages.
//!
//! - [`AddressSpace::map_page`] installs one 4 KiB mapping, allocating and
//!   zeroing missing interior tables on the way down.
//! - [`AddressSpace::query`] / [`AddressSpace::translate`] walk without
//!   modifying anything.
//!
//! A present leaf is never overwritten: double-mapping a virtual address is
//! a caller bug and comes back as [`MapError::AlreadyMapped`] with the
//! existing translation untouched.

use crate::entry::PageEntry;
use crate::permissions::PagePermissions;
use crate::table::{PageTable, TableIndex, TableLevel, split_indices};
use crate::{FrameAlloc, TableMapper};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::trace;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// No frame was available for a missing interior table.
    #[error("out of memory allocating a {0} table")]
    OutOfMemory(TableLevel),
    /// The leaf for `va` is already present.
    #[error("{va} is already mapped to {existing}")]
    AlreadyMapped {
        va: VirtualAddress,
        existing: PhysicalAddress,
    },
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: TableMapper> {
    root: PhysicalPage<Size4K>,
    tables: &'m M,
}

impl<'m, M: TableMapper> AddressSpace<'m, M> {
    #[inline]
    #[must_use]
    pub const fn from_root(tables: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, tables }
    }

    /// Physical page of the PML4.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[inline]
    #[must_use]
    pub const fn tables(&self) -> &'m M {
        self.tables
    }

    /// Map the 4 KiB page at `virt` to the frame containing `phys`.
    ///
    /// # Errors
    /// - [`MapError::OutOfMemory`] if an interior table was missing and `alloc`
    ///   had no frame left. Tables linked before the failure stay in place.
    /// - [`MapError::AlreadyMapped`] if `virt` already has a present leaf.
    pub fn map_page<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        phys: PhysicalAddress,
        virt: VirtualAddress,
        perm: PagePermissions,
    ) -> Result<(), MapError> {
        let [i4, i3, i2, i1] = split_indices(virt);

        let pml4 = unsafe { self.tables.table_mut(TableLevel::Pml4, virt, self.root) };
        let pdpt_frame = self.ensure_next(pml4, i4, TableLevel::Pdpt, virt, alloc)?;

        let pdpt = unsafe { self.tables.table_mut(TableLevel::Pdpt, virt, pdpt_frame) };
        let pd_frame = self.ensure_next(pdpt, i3, TableLevel::Pd, virt, alloc)?;

        let pd = unsafe { self.tables.table_mut(TableLevel::Pd, virt, pd_frame) };
        let pt_frame = self.ensure_next(pd, i2, TableLevel::Pt, virt, alloc)?;

        let pt = unsafe { self.tables.table_mut(TableLevel::Pt, virt, pt_frame) };
        let existing = pt.get(i1);
        if existing.is_present() {
            return Err(MapError::AlreadyMapped {
                va: virt,
                existing: existing.frame().base(),
            });
        }

        pt.set(i1, PageEntry::leaf(phys.page(), perm));
        self.tables.leaf_installed(virt);
        trace!("mapped {virt} -> {phys} ({perm:?})");
        Ok(())
    }

    /// Follow (or create) the entry `index` of `parent` down to `child_level`.
    fn ensure_next<A: FrameAlloc + ?Sized>(
        &self,
        parent: &mut PageTable,
        index: TableIndex,
        child_level: TableLevel,
        virt: VirtualAddress,
        alloc: &mut A,
    ) -> Result<PhysicalPage<Size4K>, MapError> {
        let entry = parent.get(index);
        if entry.is_present() {
            return Ok(entry.frame());
        }

        let frame = alloc
            .alloc_4k()
            .ok_or(MapError::OutOfMemory(child_level))?;
        parent.set(index, PageEntry::table(frame));
        self.tables.table_linked(child_level, virt);

        let child = unsafe { self.tables.table_mut(child_level, virt, frame) };
        child.zero();
        trace!("new {child_level} table at {frame} for {virt}");
        Ok(frame)
    }

    /// The present leaf entry for `virt`, if any.
    #[must_use]
    pub fn query(&self, virt: VirtualAddress) -> Option<PageEntry> {
        let indices = split_indices(virt);
        let mut frame = self.root;
        for (level, index) in TableLevel::ALL.into_iter().zip(indices) {
            let table = unsafe { self.tables.table_mut(level, virt, frame) };
            let entry = table.get(index);
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

    /// Translate `virt` to the physical address it is mapped to.
    #[must_use]
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        self.query(virt)
            .map(|leaf| leaf.frame().join(virt.offset::<Size4K>()))
    }
}
