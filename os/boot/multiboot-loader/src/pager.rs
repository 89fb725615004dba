//! # Bootstrap Pager
//!
//! Builds the first 4-level hierarchy out of bootstrap allocator pages.
//!
//! The root and one table per level for the first 2 MiB are taken as a
//! single contiguous allocation and wired through entry 0:
//!
//! ```text
//! base + 0x0000  PML4 ─[0]─► base + 0x1000  PDPT ─[0]─► base + 0x2000  PD ─[0]─► base + 0x3000  PT
//!                                                                                    │
//!                                                            512 leaves, [0, 2 MiB) identity, RWX
//! ```
//!
//! Later mappings take their interior tables from whatever [`FrameAlloc`]
//! is passed in, normally the same bootstrap allocator.

use bootmem::BootstrapAllocator;
use kernel_info::memory::IDENTITY_LOW_BYTES;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{
    AddressSpace, FrameAlloc, MapError, PageEntry, PagePermissions, TableIndex, TableLevel,
    TableMapper,
};
use log::{debug, error};

/// Paging scheme the loader is asked to build.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PagingMode {
    /// 2-level 32-bit paging; not supported.
    Legacy32,
    /// 4-level long-mode paging.
    Long64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PagerError {
    #[error("32-bit paging is not supported")]
    UnsupportedPagingMode,
    #[error("out of memory for the bootstrap page tables")]
    OutOfMemory,
    #[error(transparent)]
    Map(#[from] MapError),
}

/// The loader's page-table hierarchy.
pub struct Pager<M: TableMapper> {
    tables: M,
    root: PhysicalPage<Size4K>,
}

impl<M: TableMapper> Pager<M> {
    /// Allocate and wire the bootstrap hierarchy and identity-map `[0, 2 MiB)`.
    ///
    /// # Errors
    /// - [`PagerError::UnsupportedPagingMode`] for [`PagingMode::Legacy32`].
    /// - [`PagerError::OutOfMemory`] if four contiguous pages are not available.
    pub fn initialize<const N: usize>(
        mode: PagingMode,
        tables: M,
        regions: &mut BootstrapAllocator<N>,
    ) -> Result<Self, PagerError> {
        if mode == PagingMode::Legacy32 {
            error!("32-bit paging is not supported");
            return Err(PagerError::UnsupportedPagingMode);
        }

        let Some(base) = regions.allocate(4) else {
            error!("Could not allocate the bootstrap page tables");
            return Err(PagerError::OutOfMemory);
        };

        let root = base.page::<Size4K>();
        let zero_va = VirtualAddress::new(0);
        let mut frame = root;
        for level in TableLevel::ALL {
            let table = unsafe { tables.table_mut(level, zero_va, frame) };
            table.zero();
            if level.next().is_some() {
                let next = frame.add_pages(1);
                table.set(TableIndex::new(0), PageEntry::table(next));
                frame = next;
            }
        }
        debug!("Bootstrap PML4 at {}", root.base());

        let pager = Self { tables, root };
        let mut page = PhysicalAddress::new(0);
        while page.as_u64() < IDENTITY_LOW_BYTES {
            pager.map_page(
                &mut *regions,
                page,
                VirtualAddress::new(page.as_u64()),
                PagePermissions::RWX,
            )?;
            page += Size4K::SIZE;
        }
        debug!("Identity-mapped [0, {IDENTITY_LOW_BYTES:#x})");

        Ok(pager)
    }

    /// Map one 4 KiB page, taking missing interior tables from `alloc`.
    ///
    /// # Errors
    /// [`PagerError::Map`] if `virt` is already mapped or a table could not
    /// be allocated.
    pub fn map_page<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        phys: PhysicalAddress,
        virt: VirtualAddress,
        perm: PagePermissions,
    ) -> Result<(), PagerError> {
        AddressSpace::from_root(&self.tables, self.root).map_page(alloc, phys, virt, perm)?;
        Ok(())
    }

    /// Physical address of the top-level table, for the kernel handoff.
    #[must_use]
    pub const fn describe_bootstrap(&self) -> PhysicalAddress {
        self.root.base()
    }

    /// How the tables are reached.
    #[must_use]
    pub const fn tables(&self) -> &M {
        &self.tables
    }

    /// Read-only view of the hierarchy.
    #[must_use]
    pub const fn address_space(&self) -> AddressSpace<'_, M> {
        AddressSpace::from_root(&self.tables, self.root)
    }
}
