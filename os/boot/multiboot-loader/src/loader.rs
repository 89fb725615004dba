use crate::pager::{Pager, PagerError, PagingMode};
use bootmem::BootstrapAllocator;
use kernel_info::boot::{BootRegionType, KernelBootInfo, MemoryRegionsInfo};
use kernel_info::memory::BOOT_REGION_CAPACITY;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress};
use kernel_vmem::{PagePermissions, TableMapper};
use log::{debug, error};

/// Physical memory and page tables of the loader stage.
///
/// Borrows the region table for as long as the loader runs; the handoff
/// points straight into it.
pub struct BootLoader<'r, M: TableMapper, const N: usize = BOOT_REGION_CAPACITY> {
    regions: &'r mut BootstrapAllocator<N>,
    pager: Pager<M>,
}

impl<'r, M: TableMapper, const N: usize> BootLoader<'r, M, N> {
    /// Build the bootstrap page tables from `regions`.
    ///
    /// # Errors
    /// Whatever [`Pager::initialize`] reports.
    pub fn new(
        regions: &'r mut BootstrapAllocator<N>,
        tables: M,
        mode: PagingMode,
    ) -> Result<Self, PagerError> {
        let pager = Pager::initialize(mode, tables, regions)?;
        Ok(Self { regions, pager })
    }

    #[must_use]
    pub fn regions(&self) -> &BootstrapAllocator<N> {
        self.regions
    }

    #[must_use]
    pub const fn pager(&self) -> &Pager<M> {
        &self.pager
    }

    /// Back `page_count` pages at `virt` with fresh physical memory.
    ///
    /// The pages are recorded as [`BootRegionType::Allocated`] so the kernel
    /// treats them as in use. Returns the physical base of the backing.
    ///
    /// # Errors
    /// - [`PagerError::OutOfMemory`] if no contiguous run is left.
    /// - [`PagerError::Map`] if part of the range is already mapped. Pages
    ///   before the conflict stay mapped.
    pub fn load_segment(
        &mut self,
        virt: VirtualAddress,
        page_count: u64,
        perm: PagePermissions,
    ) -> Result<PhysicalAddress, PagerError> {
        let Some(phys) = self
            .regions
            .allocate_with_type(page_count, BootRegionType::Allocated)
        else {
            error!("No memory for a {page_count}-page segment at {virt}");
            return Err(PagerError::OutOfMemory);
        };

        for i in 0..page_count {
            let offset = i * Size4K::SIZE;
            self.pager
                .map_page(&mut *self.regions, phys + offset, virt + offset, perm)
                .inspect_err(|e| error!("Segment at {virt}: {e}"))?;
        }

        debug!("Segment {virt} ({page_count} pages, {perm:?}) backed at {phys}");
        Ok(phys)
    }

    /// The descriptor handed to the kernel.
    #[must_use]
    pub fn fill_boot_info(&self) -> KernelBootInfo {
        let regions = self.regions.regions();
        KernelBootInfo {
            regions: MemoryRegionsInfo {
                regions_ptr: regions.as_ptr().addr() as u64,
                region_count: regions.len() as u64,
            },
            bootstrap_pml4: self.pager.describe_bootstrap().as_u64(),
        }
    }
}
