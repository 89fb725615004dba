use crate::bitmap;
use crate::frame_alloc::EarlyFrames;
use crate::layout::MetadataLayout;
use crate::region::{KernelRegionType, RegionDescriptor, combine};
use kernel_info::boot::{BootRegion, BootRegionType};
use kernel_info::memory::LOW_MEMORY_END;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::fractal::{fractal_entry, install_self_map, is_self_mapped};
use kernel_vmem::{
    AddressSpace, FrameAlloc, MapError, PagePermissions, PageTable, TableMapper, VirtualWindow,
};
use log::{debug, error, info, trace, warn};

/// Bring-up progress of a [`KernelMemoryManager`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ManagerState {
    Uninitialized,
    SelfMapInstalled,
    BitmapAllocated,
    Ready,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelMemoryError {
    /// No available range at or above 1 MiB can hold bitmap, descriptors
    /// and the tables to map them. Fatal.
    #[error("no available region can hold {required_bytes} bytes of allocator metadata")]
    NoRegionForMetadata { required_bytes: u64 },
    #[error("{page} does not belong to an available region")]
    NotAvailable { page: PhysicalAddress },
    #[error("{page} is not covered by any region")]
    OutOfRange { page: PhysicalAddress },
    /// The fractal slot of the PML4 already maps something else.
    #[error("fractal slot already maps {frame}")]
    FractalSlotInUse { frame: PhysicalAddress },
    #[error("operation requires state {expected:?}, manager is {actual:?}")]
    InvalidState {
        expected: ManagerState,
        actual: ManagerState,
    },
    #[error(transparent)]
    Map(#[from] MapError),
}

/// Bitmap-backed physical memory manager of the kernel stage.
///
/// Page tables are reached through `T`, which must present the active
/// hierarchy through the fractal self-map once [`install_self_map`] ran.
///
/// [`install_self_map`]: Self::install_self_map
pub struct KernelMemoryManager<'t, T: TableMapper + VirtualWindow> {
    tables: &'t T,
    state: ManagerState,
    root: Option<PhysicalPage<Size4K>>,
    /// Next virtual address `map_beyond_image` hands out. Only grows.
    next_virt: VirtualAddress,
    bitmap: &'t mut [u8],
    regions: &'t mut [RegionDescriptor],
}

impl<'t, T: TableMapper + VirtualWindow> KernelMemoryManager<'t, T> {
    /// A manager that will map its metadata right after `image_end`.
    #[must_use]
    pub fn new(tables: &'t T, image_end: VirtualAddress) -> Self {
        Self {
            tables,
            state: ManagerState::Uninitialized,
            root: None,
            next_virt: image_end.align_up::<Size4K>(),
            bitmap: &mut [],
            regions: &mut [],
        }
    }

    #[must_use]
    pub const fn state(&self) -> ManagerState {
        self.state
    }

    /// Where the next `map_beyond_image` call will map to.
    #[must_use]
    pub const fn next_virtual(&self) -> VirtualAddress {
        self.next_virt
    }

    /// The tracked regions in ascending address order. Empty until ready.
    #[must_use]
    pub fn regions(&self) -> &[RegionDescriptor] {
        self.regions
    }

    fn expect_state(&self, expected: ManagerState) -> Result<(), KernelMemoryError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(KernelMemoryError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn address_space(&self) -> Result<AddressSpace<'t, T>, KernelMemoryError> {
        let root = self.root.ok_or(KernelMemoryError::InvalidState {
            expected: ManagerState::SelfMapInstalled,
            actual: self.state,
        })?;
        Ok(AddressSpace::from_root(self.tables, root))
    }

    /// Point the fractal slot of the active `pml4` (stored at `pml4_phys`)
    /// back at itself.
    ///
    /// `pml4` must be reachable without the self-map, e.g. through the
    /// loader's identity mapping. A slot that already maps `pml4` is kept.
    ///
    /// # Errors
    /// - [`KernelMemoryError::InvalidState`] unless the manager is
    ///   [`ManagerState::Uninitialized`].
    /// - [`KernelMemoryError::FractalSlotInUse`] if the slot maps another
    ///   table. Nothing is changed.
    pub fn install_self_map(
        &mut self,
        pml4: &mut PageTable,
        pml4_phys: PhysicalPage<Size4K>,
    ) -> Result<(), KernelMemoryError> {
        self.expect_state(ManagerState::Uninitialized)?;
        if is_self_mapped(pml4, pml4_phys) {
            debug!("PML4 at {pml4_phys} already maps itself");
        } else {
            let existing = fractal_entry(pml4);
            if existing.is_present() {
                let frame = existing.frame().base();
                error!("Fractal slot of the PML4 at {pml4_phys} already maps {frame}");
                return Err(KernelMemoryError::FractalSlotInUse { frame });
            }
            install_self_map(pml4, pml4_phys);
        }
        self.root = Some(pml4_phys);
        self.state = ManagerState::SelfMapInstalled;
        info!("Fractal self-map installed for PML4 at {pml4_phys}");
        Ok(())
    }

    /// Map `page_count` pages from `phys_base` at the next free virtual
    /// addresses after the kernel image and return the first of them.
    ///
    /// Interior tables come from `frames`. The cursor never moves back, even
    /// if a mapping fails halfway.
    ///
    /// # Errors
    /// - [`KernelMemoryError::InvalidState`] before the self-map is installed.
    /// - [`KernelMemoryError::Map`] if a table could not be allocated or a
    ///   page is already mapped.
    pub fn map_beyond_image<A: FrameAlloc + ?Sized>(
        &mut self,
        phys_base: PhysicalAddress,
        page_count: u64,
        perm: PagePermissions,
        frames: &mut A,
    ) -> Result<VirtualAddress, KernelMemoryError> {
        let space = self.address_space()?;
        let start = self.next_virt;
        for i in 0..page_count {
            let offset = i * Size4K::SIZE;
            space.map_page(&mut *frames, phys_base + offset, start + offset, perm)?;
            self.next_virt = start + offset + Size4K::SIZE;
        }
        debug!("Mapped {page_count} pages of {phys_base} at {start}");
        Ok(start)
    }

    /// Build the bitmap and region descriptors from the loader's handoff.
    ///
    /// # Errors
    /// - [`KernelMemoryError::InvalidState`] unless the self-map is installed.
    /// - [`KernelMemoryError::NoRegionForMetadata`] if nothing can host the
    ///   metadata. There is no fallback.
    /// - [`KernelMemoryError::Map`] if mapping the metadata failed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn initialize(&mut self, boot: &[BootRegion]) -> Result<(), KernelMemoryError> {
        self.expect_state(ManagerState::SelfMapInstalled)?;

        for region in boot.iter().filter(|r| KernelRegionType::from_boot(r).is_none()) {
            warn!(
                "Region [{}, {}) has unknown type {}; treating it as reserved",
                region.start(),
                region.end(),
                region.region_type
            );
        }

        let layout = MetadataLayout::for_regions(boot);
        let required_bytes = layout.required_bytes();
        let Some(host) = boot.iter().find(|r| {
            r.is_type(BootRegionType::Available)
                && r.start >= LOW_MEMORY_END
                && r.len() >= required_bytes
        }) else {
            error!("No region can hold {required_bytes} bytes of memory manager metadata");
            return Err(KernelMemoryError::NoRegionForMetadata { required_bytes });
        };

        let meta_base = host.start();
        let mut early = EarlyFrames::new(
            (meta_base + layout.metadata_pages * Size4K::SIZE).page(),
            layout.table_frames,
        );
        let meta_va = self.map_beyond_image(
            meta_base,
            layout.metadata_pages,
            PagePermissions::RW,
            &mut early,
        )?;

        let bytes = unsafe {
            self.tables
                .bytes_mut(meta_va, (layout.metadata_pages * Size4K::SIZE) as usize)
        };
        bytes.fill(0);
        let (bitmap, descriptors) = bytes.split_at_mut(layout.descriptors_offset);
        // Zeroed memory is a valid descriptor; the offset keeps the alignment.
        self.regions = unsafe {
            core::slice::from_raw_parts_mut(
                descriptors.as_mut_ptr().cast::<RegionDescriptor>(),
                layout.region_count,
            )
        };
        self.bitmap = &mut bitmap[..layout.bitmap_bytes];
        self.state = ManagerState::BitmapAllocated;
        debug!(
            "Memory manager metadata: {} regions, {} bitmap bytes, {} pages at {meta_base} ({meta_va})",
            layout.region_count, layout.bitmap_bytes, layout.metadata_pages
        );

        let mut offset = 0;
        for (slot, range) in self.regions.iter_mut().zip(combine(boot)) {
            let len = if range.kind == KernelRegionType::Available {
                bitmap::bytes_for(range.pages()) as usize
            } else {
                0
            };
            *slot = RegionDescriptor {
                base: range.base,
                pages: range.pages(),
                kind: range.kind,
                bitmap_offset: offset,
                bitmap_len: len,
            };
            offset += len;
        }

        for region in boot.iter().filter(|r| r.is_type(BootRegionType::Allocated)) {
            let first = region.start().page::<Size4K>();
            for i in 0..region.len() / Size4K::SIZE {
                self.set_busy(first.add_pages(i), true)?;
            }
        }

        let own_pages = layout.metadata_pages + early.used();
        let first = meta_base.page::<Size4K>();
        for i in 0..own_pages {
            self.set_busy(first.add_pages(i), true)?;
        }

        self.state = ManagerState::Ready;
        info!(
            "Memory manager ready: {} free pages in {} regions",
            self.free_page_count(),
            self.regions.len()
        );
        Ok(())
    }

    /// The region containing `page`: the last one whose base is at or below it.
    fn locate(&self, page: PhysicalPage<Size4K>) -> Result<(usize, u64), KernelMemoryError> {
        let addr = page.base();
        let out_of_range = KernelMemoryError::OutOfRange { page: addr };
        let index = self
            .regions
            .iter()
            .rposition(|r| r.base <= addr)
            .ok_or(out_of_range)?;

        let region = &self.regions[index];
        if !region.contains(addr) {
            return Err(out_of_range);
        }
        if region.kind != KernelRegionType::Available {
            return Err(KernelMemoryError::NotAvailable { page: addr });
        }
        Ok((index, (addr - region.base) / Size4K::SIZE))
    }

    fn set_busy(&mut self, page: PhysicalPage<Size4K>, busy: bool) -> Result<(), KernelMemoryError> {
        let (index, bit) = self.locate(page)?;
        let range = self.regions[index].bitmap_range();
        bitmap::set(&mut self.bitmap[range], bit, busy);
        Ok(())
    }

    /// Mark `page` as in use.
    ///
    /// # Errors
    /// - [`KernelMemoryError::InvalidState`] unless ready.
    /// - [`KernelMemoryError::OutOfRange`] / [`KernelMemoryError::NotAvailable`]
    ///   if `page` is not in an available region.
    pub fn mark_busy(&mut self, page: PhysicalPage<Size4K>) -> Result<(), KernelMemoryError> {
        self.expect_state(ManagerState::Ready)?;
        self.set_busy(page, true)
            .inspect_err(|e| warn!("Cannot mark {page} busy: {e}"))?;
        trace!("{page} busy");
        Ok(())
    }

    /// Return `page` to the free pool.
    ///
    /// # Errors
    /// As for [`mark_busy`](Self::mark_busy).
    pub fn free(&mut self, page: PhysicalPage<Size4K>) -> Result<(), KernelMemoryError> {
        self.expect_state(ManagerState::Ready)?;
        self.set_busy(page, false)
            .inspect_err(|e| warn!("Cannot free {page}: {e}"))?;
        trace!("{page} free");
        Ok(())
    }

    /// Whether `page` is in use.
    ///
    /// # Errors
    /// As for [`mark_busy`](Self::mark_busy).
    pub fn is_busy(&self, page: PhysicalPage<Size4K>) -> Result<bool, KernelMemoryError> {
        self.expect_state(ManagerState::Ready)?;
        let (index, bit) = self.locate(page)?;
        Ok(bitmap::get(&self.bitmap[self.regions[index].bitmap_range()], bit))
    }

    /// Take the lowest free page at or above 1 MiB.
    pub fn allocate_page(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.state != ManagerState::Ready {
            return None;
        }

        for region in self.regions.iter() {
            if region.kind != KernelRegionType::Available {
                continue;
            }
            let low = PhysicalAddress::new(LOW_MEMORY_END);
            let from = if region.base < low {
                (low - region.base) / Size4K::SIZE
            } else {
                0
            };
            let bits = &mut self.bitmap[region.bitmap_range()];
            if let Some(bit) = bitmap::first_clear(bits, from, region.pages) {
                bitmap::set(bits, bit, true);
                let page = region.base.page::<Size4K>().add_pages(bit);
                trace!("Allocated {page}");
                return Some(page);
            }
        }

        warn!("Out of physical pages");
        None
    }

    /// Free pages across all available regions.
    #[must_use]
    pub fn free_page_count(&self) -> u64 {
        self.regions
            .iter()
            .filter(|r| r.kind == KernelRegionType::Available)
            .map(|r| r.pages - bitmap::count_set(&self.bitmap[r.bitmap_range()]))
            .sum()
    }

    /// Map one page, taking interior tables from this manager.
    ///
    /// # Errors
    /// - [`KernelMemoryError::InvalidState`] unless ready.
    /// - [`KernelMemoryError::Map`] as for `AddressSpace::map_page`.
    pub fn map(
        &mut self,
        phys: PhysicalAddress,
        virt: VirtualAddress,
        perm: PagePermissions,
    ) -> Result<(), KernelMemoryError> {
        self.expect_state(ManagerState::Ready)?;
        let space = self.address_space()?;
        space.map_page(self, phys, virt, perm)?;
        Ok(())
    }
}

/// Once ready, the manager feeds the general mapper.
impl<T: TableMapper + VirtualWindow> FrameAlloc for KernelMemoryManager<'_, T> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.allocate_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::FRACTAL_SLOT;
    use kernel_vmem::fractal::{PML4_BASE, table_address};
    use kernel_vmem::testing::SimulatedMachine;
    use kernel_vmem::{PageEntry, TableIndex, TableLevel};

    const SIM_BASE: u64 = 0x10_0000;
    const IMAGE_END: u64 = 0xFFFF_FFFF_8000_3800;

    fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    fn page(v: u64) -> PhysicalPage<Size4K> {
        pa(v).page()
    }

    fn region(t: BootRegionType, start: u64, end: u64) -> BootRegion {
        BootRegion::new(t, pa(start), pa(end))
    }

    /// Low memory, the legacy hole, the bootstrap PML4, three loader-allocated
    /// image pages, the rest of the simulated RAM, and 1 GiB beyond 4 GiB.
    fn handoff() -> Vec<BootRegion> {
        vec![
            region(BootRegionType::Available, 0, 0x9_F000),
            region(BootRegionType::Reserved, 0x9_F000, 0x10_0000),
            region(BootRegionType::Reserved, 0x10_0000, 0x10_1000),
            region(BootRegionType::Allocated, 0x10_1000, 0x10_4000),
            region(BootRegionType::Available, 0x10_4000, 0x14_0000),
            region(BootRegionType::Available, 0x1_0000_0000, 0x1_4000_0000),
        ]
    }

    fn machine() -> SimulatedMachine {
        SimulatedMachine::new(pa(SIM_BASE), 64)
    }

    #[test]
    fn bring_up_walks_every_state() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        assert_eq!(mm.state(), ManagerState::Uninitialized);

        mm.install_self_map(unsafe { sim.table_at(root) }, root)
            .expect("self-map");
        assert_eq!(mm.state(), ManagerState::SelfMapInstalled);

        mm.initialize(&handoff()).expect("initialize");
        assert_eq!(mm.state(), ManagerState::Ready);

        let kinds: Vec<_> = mm
            .regions()
            .iter()
            .map(|r| (r.base.as_u64(), r.pages, r.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (0, 159, KernelRegionType::Available),
                (0x9_F000, 98, KernelRegionType::Reserved),
                (0x10_1000, 63, KernelRegionType::Available),
                (0x1_0000_0000, 0x4_0000, KernelRegionType::Available),
            ]
        );

        // Metadata is 9 pages at 0x104000 followed by 3 table frames;
        // together with the 3 image pages, 15 of the 63 pages are taken.
        assert_eq!(mm.free_page_count(), 159 + 48 + 0x4_0000);
        assert_eq!(mm.is_busy(page(0x10_1000)), Ok(true));
        assert_eq!(mm.is_busy(page(0x10_F000)), Ok(true));
        assert_eq!(mm.is_busy(page(0x11_0000)), Ok(false));

        // The metadata lives right after the image.
        assert_eq!(mm.next_virtual().as_u64(), 0xFFFF_FFFF_8000_4000 + 9 * 4096);
        assert_eq!(
            sim.translate(root, VirtualAddress::new(0xFFFF_FFFF_8000_4000)),
            Some(pa(0x10_4000))
        );
    }

    #[test]
    fn allocate_and_free_flip_single_bits() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");
        mm.initialize(&handoff()).expect("initialize");
        let free = mm.free_page_count();

        let first = mm.allocate_page().expect("page");
        assert_eq!(first, page(0x11_0000));
        assert_eq!(mm.free_page_count(), free - 1);

        mm.free(first).expect("free");
        assert_eq!(mm.is_busy(first), Ok(false));
        assert_eq!(mm.free_page_count(), free);

        mm.mark_busy(page(0x11_1000)).expect("busy");
        assert_eq!(mm.allocate_page(), Some(page(0x11_0000)));
        assert_eq!(mm.allocate_page(), Some(page(0x11_2000)));
    }

    #[test]
    fn pages_outside_available_regions_are_rejected() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");
        mm.initialize(&handoff()).expect("initialize");

        assert_eq!(
            mm.mark_busy(page(0x9_F000)),
            Err(KernelMemoryError::NotAvailable { page: pa(0x9_F000) })
        );
        // Beyond the end of the region that starts below it.
        assert_eq!(
            mm.free(page(0x50_0000)),
            Err(KernelMemoryError::OutOfRange { page: pa(0x50_0000) })
        );
    }

    #[test]
    fn operations_out_of_order_are_refused() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));

        assert_eq!(
            mm.initialize(&handoff()),
            Err(KernelMemoryError::InvalidState {
                expected: ManagerState::SelfMapInstalled,
                actual: ManagerState::Uninitialized,
            })
        );
        assert_eq!(
            mm.mark_busy(page(0x11_0000)),
            Err(KernelMemoryError::InvalidState {
                expected: ManagerState::Ready,
                actual: ManagerState::Uninitialized,
            })
        );
        assert_eq!(mm.allocate_page(), None);

        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");
        assert!(matches!(
            mm.install_self_map(unsafe { sim.table_at(root) }, root),
            Err(KernelMemoryError::InvalidState { .. })
        ));
    }

    #[test]
    fn missing_metadata_host_is_fatal() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");

        let boot = [
            region(BootRegionType::Available, 0, 0x9_F000),
            region(BootRegionType::Available, 0x10_0000, 0x10_2000),
        ];
        assert_eq!(
            mm.initialize(&boot),
            Err(KernelMemoryError::NoRegionForMetadata {
                required_bytes: 7 * 4096
            })
        );
        assert_eq!(mm.state(), ManagerState::SelfMapInstalled);
    }

    #[test]
    fn unknown_region_types_are_tracked_as_reserved() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");

        let mut boot = handoff();
        boot.push(BootRegion {
            start: 0x2_0000_0000,
            end: 0x2_0001_0000,
            region_type: 77,
        });
        mm.initialize(&boot).expect("initialize");

        let last = mm.regions().last().expect("regions");
        assert_eq!(last.kind, KernelRegionType::Reserved);
        assert_eq!(
            mm.is_busy(page(0x2_0000_0000)),
            Err(KernelMemoryError::NotAvailable { page: pa(0x2_0000_0000) })
        );
    }

    #[test]
    fn map_beyond_image_advances_monotonically() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");

        let mut frames = EarlyFrames::new(page(0x13_0000), 8);
        let a = mm
            .map_beyond_image(pa(0x12_0000), 2, PagePermissions::RW, &mut frames)
            .expect("first");
        let b = mm
            .map_beyond_image(pa(0x12_8000), 1, PagePermissions::READ, &mut frames)
            .expect("second");
        assert_eq!(a.as_u64(), 0xFFFF_FFFF_8000_4000);
        assert_eq!(b, a + 2 * 4096);
        assert_eq!(sim.translate(root, a + 4096), Some(pa(0x12_1000)));
        assert_eq!(sim.translate(root, b), Some(pa(0x12_8000)));
        assert_eq!(frames.used(), 3);

        // The freshly linked PDPT window was flushed before first use.
        assert_eq!(tables.invalidated()[0], table_address(TableLevel::Pdpt, a));
    }

    #[test]
    fn occupied_fractal_slot_is_refused() {
        let sim = machine();
        let root = page(SIM_BASE);
        let pml4 = unsafe { sim.table_at(root) };
        pml4.set(
            TableIndex::new(FRACTAL_SLOT as u16),
            PageEntry::table(page(0x13_0000)),
        );

        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        assert_eq!(
            mm.install_self_map(unsafe { sim.table_at(root) }, root),
            Err(KernelMemoryError::FractalSlotInUse { frame: pa(0x13_0000) })
        );
        assert_eq!(mm.state(), ManagerState::Uninitialized);
        assert_eq!(
            fractal_entry(unsafe { sim.table_at(root) }),
            PageEntry::table(page(0x13_0000))
        );
    }

    #[test]
    fn existing_self_map_is_kept() {
        let sim = machine();
        let root = page(SIM_BASE);
        install_self_map(unsafe { sim.table_at(root) }, root);

        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");
        assert_eq!(mm.state(), ManagerState::SelfMapInstalled);
        assert!(is_self_mapped(unsafe { sim.table_at(root) }, root));
    }

    #[test]
    fn self_map_makes_the_pml4_visible() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");
        assert_eq!(sim.translate(root, VirtualAddress::new(PML4_BASE)), Some(root.base()));
    }

    #[test]
    fn ready_manager_maps_with_its_own_pages() {
        let sim = machine();
        let root = page(SIM_BASE);
        let tables = sim.self_map(root);
        let mut mm = KernelMemoryManager::new(&tables, VirtualAddress::new(IMAGE_END));
        mm.install_self_map(unsafe { sim.table_at(root) }, root).expect("self-map");
        mm.initialize(&handoff()).expect("initialize");
        let free = mm.free_page_count();

        let va = VirtualAddress::new(0x0000_4000_0000_0000);
        mm.map(pa(0x13_0000), va, PagePermissions::RW).expect("map");
        assert_eq!(sim.translate(root, va), Some(pa(0x13_0000)));
        // PDPT, PD and PT.
        assert_eq!(mm.free_page_count(), free - 3);
    }
}
