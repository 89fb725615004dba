use kernel_info::boot::{BootRegion, BootRegionType};
use kernel_info::memory::{BOOT_REGION_CAPACITY, LOW_MEMORY_END, PHYSICAL_ADDRESS_LIMIT};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::FrameAlloc;
use log::{debug, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootMemError {
    #[error("region table is full ({capacity} entries)")]
    TableFull { capacity: usize },
    /// The range does not lie within a single available region.
    #[error("[{start}, {end}) is not contained in a single available region")]
    NotContained {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    /// No reserved region starts at the given address.
    #[error("no reserved region starts at {0}")]
    UnknownAllocation(PhysicalAddress),
}

const EMPTY: BootRegion = BootRegion {
    start: 0,
    end: 0,
    region_type: 0,
};

/// Region allocator for the loader stage.
///
/// Entries are [`BootRegion`]s so the table can be handed to the kernel
/// as-is.
pub struct BootstrapAllocator<const N: usize = BOOT_REGION_CAPACITY> {
    regions: [BootRegion; N],
    count: usize,
}

impl<const N: usize> Default for BootstrapAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BootstrapAllocator<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: [EMPTY; N],
            count: 0,
        }
    }

    /// The sorted, compacted region table.
    #[inline]
    #[must_use]
    pub fn regions(&self) -> &[BootRegion] {
        &self.regions[..self.count]
    }

    /// Total bytes covered by regions of `region_type`.
    #[must_use]
    pub fn total_bytes(&self, region_type: BootRegionType) -> u64 {
        self.regions()
            .iter()
            .filter(|r| r.is_type(region_type))
            .map(BootRegion::len)
            .sum()
    }

    /// Record a firmware-reported range.
    ///
    /// The range is first clipped to [`PHYSICAL_ADDRESS_LIMIT`]. Available
    /// ranges are then rounded inward, all others outward. A range that
    /// rounds to nothing is ignored.
    ///
    /// # Errors
    /// [`BootMemError::TableFull`] if there is no room for another region.
    pub fn add_region(
        &mut self,
        region_type: BootRegionType,
        start: PhysicalAddress,
        end: PhysicalAddress,
    ) -> Result<(), BootMemError> {
        let limit = PhysicalAddress::new(PHYSICAL_ADDRESS_LIMIT);
        let (start, end) = (start.min(limit), end.min(limit));
        let (start, end) = if region_type.rounds_inward() {
            (start.align_up::<Size4K>(), end.align_down::<Size4K>())
        } else {
            (start.align_down::<Size4K>(), end.align_up::<Size4K>())
        };

        if end <= start {
            debug!("Ignoring empty {} region at {start}", region_type.as_str());
            return Ok(());
        }

        self.ensure_capacity(1)?;
        self.push(BootRegion::new(region_type, start, end));
        self.sort();
        Ok(())
    }

    /// Carve `[start, end)` (rounded outward) out of the available region
    /// containing it and mark it reserved.
    ///
    /// # Errors
    /// - [`BootMemError::NotContained`] if no single available region covers
    ///   the range. Nothing is changed.
    /// - [`BootMemError::TableFull`] if the split needs more slots than are left.
    pub fn reserve(&mut self, start: PhysicalAddress, end: PhysicalAddress) -> Result<(), BootMemError> {
        let start = start.align_down::<Size4K>();
        let end = end.align_up::<Size4K>();
        if end <= start {
            return Ok(());
        }

        let Some(index) = self
            .regions()
            .iter()
            .position(|r| r.is_type(BootRegionType::Available) && r.contains_range(start, end))
        else {
            return Err(BootMemError::NotContained { start, end });
        };

        let container = self.regions[index];
        let reserved = BootRegion::new(BootRegionType::Reserved, start, end);

        if container.start() == start {
            // Also taken when the reservation spans the whole container; the
            // container then collapses to zero length and is dropped below.
            self.ensure_capacity(1)?;
            self.regions[index].start = end.as_u64();
            self.push(reserved);
        } else if container.end() == end {
            self.ensure_capacity(1)?;
            self.regions[index].end = start.as_u64();
            self.push(reserved);
        } else {
            self.ensure_capacity(2)?;
            self.regions[index].end = start.as_u64();
            self.push(reserved);
            self.push(BootRegion::new(BootRegionType::Available, end, container.end()));
        }

        debug!("Reserved [{start}, {end})");
        self.sort();
        Ok(())
    }

    /// Allocate `page_count` contiguous pages at or above 1 MiB.
    ///
    /// Returns the base of the new reserved region, or `None` if no
    /// available region is large enough.
    pub fn allocate(&mut self, page_count: u64) -> Option<PhysicalAddress> {
        self.allocate_with_type(page_count, BootRegionType::Reserved)
    }

    /// Like [`allocate`](Self::allocate), tagging the carved region with
    /// `region_type` (the loader uses [`BootRegionType::Allocated`] for image
    /// segments so the kernel knows they are in use).
    pub fn allocate_with_type(
        &mut self,
        page_count: u64,
        region_type: BootRegionType,
    ) -> Option<PhysicalAddress> {
        if page_count == 0 {
            return None;
        }
        let bytes = page_count.checked_mul(Size4K::SIZE)?;

        let index = self.regions().iter().position(|r| {
            r.is_type(BootRegionType::Available) && r.start >= LOW_MEMORY_END && r.len() >= bytes
        })?;

        if self.ensure_capacity(1).is_err() {
            warn!("Cannot allocate {page_count} pages: region table is full");
            return None;
        }

        let base = self.regions[index].start();
        self.regions[index].start = (base + bytes).as_u64();
        self.push(BootRegion::new(region_type, base, base + bytes));
        self.sort();

        trace!("Allocated {page_count} pages at {base} ({})", region_type.as_str());
        Some(base)
    }

    /// Return the reservation starting at (the page containing) `addr`.
    ///
    /// Only whole reservations can be freed; `addr` must be the address
    /// [`allocate`](Self::allocate) returned.
    ///
    /// # Errors
    /// [`BootMemError::UnknownAllocation`] if no reserved region starts there.
    pub fn free(&mut self, addr: PhysicalAddress) -> Result<(), BootMemError> {
        let addr = addr.align_down::<Size4K>();
        let Some(region) = self.regions[..self.count]
            .iter_mut()
            .find(|r| r.is_type(BootRegionType::Reserved) && r.start() == addr)
        else {
            return Err(BootMemError::UnknownAllocation(addr));
        };

        region.set_region_type(BootRegionType::Available);
        self.coalesce();
        trace!("Freed reservation at {addr}");
        Ok(())
    }

    /// Merge runs of touching available regions, then compact.
    pub fn coalesce(&mut self) {
        let regions = &mut self.regions[..self.count];
        for i in 1..regions.len() {
            let (prev, next) = (regions[i - 1], regions[i]);
            if prev.is_type(BootRegionType::Available)
                && next.is_type(BootRegionType::Available)
                && !prev.is_empty()
                && prev.end == next.start
            {
                // Fold forward so a run collapses into its last element.
                regions[i].start = prev.start;
                regions[i - 1].end = prev.start;
            }
        }
        self.sort();
    }

    fn ensure_capacity(&self, extra: usize) -> Result<(), BootMemError> {
        if self.count + extra > N {
            warn!("Region table is full ({N} entries)");
            return Err(BootMemError::TableFull { capacity: N });
        }
        Ok(())
    }

    fn push(&mut self, region: BootRegion) {
        self.regions[self.count] = region;
        self.count += 1;
    }

    /// Order by start with zero-length regions last, then drop those.
    fn sort(&mut self) {
        let regions = &mut self.regions[..self.count];
        regions.sort_unstable_by_key(|r| (r.is_empty(), r.start));
        self.count = regions.iter().position(BootRegion::is_empty).unwrap_or(self.count);
    }
}

/// Interior page tables come straight from the region table.
impl<const N: usize> FrameAlloc for BootstrapAllocator<N> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.allocate(1).map(PhysicalAddress::page)
    }
}
