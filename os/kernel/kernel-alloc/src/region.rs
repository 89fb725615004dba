use kernel_info::boot::{BootRegion, BootRegionType};
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// Region types the kernel distinguishes.
///
/// The loader's private `Allocated` and `Kernel` tags fold into
/// `Available` and `Reserved` on the way in.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum KernelRegionType {
    #[default]
    Available = 0,
    Reserved = 1,
    AcpiReclaimable = 2,
    Nvs = 3,
    BadMemory = 4,
}

impl KernelRegionType {
    /// Kernel view of a handoff region; `None` for a type value this build
    /// does not know.
    #[must_use]
    pub const fn from_boot(region: &BootRegion) -> Option<Self> {
        Some(match region.region_type() {
            Some(BootRegionType::Available | BootRegionType::Allocated) => Self::Available,
            Some(BootRegionType::Reserved | BootRegionType::Kernel) => Self::Reserved,
            Some(BootRegionType::AcpiReclaimable) => Self::AcpiReclaimable,
            Some(BootRegionType::Nvs) => Self::Nvs,
            Some(BootRegionType::BadMemory) => Self::BadMemory,
            None => return None,
        })
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::AcpiReclaimable => "acpi-reclaimable",
            Self::Nvs => "nvs",
            Self::BadMemory => "bad-memory",
        }
    }
}

/// One tracked region, stored in the manager's metadata pages.
///
/// The bitmap is referenced by offset into the shared bitmap area, not by
/// pointer, so descriptors stay plain data.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RegionDescriptor {
    pub base: PhysicalAddress,
    /// Length in pages.
    pub pages: u64,
    pub kind: KernelRegionType,
    pub(crate) bitmap_offset: usize,
    pub(crate) bitmap_len: usize,
}

impl RegionDescriptor {
    /// First address past the region.
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.base + self.pages * Size4K::SIZE
    }

    #[must_use]
    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        self.base <= addr && addr < self.end()
    }

    /// Byte range of this region's bits in the bitmap area.
    #[must_use]
    pub const fn bitmap_range(&self) -> core::ops::Range<usize> {
        self.bitmap_offset..self.bitmap_offset + self.bitmap_len
    }
}

/// A run of touching handoff regions with the same kernel type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CombinedRange {
    pub base: PhysicalAddress,
    pub end: PhysicalAddress,
    pub kind: KernelRegionType,
}

impl CombinedRange {
    #[must_use]
    pub fn pages(&self) -> u64 {
        (self.end - self.base) / Size4K::SIZE
    }
}

/// Merge touching regions of equal kernel type, in handoff order.
///
/// Unknown types count as reserved. Empty regions are skipped.
pub fn combine(regions: &[BootRegion]) -> impl Iterator<Item = CombinedRange> + '_ {
    let mut iter = regions.iter().filter(|r| !r.is_empty()).peekable();
    core::iter::from_fn(move || {
        let first = iter.next()?;
        let kind = KernelRegionType::from_boot(first).unwrap_or(KernelRegionType::Reserved);
        let mut range = CombinedRange {
            base: first.start(),
            end: first.end(),
            kind,
        };
        while let Some(next) = iter.next_if(|next| {
            next.start() == range.end
                && KernelRegionType::from_boot(next).unwrap_or(KernelRegionType::Reserved) == kind
        }) {
            range.end = next.end();
        }
        Some(range)
    })
}
