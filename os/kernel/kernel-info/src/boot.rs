//! # Kernel Boot Information

use kernel_memory_addresses::PhysicalAddress;

/// Kernel function pointer.
///
/// # ABI
/// The loader calls the kernel with the System V AMD64 convention, passing
/// the boot info pointer in `RDI`.
pub type KernelEntryFn = extern "C" fn(*const KernelBootInfo) -> !;

/// Information the kernel needs right after the loader hands over control.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KernelBootInfo {
    /// The page-rounded physical memory map.
    pub regions: MemoryRegionsInfo,

    /// Physical address of the bootstrap top-level page table (PML4).
    pub bootstrap_pml4: u64,
}

impl KernelBootInfo {
    #[must_use]
    pub const fn bootstrap_pml4(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.bootstrap_pml4)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRegionsInfo {
    /// Pointer to the first [`BootRegion`] (identity-mapped).
    pub regions_ptr: u64,

    /// Number of valid [`BootRegion`] entries at `regions_ptr`.
    pub region_count: u64,
}

/// One entry of the memory map as handed to the kernel.
///
/// The loader's own region table is an array of these, so the handoff can
/// point straight at it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BootRegion {
    /// Inclusive start, page aligned.
    pub start: u64,
    /// Exclusive end, page aligned.
    pub end: u64,
    /// Raw [`BootRegionType`] value.
    pub region_type: u32,
}

impl BootRegion {
    #[must_use]
    pub const fn new(region_type: BootRegionType, start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self {
            start: start.as_u64(),
            end: end.as_u64(),
            region_type: region_type as u32,
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.start)
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.end)
    }

    /// The decoded region type; values this build does not know are `None`.
    #[inline]
    #[must_use]
    pub const fn region_type(&self) -> Option<BootRegionType> {
        BootRegionType::from_raw(self.region_type)
    }

    #[inline]
    pub const fn set_region_type(&mut self, region_type: BootRegionType) {
        self.region_type = region_type as u32;
    }

    #[inline]
    #[must_use]
    pub const fn is_type(&self, region_type: BootRegionType) -> bool {
        self.region_type == region_type as u32
    }

    /// Length in bytes. Zero-length regions are invalid and get compacted away.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `[start, end)` lies entirely within this region.
    #[inline]
    #[must_use]
    pub const fn contains_range(&self, start: PhysicalAddress, end: PhysicalAddress) -> bool {
        self.start <= start.as_u64() && end.as_u64() <= self.end
    }
}

/// Region type tag (wire-stable across both stages).
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootRegionType {
    Available = 0,
    Reserved = 1,
    AcpiReclaimable = 2,
    Nvs = 3,
    BadMemory = 4,
    /// Loader-private: pages the loader handed out for image segments.
    Allocated = 5,
    /// Loader-private: the kernel image itself.
    Kernel = 6,
}

impl BootRegionType {
    #[must_use]
    pub const fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Available,
            1 => Self::Reserved,
            2 => Self::AcpiReclaimable,
            3 => Self::Nvs,
            4 => Self::BadMemory,
            5 => Self::Allocated,
            6 => Self::Kernel,
            _ => return None,
        })
    }

    /// Whether ranges of this type are RAM the kernel may eventually manage.
    ///
    /// `Available` and `Allocated` ranges are combined when sizing the
    /// kernel's region descriptors and bitmaps.
    #[must_use]
    pub const fn is_combinable(self) -> bool {
        matches!(self, Self::Available | Self::Allocated)
    }

    /// Available memory is rounded inward, everything else outward.
    #[must_use]
    pub const fn rounds_inward(self) -> bool {
        matches!(self, Self::Available)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::AcpiReclaimable => "acpi-reclaimable",
            Self::Nvs => "nvs",
            Self::BadMemory => "bad-memory",
            Self::Allocated => "allocated",
            Self::Kernel => "kernel",
        }
    }
}
