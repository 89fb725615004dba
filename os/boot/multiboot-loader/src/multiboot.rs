//! # Multiboot2 Boot Information
//!
//! Thin view over [`multiboot2::BootInformation`] that speaks the loader's
//! vocabulary: firmware ranges become [`FirmwareRange`]s with a
//! [`BootRegionType`], module tags become [`Module`]s with physical bounds.
//!
//! Only the memory map and module tags are consulted.

use kernel_info::boot::BootRegionType;
use kernel_memory_addresses::PhysicalAddress;
use log::error;
use multiboot2::{
    BootInformation, BootInformationHeader, MemoryArea, MemoryAreaType, MemoryAreaTypeId,
    MemoryMapTag, ModuleTag,
};

/// Value in `EAX` when a Multiboot2-compliant bootloader jumps to us.
pub const BOOTLOADER_MAGIC: u32 = multiboot2::MAGIC;

/// Command line of the boot module that holds the kernel image.
pub const KERNEL_MODULE: &str = "kernel-x86_64.bin";

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MultibootError {
    #[error("unexpected bootloader magic {0:#x}")]
    BadMagic(u32),
    #[error("boot information is malformed")]
    Malformed,
}

/// A `(base, length, type)` triple from the firmware memory map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FirmwareRange {
    pub base: u64,
    pub length: u64,
    /// Multiboot memory type.
    pub kind: u32,
}

impl FirmwareRange {
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.saturating_add(self.length))
    }

    /// The region type this range is recorded as.
    ///
    /// Types the firmware invents on its own are treated as reserved.
    #[must_use]
    pub fn region_type(&self) -> BootRegionType {
        match MemoryAreaType::from(MemoryAreaTypeId::from(self.kind)) {
            MemoryAreaType::Available => BootRegionType::Available,
            MemoryAreaType::AcpiAvailable => BootRegionType::AcpiReclaimable,
            MemoryAreaType::ReservedHibernate => BootRegionType::Nvs,
            MemoryAreaType::Defective => BootRegionType::BadMemory,
            MemoryAreaType::Reserved | MemoryAreaType::Custom(_) => BootRegionType::Reserved,
        }
    }
}

impl From<&MemoryArea> for FirmwareRange {
    fn from(area: &MemoryArea) -> Self {
        Self {
            base: area.start_address(),
            length: area.size(),
            kind: u32::from(area.typ()),
        }
    }
}

/// A boot module, such as the kernel image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Module<'a> {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
    pub cmdline: &'a str,
}

impl<'a> Module<'a> {
    fn from_tag(tag: &'a ModuleTag) -> Self {
        Self {
            start: PhysicalAddress::new(u64::from(tag.start_address())),
            end: PhysicalAddress::new(u64::from(tag.end_address())),
            cmdline: tag.cmdline().unwrap_or(""),
        }
    }

    /// Whether this module carries the kernel image.
    ///
    /// Only the first word of the command line counts; anything after it is
    /// an argument for the kernel.
    #[must_use]
    pub fn is_kernel(&self) -> bool {
        self.cmdline.split_whitespace().next() == Some(KERNEL_MODULE)
    }

    /// Size of the module in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.as_u64().saturating_sub(self.start.as_u64())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MultibootInfo<'a> {
    inner: BootInformation<'a>,
}

impl MultibootInfo<'_> {
    /// Wrap the info structure at `addr`.
    ///
    /// # Errors
    /// [`MultibootError::Malformed`] if the structure is misaligned, declares
    /// an impossible size or lacks its end tag.
    ///
    /// # Safety
    /// `addr` must be the identity-mapped address the bootloader passed, and
    /// the structure must stay untouched for as long as the view is used.
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn from_addr(addr: PhysicalAddress) -> Result<Self, MultibootError> {
        let ptr = addr.as_u64() as usize as *const BootInformationHeader;
        match unsafe { BootInformation::load(ptr) } {
            Ok(inner) => Ok(Self { inner }),
            Err(e) => {
                error!("Cannot read boot information at {addr}: {e}");
                Err(MultibootError::Malformed)
            }
        }
    }

    /// Bytes covered by the structure, tags included.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.inner.total_size()
    }

    /// Entries of the memory map tag. Empty if there is none.
    pub fn memory_map(&self) -> impl Iterator<Item = FirmwareRange> {
        self.inner
            .memory_map_tag()
            .map(MemoryMapTag::memory_areas)
            .unwrap_or_default()
            .iter()
            .map(FirmwareRange::from)
    }

    /// Whether the firmware provided a memory map tag.
    #[must_use]
    pub fn has_memory_map(&self) -> bool {
        self.inner.memory_map_tag().is_some()
    }

    /// Loaded boot modules.
    pub fn modules(&self) -> impl Iterator<Item = Module<'_>> {
        self.inner.module_tags().map(Module::from_tag)
    }

    /// The first module whose command line names the kernel image.
    #[must_use]
    pub fn kernel_module(&self) -> Option<Module<'_>> {
        self.modules().find(Module::is_kernel)
    }
}
