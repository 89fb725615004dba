//! # Firmware Memory Map Ingestion
//!
//! Feeds the firmware's ranges into the bootstrap allocator and then fences
//! off everything the loader must not hand out: its own image (which holds
//! the region table), the Multiboot information structure and any boot
//! modules.

use crate::LoaderError;
use crate::multiboot::{FirmwareRange, MultibootInfo};
use bootmem::{BootMemError, BootstrapAllocator};
use core::ops::Range;
use kernel_memory_addresses::PhysicalAddress;
use log::{error, info, warn};

/// Record every firmware range. Returns the number of ranges read.
///
/// # Errors
/// [`BootMemError::TableFull`] once the region table has no room left.
pub fn ingest<const N: usize>(
    regions: &mut BootstrapAllocator<N>,
    ranges: impl IntoIterator<Item = FirmwareRange>,
) -> Result<usize, BootMemError> {
    let mut count = 0;
    for range in ranges {
        regions.add_region(range.region_type(), range.start(), range.end())?;
        count += 1;
    }
    Ok(count)
}

/// Reserve `[start, end)`, logging instead of failing when it does not fall
/// inside a single available region.
///
/// # Errors
/// [`BootMemError::TableFull`] only.
pub fn reserve_or_warn<const N: usize>(
    regions: &mut BootstrapAllocator<N>,
    what: &str,
    start: PhysicalAddress,
    end: PhysicalAddress,
) -> Result<(), BootMemError> {
    match regions.reserve(start, end) {
        Err(BootMemError::NotContained { start, end }) => {
            warn!("Not reserving {what} [{start}, {end}): not inside a single available region");
            Ok(())
        }
        other => other,
    }
}

/// Build the loader's region table from the Multiboot information.
///
/// # Errors
/// - [`LoaderError::NoMemoryRegions`] if no firmware range survives page
///   rounding. There is nothing to allocate from.
/// - [`LoaderError::Regions`] if the firmware reports more ranges than the
///   table can hold.
pub fn build_memory_map<const N: usize>(
    regions: &mut BootstrapAllocator<N>,
    info: &MultibootInfo<'_>,
    info_addr: PhysicalAddress,
    image: Range<PhysicalAddress>,
) -> Result<(), LoaderError> {
    let count = ingest(regions, info.memory_map())?;
    info!("Firmware reported {count} memory ranges");
    if regions.regions().is_empty() {
        error!("Got no memory regions from the firmware");
        return Err(LoaderError::NoMemoryRegions);
    }

    reserve_or_warn(regions, "loader image", image.start, image.end)?;
    reserve_or_warn(
        regions,
        "boot information",
        info_addr,
        info_addr + info.total_size() as u64,
    )?;
    for module in info.modules() {
        info!(
            "Module {:?} at [{}, {})",
            module.cmdline, module.start, module.end
        );
        reserve_or_warn(regions, "module", module.start, module.end)?;
    }

    log_memory_map(regions);
    Ok(())
}

/// Dump the region table.
pub fn log_memory_map<const N: usize>(regions: &BootstrapAllocator<N>) {
    info!("Parsed memory map (rounded to page boundaries):");
    for region in regions.regions() {
        let kind = region.region_type().map_or("unknown", |t| t.as_str());
        info!(
            "  [{:#018x}, {:#018x}) {kind}",
            region.start, region.end
        );
    }
}
