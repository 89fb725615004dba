//! # Kernel Tracing helpers

use kernel_info::boot::{BootRegion, BootRegionType, KernelBootInfo};
use log::{debug, info};

/// Log the handoff as the kernel sees it.
pub fn trace_handoff(boot_info: &KernelBootInfo, regions: &[BootRegion]) {
    info!(
        concat!(
            "Boot Info in Kernel:\n",
            "  BI ptr   = {bi:#018x}\n",
            "  MMAP ptr = {mmap_ptr:#018x}, regions = {count}\n",
            "  PML4     = {pml4}"
        ),
        bi = core::ptr::from_ref(boot_info) as usize,
        mmap_ptr = boot_info.regions.regions_ptr,
        count = boot_info.regions.region_count,
        pml4 = boot_info.bootstrap_pml4(),
    );

    for region in regions {
        debug!(
            "  [{:#014x}, {:#014x}) {}",
            region.start,
            region.end,
            region.region_type().map_or("Unknown", BootRegionType::as_str),
        );
    }
}
