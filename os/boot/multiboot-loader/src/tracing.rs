//! # Trace output

use kernel_info::boot::KernelBootInfo;
use log::info;

pub fn trace_boot_info(boot_info: &KernelBootInfo) {
    info!(
        concat!(
            "Boot info at {:#018x}\n",
            "  regions ptr   = {:#018x}\n",
            "  region count  = {}\n",
            "  bootstrap PML4 = {}"
        ),
        core::ptr::from_ref(boot_info).addr(),
        boot_info.regions.regions_ptr,
        boot_info.regions.region_count,
        boot_info.bootstrap_pml4(),
    );
}
