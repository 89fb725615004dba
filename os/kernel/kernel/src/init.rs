use kernel_alloc::{KernelMemoryError, KernelMemoryManager};
use kernel_info::boot::{BootRegion, KernelBootInfo};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{PageTable, TableMapper, VirtualWindow};
use log::info;

/// The loader's region table, as described by `boot_info`.
///
/// # Safety
/// The table must still be mapped at the address the loader recorded (its
/// identity mapping of low memory) and must not be written to for `'a`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub unsafe fn handoff_regions<'a>(boot_info: &KernelBootInfo) -> &'a [BootRegion] {
    let ptr = boot_info.regions.regions_ptr as usize as *const BootRegion;
    let len = boot_info.regions.region_count as usize;
    if ptr.is_null() || len == 0 {
        return &[];
    }
    unsafe { core::slice::from_raw_parts(ptr, len) }
}

/// Install the self-map into `pml4` and build the physical memory manager
/// from `regions`.
///
/// `pml4` is the bootstrap PML4 named by `boot_info`, reached without the
/// self-map. The manager places its metadata right after `image_end`.
///
/// # Errors
/// Whatever [`KernelMemoryManager::initialize`] reports. The manager is
/// unusable in that case and the kernel cannot continue.
pub fn bring_up_memory<'t, T: TableMapper + VirtualWindow>(
    tables: &'t T,
    boot_info: &KernelBootInfo,
    regions: &[BootRegion],
    pml4: &mut PageTable,
    image_end: VirtualAddress,
) -> Result<KernelMemoryManager<'t, T>, KernelMemoryError> {
    let mut manager = KernelMemoryManager::new(tables, image_end);
    manager.install_self_map(pml4, boot_info.bootstrap_pml4().page())?;
    manager.initialize(regions)?;
    info!(
        "Kernel memory manager ready: {} free pages, next virtual address {}",
        manager.free_page_count(),
        manager.next_virtual()
    );
    Ok(manager)
}
