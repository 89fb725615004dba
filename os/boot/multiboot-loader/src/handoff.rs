//! # Handoff Preparation
//!
//! Everything the loader does between reading the boot information and
//! switching `CR3`, independent of how tables and physical memory are
//! reached.

use crate::kernel_image::KernelImage;
use crate::memory_map::build_memory_map;
use crate::multiboot::{KERNEL_MODULE, MultibootInfo};
use crate::{BootLoader, LoaderError, PagingMode};
use bootmem::BootstrapAllocator;
use core::ops::Range;
use kernel_info::boot::KernelBootInfo;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::{PhysicalWindow, TableMapper};
use log::{error, info};

/// What the entry point needs to start the kernel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub boot_info: KernelBootInfo,
    pub kernel: KernelImage,
}

/// Build the region table and bootstrap tables, then load the kernel module.
///
/// `info_addr` is where `info` lives; `loader_image` is the loader's own
/// footprint. Both are fenced off together with every boot module.
///
/// # Errors
/// - [`LoaderError::NoMemoryMap`] or [`LoaderError::NoMemoryRegions`] if
///   the firmware left nothing to allocate from.
/// - [`LoaderError::NoKernelModule`] if no module is named [`KERNEL_MODULE`].
/// - [`LoaderError::Regions`], [`LoaderError::Pager`] or
///   [`LoaderError::Image`] from the individual steps.
#[allow(clippy::cast_possible_truncation)]
pub fn prepare_handoff<M: TableMapper + PhysicalWindow, const N: usize>(
    regions: &mut BootstrapAllocator<N>,
    tables: M,
    info: &MultibootInfo<'_>,
    info_addr: PhysicalAddress,
    loader_image: Range<PhysicalAddress>,
) -> Result<Handoff, LoaderError> {
    if !info.has_memory_map() {
        error!("Got no memory map from the firmware");
        return Err(LoaderError::NoMemoryMap);
    }
    let Some(module) = info.kernel_module() else {
        error!("No boot module named {KERNEL_MODULE:?}; cannot load the kernel");
        return Err(LoaderError::NoKernelModule);
    };
    info!("Kernel module at [{}, {})", module.start, module.end);

    build_memory_map(regions, info, info_addr, loader_image)?;
    let mut loader = BootLoader::new(regions, tables, PagingMode::Long64)?;

    // Reserved by build_memory_map, so no allocation can overlap it.
    let image: &[u8] = unsafe {
        loader
            .pager()
            .tables()
            .phys_bytes_mut(module.start, module.len() as usize)
    };
    let kernel = loader.load_kernel(image)?;

    Ok(Handoff {
        boot_info: loader.fill_boot_info(),
        kernel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_image::tests::{ElfBuilder, PF_R, PF_W, PF_X};
    use crate::multiboot::tests::InfoBuilder;
    use kernel_info::boot::BootRegionType;
    use kernel_info::memory::KERNEL_BASE;
    use kernel_memory_addresses::VirtualAddress;
    use kernel_vmem::testing::SimulatedMachine;

    const SIM_BASE: u64 = 0x10_0000;
    const MODULE_BASE: u64 = 0x12_0000;

    fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    /// Simulated RAM with the kernel ELF copied to `MODULE_BASE`. Returns the
    /// module's end.
    fn machine_with_kernel() -> (SimulatedMachine, u64) {
        let sim = SimulatedMachine::new(pa(SIM_BASE), 64);
        let elf = ElfBuilder::new(KERNEL_BASE)
            .segment(KERNEL_BASE, PF_R | PF_X, &[0xF4; 0x40], 0x40)
            .segment(KERNEL_BASE + 0x1000, PF_R | PF_W, &[7; 8], 0x2000)
            .build();
        let bytes = elf.as_bytes();
        unsafe { sim.phys_bytes_mut(pa(MODULE_BASE), bytes.len()) }.copy_from_slice(bytes);
        (sim, MODULE_BASE + bytes.len() as u64)
    }

    fn firmware_map(sim: &SimulatedMachine) -> InfoBuilder {
        InfoBuilder::new().memory_map(&[
            (0, 0x9_FC00, 1),
            (0x9_FC00, 0x6_0400, 2),
            (sim.base().as_u64(), sim.end() - sim.base(), 1),
        ])
    }

    #[test]
    fn kernel_module_is_loaded_behind_the_bootstrap_tables() {
        let (sim, module_end) = machine_with_kernel();
        let info = firmware_map(&sim)
            .module(
                u32::try_from(MODULE_BASE).expect("module"),
                u32::try_from(module_end).expect("module"),
                "kernel-x86_64.bin",
            )
            .build();

        let mut regions = BootstrapAllocator::<32>::new();
        let handoff = prepare_handoff(
            &mut regions,
            sim.tables(),
            &info.info(),
            info.addr(),
            pa(SIM_BASE)..pa(SIM_BASE + 0x2000),
        )
        .expect("handoff");

        assert_eq!(handoff.kernel.entry, VirtualAddress::new(KERNEL_BASE));
        assert_eq!(handoff.kernel.end, VirtualAddress::new(KERNEL_BASE + 0x3000));

        let root = handoff.boot_info.bootstrap_pml4().page();
        assert_eq!(root.base(), pa(SIM_BASE + 0x2000));
        let text = sim
            .translate(root, VirtualAddress::new(KERNEL_BASE))
            .expect("text mapped");
        assert_eq!(unsafe { sim.phys_bytes_mut(text, 2) }, &[0xF4u8; 2]);
        let data = sim
            .translate(root, VirtualAddress::new(KERNEL_BASE + 0x1000))
            .expect("data mapped");
        assert_eq!(unsafe { sim.phys_bytes_mut(data, 9) }, &[7u8, 7, 7, 7, 7, 7, 7, 7, 0]);

        // The module itself stays fenced off; segments are tracked as allocated.
        assert_eq!(regions.total_bytes(BootRegionType::Allocated), 3 * 0x1000);
        assert!(
            regions
                .regions()
                .iter()
                .any(|r| r.is_type(BootRegionType::Reserved) && r.start == MODULE_BASE)
        );
        assert_eq!(
            handoff.boot_info.regions.region_count,
            regions.regions().len() as u64
        );
    }

    #[test]
    fn missing_kernel_module_is_fatal() {
        let (sim, module_end) = machine_with_kernel();
        let info = firmware_map(&sim)
            .module(
                u32::try_from(MODULE_BASE).expect("module"),
                u32::try_from(module_end).expect("module"),
                "initrd.img",
            )
            .build();

        let mut regions = BootstrapAllocator::<32>::new();
        assert_eq!(
            prepare_handoff(
                &mut regions,
                sim.tables(),
                &info.info(),
                info.addr(),
                pa(SIM_BASE)..pa(SIM_BASE + 0x2000),
            ),
            Err(LoaderError::NoKernelModule)
        );
        assert!(regions.regions().is_empty());
    }

    #[test]
    fn missing_memory_map_is_fatal() {
        let (sim, module_end) = machine_with_kernel();
        let info = InfoBuilder::new()
            .module(
                u32::try_from(MODULE_BASE).expect("module"),
                u32::try_from(module_end).expect("module"),
                "kernel-x86_64.bin",
            )
            .build();

        let mut regions = BootstrapAllocator::<32>::new();
        assert_eq!(
            prepare_handoff(
                &mut regions,
                sim.tables(),
                &info.info(),
                info.addr(),
                pa(SIM_BASE)..pa(SIM_BASE + 0x2000),
            ),
            Err(LoaderError::NoMemoryMap)
        );
    }
}
