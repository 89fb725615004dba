//! The loader builds the bootstrap hierarchy, then the kernel stage takes it
//! over through the fractal self-map.

use bootmem::BootstrapAllocator;
use kernel::{bring_up_memory, handoff_regions};
use kernel_alloc::{KernelMemoryError, KernelRegionType};
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::KERNEL_BASE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::PagePermissions;
use kernel_vmem::fractal::PML4_BASE;
use kernel_vmem::testing::SimulatedMachine;
use multiboot_loader::memory_map::{ingest, reserve_or_warn};
use multiboot_loader::multiboot::FirmwareRange;
use multiboot_loader::{BootLoader, PagingMode};

const SIM_BASE: u64 = 0x10_0000;
const FRAMES: usize = 128;

fn page(v: u64) -> PhysicalPage<Size4K> {
    PhysicalAddress::new(v).page()
}

/// Firmware map, loader image at 1 MiB, bootstrap tables and a three-page
/// kernel image.
///
/// Resulting physical layout:
/// - `[0x10_0000, 0x10_2000)` loader image
/// - `[0x10_2000, 0x10_6000)` PML4 and the identity chain
/// - `[0x10_6000, 0x10_9000)` kernel image (loader-allocated)
/// - `[0x10_9000, 0x10_C000)` tables for the kernel image mapping
/// - `[0x10_C000, 0x18_0000)` free
fn boot(sim: &SimulatedMachine, regions: &mut BootstrapAllocator<64>) -> KernelBootInfo {
    let firmware = [
        FirmwareRange { base: 0, length: 0x9_FC00, kind: 1 },
        FirmwareRange { base: 0x9_FC00, length: 0x6_0400, kind: 2 },
        FirmwareRange {
            base: sim.base().as_u64(),
            length: sim.end() - sim.base(),
            kind: 1,
        },
    ];
    ingest(regions, firmware).expect("ingest");
    reserve_or_warn(
        regions,
        "loader image",
        PhysicalAddress::new(SIM_BASE),
        PhysicalAddress::new(SIM_BASE + 0x2000),
    )
    .expect("reserve");

    let mut loader = BootLoader::new(regions, sim.tables(), PagingMode::Long64).expect("loader");
    let image = loader
        .load_segment(VirtualAddress::new(KERNEL_BASE), 3, PagePermissions::RWX)
        .expect("kernel image");
    assert_eq!(image.as_u64(), 0x10_6000);
    loader.fill_boot_info()
}

#[test]
fn kernel_takes_over_the_bootstrap_tables() {
    let sim = SimulatedMachine::new(PhysicalAddress::new(SIM_BASE), FRAMES);
    let mut regions = BootstrapAllocator::<64>::new();
    let info = boot(&sim, &mut regions);

    let root = info.bootstrap_pml4().page();
    assert_eq!(root, page(0x10_2000));

    let handoff = unsafe { handoff_regions(&info) };
    assert_eq!(handoff, regions.regions());

    let tables = sim.self_map(root);
    let image_end = VirtualAddress::new(KERNEL_BASE + 0x3000);
    let mut memory = bring_up_memory(
        &tables,
        &info,
        handoff,
        unsafe { sim.table_at(root) },
        image_end,
    )
    .expect("bring-up");

    // The PML4 now resolves through its own fractal window.
    assert_eq!(
        sim.translate(root, VirtualAddress::new(PML4_BASE)),
        Some(root.base())
    );

    let kinds: Vec<_> = memory
        .regions()
        .iter()
        .map(|r| (r.base.as_u64(), r.pages, r.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (0, 159, KernelRegionType::Available),
            (0x9_F000, 103, KernelRegionType::Reserved),
            (0x10_6000, 3, KernelRegionType::Available),
            (0x10_9000, 3, KernelRegionType::Reserved),
            (0x10_C000, 116, KernelRegionType::Available),
        ]
    );

    // One metadata page at 0x10C000, mapped into the kernel image's existing
    // page table, so no early table frames were needed.
    assert_eq!(
        sim.translate(root, image_end),
        Some(PhysicalAddress::new(0x10_C000))
    );
    assert_eq!(memory.next_virtual(), image_end + 0x1000);
    assert_eq!(memory.free_page_count(), 159 + 115);

    // The kernel image stays busy, the loader's tables were never available.
    assert_eq!(memory.is_busy(page(0x10_6000)), Ok(true));
    assert_eq!(
        memory.is_busy(page(0x10_2000)),
        Err(KernelMemoryError::NotAvailable {
            page: PhysicalAddress::new(0x10_2000)
        })
    );

    let frame = memory.allocate_page().expect("frame");
    assert_eq!(frame, page(0x10_D000));
}

#[test]
fn kernel_maps_new_memory_with_its_own_frames() {
    let sim = SimulatedMachine::new(PhysicalAddress::new(SIM_BASE), FRAMES);
    let mut regions = BootstrapAllocator::<64>::new();
    let info = boot(&sim, &mut regions);
    let root = info.bootstrap_pml4().page();
    let handoff = unsafe { handoff_regions(&info) };

    let tables = sim.self_map(root);
    let mut memory = bring_up_memory(
        &tables,
        &info,
        handoff,
        unsafe { sim.table_at(root) },
        VirtualAddress::new(KERNEL_BASE + 0x3000),
    )
    .expect("bring-up");

    let frame = memory.allocate_page().expect("frame");
    let heap = VirtualAddress::new(0xFFFF_8000_0000_0000);
    memory
        .map(frame.base(), heap, PagePermissions::RW)
        .expect("map");

    assert_eq!(sim.translate(root, heap + 0x10), Some(frame.base() + 0x10));
    // PDPT, PD and PT for the new slot came from the manager itself.
    for table in [0x10_E000, 0x10_F000, 0x11_0000] {
        assert_eq!(memory.is_busy(page(table)), Ok(true));
    }
    assert_eq!(memory.free_page_count(), 159 + 115 - 4);
}
