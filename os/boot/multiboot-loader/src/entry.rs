//! Freestanding entry point.
//!
//! A small long-mode stub (not part of this crate) switches the CPU to
//! 64-bit mode and calls [`loader_main`] with the Multiboot2 registers.

use crate::cpu::check_cpu;
use crate::handoff::prepare_handoff;
use crate::multiboot::{BOOTLOADER_MAGIC, MultibootError, MultibootInfo};
use crate::{LoaderError, trace_boot_info};
use bootmem::BootstrapAllocator;
use core::panic::PanicInfo;
use kernel_info::boot::{KernelBootInfo, KernelEntryFn};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_qemu::{DebugPort, QemuLogger};
use kernel_registers::cpuid::ExtendedFeaturesEdx;
use kernel_registers::cr3::Cr3;
use kernel_registers::efer::Efer;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use kernel_vmem::IdentityTables;
use log::{LevelFilter, error, info};

unsafe extern "C" {
    /// First byte of the loader image (linker script).
    static __loader_start: u8;
    /// First byte past the loader image, `.bss` included.
    static __loader_end: u8;
}

static mut REGIONS: BootstrapAllocator = BootstrapAllocator::new();
static mut BOOT_INFO: Option<KernelBootInfo> = None;

#[unsafe(no_mangle)]
pub extern "C" fn loader_main(magic: u32, info_addr: u32) -> ! {
    if QemuLogger::new(LevelFilter::Debug)
        .with_port(DebugPort::Com1)
        .init()
        .is_err()
    {
        halt();
    }
    info!("Multiboot loader reporting on COM1");

    match run(magic, PhysicalAddress::new(u64::from(info_addr))) {
        Ok((boot_info, entry)) => {
            trace_boot_info(boot_info);
            info!("Jumping to the kernel at {entry}");
            #[allow(clippy::cast_possible_truncation)]
            let kernel = unsafe {
                core::mem::transmute::<*const (), KernelEntryFn>(entry.as_u64() as usize as *const ())
            };
            kernel(boot_info)
        }
        Err(e) => {
            error!("Loader failed: {e}. Halting!");
            halt()
        }
    }
}

fn run(
    magic: u32,
    info_addr: PhysicalAddress,
) -> Result<(&'static KernelBootInfo, VirtualAddress), LoaderError> {
    if magic != BOOTLOADER_MAGIC {
        return Err(MultibootError::BadMagic(magic).into());
    }
    check_cpu(unsafe { ExtendedFeaturesEdx::read() })?;

    let info = unsafe { MultibootInfo::from_addr(info_addr) }?;
    let image = unsafe {
        PhysicalAddress::from_identity_ptr(&raw const __loader_start)
            ..PhysicalAddress::from_identity_ptr(&raw const __loader_end)
    };

    // Single-threaded; this is the only reference ever taken.
    let regions = unsafe { &mut *(&raw mut REGIONS) };
    let handoff = prepare_handoff(regions, IdentityTables, &info, info_addr, image)?;
    let boot_info = unsafe { (*(&raw mut BOOT_INFO)).insert(handoff.boot_info) };

    unsafe {
        // Leaves are NX unless executable; the bit must be honoured before
        // the switch.
        Efer::load_unsafe().with_nxe(true).store_unsafe();
        Cr3::from_pml4_phys(boot_info.bootstrap_pml4()).store_unsafe();
    }
    info!("Bootstrap page tables active");

    Ok((boot_info, handoff.kernel.entry))
}

fn halt() -> ! {
    loop {
        unsafe { core::arch::asm!("cli; hlt", options(nomem, nostack)) }
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error!("Loader panic: {info}");
    halt()
}
