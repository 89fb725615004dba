//! # Kernel Entry Point

use crate::{bring_up_memory, handoff_regions, trace_handoff};
use core::panic::PanicInfo;
use kernel_info::boot::KernelBootInfo;
use kernel_memory_addresses::VirtualAddress;
use kernel_qemu::QemuLogger;
use kernel_registers::LoadRegisterUnsafe;
use kernel_registers::cr3::Cr3;
use kernel_vmem::{PageTable, SelfMappedTables};
use log::{LevelFilter, error, info, warn};

unsafe extern "C" {
    /// First byte past the kernel image (linker script).
    static __kernel_end: u8;
}

const BOOT_STACK_SIZE: usize = 64 * 1024;

/// 16-byte aligned stack
#[repr(align(16))]
struct Aligned<const N: usize>([u8; N]);

#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned<BOOT_STACK_SIZE> = Aligned([0; BOOT_STACK_SIZE]);

static TABLES: SelfMappedTables = SelfMappedTables;

/// The kernel entry point.
///
/// The loader jumps here with the System V convention, so `boot_info` arrives
/// in `RDI` and stays there while the stack is replaced.
///
/// # Naked function & Stack
/// Naked so that no prologue touches the loader's stack before ours is set up.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "C" fn _start_kernel(_boot_info: *const KernelBootInfo) -> ! {
    core::arch::naked_asm!(
        "cli",
        "lea rax, [rip + {stack_sym}]",
        "add rax, {stack_size}",
        "and rax, -16",
        "mov rsp, rax",
        // Emulate a CALL so that RSP % 16 == 8 at entry
        "push 0",
        "xor rbp, rbp",
        "jmp {rust_entry}",
        stack_sym = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        rust_entry = sym kernel_entry,
    );
}

#[unsafe(no_mangle)]
extern "C" fn kernel_entry(boot_info: *const KernelBootInfo) -> ! {
    if QemuLogger::new(LevelFilter::Debug).init().is_err() {
        halt();
    }
    info!("Kernel reporting to QEMU!");

    let bi = unsafe { &*boot_info };
    let regions = unsafe { handoff_regions(bi) };
    trace_handoff(bi, regions);

    let active = unsafe { Cr3::load_unsafe() }.pml4_phys();
    if active != bi.bootstrap_pml4() {
        warn!(
            "Active PML4 {active} differs from the handed-over {}",
            bi.bootstrap_pml4()
        );
    }

    // The loader identity-maps low memory, which holds the bootstrap PML4.
    #[allow(clippy::cast_possible_truncation)]
    let pml4 = unsafe { &mut *(bi.bootstrap_pml4().as_u64() as usize as *mut PageTable) };
    let image_end = VirtualAddress::from_ptr(&raw const __kernel_end);

    match bring_up_memory(&TABLES, bi, regions, pml4, image_end) {
        Ok(memory) => info!(
            "Memory bring-up complete; {} regions tracked",
            memory.regions().len()
        ),
        Err(e) => {
            error!("Kernel memory bring-up failed: {e}. Halting!");
            halt();
        }
    }

    halt()
}

fn halt() -> ! {
    loop {
        unsafe { core::arch::asm!("cli; hlt", options(nomem, nostack)) }
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error!("Kernel panic: {info}");
    halt()
}
