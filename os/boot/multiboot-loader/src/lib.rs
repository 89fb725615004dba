//! # Multiboot Loader
//!
//! The stage between the firmware's Multiboot2 handoff and the kernel. It
//! owns physical memory until the kernel's own manager takes over:
//!
//! ```text
//! Multiboot2 info ─► memory map ─► BootstrapAllocator ─► Pager (PML4 + identity 2 MiB)
//!       │                                │                      │
//!  kernel module ──► load_kernel ──► load_segment ◄─────────────┘
//!                                        │
//!                                fill_boot_info ─► KernelBootInfo ─► kernel entry
//! ```
//!
//! ## Stages
//!
//! 1. [`cpu::check_cpu`] refuses CPUs without long mode or NX.
//! 2. [`multiboot`] reads the memory map and finds the kernel module.
//! 3. [`memory_map::build_memory_map`] turns firmware ranges into regions,
//!    reserves what the loader itself occupies, and dumps the result.
//! 4. [`Pager`] builds the bootstrap page tables from allocator pages and
//!    identity-maps the first 2 MiB.
//! 5. [`BootLoader::load_kernel`] places the kernel's ELF segments, each
//!    backed by [`BootLoader::load_segment`].
//! 6. [`BootLoader::fill_boot_info`] produces the handoff for the kernel.
//!
//! [`handoff::prepare_handoff`] runs steps 2 to 6. The bare-metal entry point
//! (`loader_main`) is only compiled for freestanding targets; it adds the
//! CPU check, the `CR3` switch and the jump into the kernel.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cpu;
#[cfg(all(not(test), target_os = "none"))]
mod entry;
pub mod handoff;
mod kernel_image;
mod loader;
pub mod memory_map;
pub mod multiboot;
mod pager;
mod tracing;

pub use crate::kernel_image::{ImageError, KernelImage};
pub use crate::loader::BootLoader;
pub use crate::pager::{Pager, PagerError, PagingMode};
pub use crate::tracing::trace_boot_info;

use bootmem::BootMemError;
use cpu::CpuError;
use multiboot::MultibootError;

/// Anything that stops the loader before the kernel is entered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    Multiboot(#[from] MultibootError),
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error("the firmware provided no memory map")]
    NoMemoryMap,
    #[error("the firmware memory map holds no usable region")]
    NoMemoryRegions,
    #[error("no boot module carries the kernel image")]
    NoKernelModule,
    #[error(transparent)]
    Regions(#[from] BootMemError),
    #[error(transparent)]
    Pager(#[from] PagerError),
    #[error(transparent)]
    Image(#[from] ImageError),
}
