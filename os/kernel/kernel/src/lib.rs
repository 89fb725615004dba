//! # Kernel Stage
//!
//! Takes over from the Multiboot loader: reads the [`KernelBootInfo`]
//! handoff, installs the fractal self-map into the bootstrap PML4 and brings
//! up the bitmap-backed [`KernelMemoryManager`].
//!
//! The bare-metal entry point (`_start_kernel`) is only built for
//! freestanding targets; everything else runs against the simulated machine
//! of `kernel-vmem` in tests.
//!
//! [`KernelBootInfo`]: kernel_info::boot::KernelBootInfo
//! [`KernelMemoryManager`]: kernel_alloc::KernelMemoryManager

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(all(not(test), target_os = "none"))]
mod entry;
mod init;
mod tracing;

pub use init::{bring_up_memory, handoff_regions};
pub use tracing::trace_handoff;
