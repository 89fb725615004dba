//! # Loader/Kernel Boot Interface
//!
//! Data structures and layout constants shared by the loader stage and the
//! kernel stage. Everything that crosses the handoff boundary is defined
//! here so both sides agree on the exact layout.
//!
//! ## Boot Information ([`boot`])
//!
//! * [`KernelBootInfo`](boot::KernelBootInfo): the fixed-layout descriptor the
//!   loader passes to the kernel entry point.
//! * [`BootRegion`](boot::BootRegion): one `{start, end, type}` entry of the
//!   page-rounded physical memory map.
//! * [`BootRegionType`](boot::BootRegionType): the wire-stable region type
//!   enumeration, including the loader-private `Allocated` and `Kernel` tags.
//!
//! ## Memory Layout ([`memory`])
//!
//! ```text
//! Physical Memory Layout:
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1 MiB)        │
//!             │  (BIOS, VGA, legacy structures) │
//! 0x0010_0000 ├─────────────────────────────────┤ LOW_MEMORY_END
//!             │  Allocatable RAM                │
//!             │  (identity-mapped up to 2 MiB)  │
//!             └─────────────────────────────────┘
//!
//! Virtual Address Space (kernel stage):
//! 0x0000_0000_0000_0000 ┌─────────────────────────┐
//!                       │ identity map [0, 2 MiB) │
//! 0xFFFF_FF00_0000_0000 ├─────────────────────────┤ PML4[510], self-map window
//!                       │ page-table pages        │
//! 0xFFFF_FF80_0000_0000 ├─────────────────────────┤
//!                       │ ...                     │
//! KERNEL_BASE           ├─────────────────────────┤ 0xFFFF_FFFF_8000_0000
//!                       │ kernel image, then the  │
//!                       │ memory manager metadata │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────┘
//! ```
//!
//! All constants are compile-time values; relationships between them are
//! asserted at build time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
