//! # Memory Layout
//!
//! Every region, bitmap bit and page-table mapping is [`Size4K`] sized.

use kernel_memory_addresses::{PageSize, Size2M, Size4K};

/// Memory below this address is left to firmware and legacy structures.
/// Neither allocator hands out pages from below it.
pub const LOW_MEMORY_END: u64 = 0x0010_0000; // 1 MiB

/// The loader identity-maps `[0, IDENTITY_LOW_BYTES)` so it keeps running
/// right after paging is enabled. One page table's worth of leaves.
pub const IDENTITY_LOW_BYTES: u64 = Size2M::SIZE;

/// First address past what 4-level paging can reach physically (52 bits).
///
/// Firmware ranges are clipped here before page rounding, so outward
/// rounding never has to step past the end of the 64-bit address space.
pub const PHYSICAL_ADDRESS_LIMIT: u64 = 1 << 52;

/// Top-level page-table slot that points back at the top-level table itself.
///
/// Must be the same in every stage that installs the self-map or computes
/// addresses relative to it.
pub const FRACTAL_SLOT: usize = 510;

/// Where the kernel executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Capacity of the loader's region table.
pub const BOOT_REGION_CAPACITY: usize = 1024;

/// Number of entries in every paging structure.
pub const ENTRIES_PER_TABLE: usize = 512;

const _: () = {
    assert!(LOW_MEMORY_END.is_multiple_of(Size4K::SIZE));
    assert!(IDENTITY_LOW_BYTES == ENTRIES_PER_TABLE as u64 * Size4K::SIZE);
    assert!(IDENTITY_LOW_BYTES > LOW_MEMORY_END);
    assert!(PHYSICAL_ADDRESS_LIMIT.is_multiple_of(Size4K::SIZE));
    assert!(FRACTAL_SLOT < ENTRIES_PER_TABLE);
    // The self-map window must live in the kernel half.
    assert!(FRACTAL_SLOT >= ENTRIES_PER_TABLE / 2);
    assert!(KERNEL_BASE.is_multiple_of(IDENTITY_LOW_BYTES));
};
