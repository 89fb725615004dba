//! # Virtual Memory Support
//!
//! x86-64 4-level paging for both boot stages: entry encoding, typed tables,
//! a generic table walker that lazily allocates interior levels, and the
//! fractal self-map that makes paging structures addressable as ordinary
//! kernel memory.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! Every level is a 4 KiB table of 512 eight-byte entries. Interior entries
//! point at the next table's frame and are created present + writable; leaf
//! (PT) entries map exactly one 4 KiB page with the permissions the caller
//! asked for, non-executable unless [`PagePermissions::EXECUTE`] is given.
//!
//! ## Reaching the tables
//!
//! The walker never dereferences physical addresses itself. A [`TableMapper`]
//! turns "the table at this level on the walk for this address" into a
//! reference:
//!
//! | Stage | Mapper | How a table is reached |
//! |-------|--------|------------------------|
//! | Loader | [`IdentityTables`] | Paging is off, physical == virtual. |
//! | Kernel | [`SelfMappedTables`] | Formula addresses through [`fractal`]'s reserved slot. |
//! | Tests | `testing::SimulatedMachine` | Simulated physical memory (feature `testing`). |
//!
//! ## Frame allocation
//!
//! Missing interior tables are taken from a [`FrameAlloc`], implemented by
//! both region allocators. Page-table frames are never returned.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub mod address_space;
pub mod entry;
pub mod fractal;
mod identity;
mod permissions;
pub mod table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::address_space::{AddressSpace, MapError};
pub use crate::entry::PageEntry;
pub use crate::fractal::SelfMappedTables;
pub use crate::identity::IdentityTables;
pub use crate::permissions::PagePermissions;
pub use crate::table::{PageTable, TableIndex, TableLevel};

/// Re-export of the typed address vocabulary.
pub use kernel_memory_addresses as addresses;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Source of fresh 4 KiB frames for interior page tables.
///
/// The frame's contents are undefined; the walker zeroes it through the
/// [`TableMapper`] once it has been linked into the hierarchy.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;
}

/// Access to the paging structures of one address space.
pub trait TableMapper {
    /// Borrow the table at `level` on the walk for `va`, stored in `frame`.
    ///
    /// Implementations pick whichever of `va` and `frame` they can address:
    /// identity mappers use `frame`, the self-map derives the address from `va`.
    ///
    /// # Safety
    /// The table must be present in the hierarchy (or be the root) and no
    /// other reference to it may be alive.
    unsafe fn table_mut<'a>(
        &self,
        level: TableLevel,
        va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
    ) -> &'a mut PageTable;

    /// Called after a fresh `level` table for `va` was linked into its parent,
    /// before it is first accessed.
    #[inline]
    fn table_linked(&self, _level: TableLevel, _va: VirtualAddress) {}

    /// Called after a leaf for `va` was installed.
    #[inline]
    fn leaf_installed(&self, _va: VirtualAddress) {}
}

/// Byte-level access to physical memory while it is directly addressable,
/// i.e. before paging or through an identity mapping.
pub trait PhysicalWindow {
    /// # Safety
    /// `[pa, pa + len)` must be addressable and not aliased elsewhere.
    unsafe fn phys_bytes_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8];
}

/// Byte-level access to mapped virtual memory.
pub trait VirtualWindow {
    /// # Safety
    /// `[va, va + len)` must be mapped writable and not aliased elsewhere.
    unsafe fn bytes_mut<'a>(&self, va: VirtualAddress, len: usize) -> &'a mut [u8];
}
