//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses, page bases and in-page
//! offsets that the loader and kernel memory managers pass around.
//!
//! ## Overview
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 64-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`MemoryAddressOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a page of size `S`. |
//!
//! The principal types are wrapped to keep the two address spaces apart:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Page-table translated memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical memory as reported by firmware. |
//!
//! ## Rounding
//!
//! Region bookkeeping rounds in two directions: free memory is rounded
//! *inward* so a partial page is never handed out, hazards are rounded
//! *outward* so a partial page is never under-reported. Both directions are
//! expressed with [`PhysicalAddress::align_down`] and
//! [`PhysicalAddress::align_up`].
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let start = PhysicalAddress::new(0x9_FC01);
//! assert_eq!(start.align_up::<Size4K>().as_u64(), 0xA_0000);
//! assert_eq!(start.align_down::<Size4K>().as_u64(), 0x9_F000);
//!
//! let (page, off) = start.split::<Size4K>();
//! assert_eq!(page.join(off), start);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod memory_address;
mod memory_page;
mod page_size;
mod physical_address;
mod virtual_address;

pub use memory_address::{MemoryAddress, MemoryAddressOffset};
pub use memory_page::{MemoryPage, PhysicalPage, VirtualPage};
pub use page_size::{PageSize, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Number of `S`-sized pages needed to cover `bytes` bytes.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// assert_eq!(pages_for_bytes::<Size4K>(0), 0);
/// assert_eq!(pages_for_bytes::<Size4K>(1), 1);
/// assert_eq!(pages_for_bytes::<Size4K>(4096), 1);
/// assert_eq!(pages_for_bytes::<Size4K>(4097), 2);
/// ```
#[inline]
#[must_use]
pub const fn pages_for_bytes<S: PageSize>(bytes: u64) -> u64 {
    bytes.div_ceil(S::SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let a = MemoryAddress::new(0x1234_5678_9ABC_DEF0);
        let (p, o) = a.split::<Size4K>();
        assert_eq!(p.base().as_u64() & 0xFFF, 0);
        assert_eq!(o.as_u64(), a.as_u64() & 0xFFF);
        assert_eq!(p.join(o).as_u64(), a.as_u64());
    }

    #[test]
    fn split_and_join_2m() {
        let a = MemoryAddress::new(0x0000_0008_1234_5678);
        let (p, o) = a.split::<Size2M>();
        assert_eq!(p.base().as_u64() & (Size2M::SIZE - 1), 0);
        assert_eq!(p.join(o).as_u64(), a.as_u64());
    }

    #[test]
    fn inward_and_outward_rounding() {
        // Available [0x1001, 0x3FFF) shrinks to whole pages.
        let start = PhysicalAddress::new(0x1001).align_up::<Size4K>();
        let end = PhysicalAddress::new(0x3FFF).align_down::<Size4K>();
        assert_eq!((start.as_u64(), end.as_u64()), (0x2000, 0x3000));

        // Reserved [0x1001, 0x3FFF) grows to whole pages.
        let start = PhysicalAddress::new(0x1001).align_down::<Size4K>();
        let end = PhysicalAddress::new(0x3FFF).align_up::<Size4K>();
        assert_eq!((start.as_u64(), end.as_u64()), (0x1000, 0x4000));
    }

    #[test]
    fn align_up_keeps_aligned_values() {
        let a = PhysicalAddress::new(0x10_0000);
        assert!(a.is_aligned::<Size4K>());
        assert_eq!(a.align_up::<Size4K>(), a);
    }

    #[test]
    fn align_up_saturates_at_top_of_address_space() {
        let a = MemoryAddress::new(u64::MAX - 5);
        assert_eq!(a.align_up::<Size4K>().as_u64(), 0xFFFF_FFFF_FFFF_F000);
    }

    #[test]
    fn page_stepping() {
        let p = PhysicalAddress::new(0x20_0000).page::<Size4K>();
        assert_eq!(p.add_pages(3).base().as_u64(), 0x20_3000);
        assert_eq!(p.add_pages(3).pages_since(p), 3);
    }

    #[test]
    fn address_difference() {
        let a = VirtualAddress::new(0xFFFF_8000_0000_2000);
        let b = VirtualAddress::new(0xFFFF_8000_0000_0000);
        assert_eq!(a - b, 0x2000);
    }
}
