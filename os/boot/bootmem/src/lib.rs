//! # Bootstrap Region Allocator
//!
//! The loader's physical memory allocator. It runs before any page tables
//! exist, so it needs no heap and no mapping: a fixed-capacity table of
//! typed `[start, end)` ranges, kept sorted by start address.
//!
//! ```text
//!  firmware map ──► add_region ──┐
//!                                ▼
//!   reserve(start, end) ──► [ sorted region table ] ──► handoff to kernel
//!   allocate(n) / free(addr) ──┘
//! ```
//!
//! ## Invariants
//!
//! After every mutating call the visible table ([`BootstrapAllocator::regions`])
//! is ordered by ascending start, holds no zero-length region, and (given
//! non-overlapping firmware input) no two regions overlap.
//!
//! ## Rounding
//!
//! Available memory is rounded inward so a partial page is never handed out;
//! every other type is rounded outward so a hazard is never under-reported.
//! Reservations always round outward.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod allocator;

pub use allocator::{BootMemError, BootstrapAllocator};
