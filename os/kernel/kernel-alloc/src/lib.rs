//! # Kernel Physical Memory Manager
//!
//! The kernel's own region allocator. It takes over from the loader's
//! region table and tracks every page of RAM with one bit:
//!
//! ```text
//!   metadata host (first large-enough available range at or above 1 MiB)
//! ┌────────────────────────────┬───────────┬──────────────────────┐
//! │ bitmap bytes (per region)  │ pad to 8  │ RegionDescriptor[..] │  + early table frames
//! └────────────────────────────┴───────────┴──────────────────────┘
//!        mapped right after the kernel image by `map_beyond_image`
//! ```
//!
//! ## Bring-up
//!
//! The manager walks a fixed sequence of states:
//!
//! | State | Reached by | Allows |
//! |-------|------------|--------|
//! | [`ManagerState::Uninitialized`] | construction | [`KernelMemoryManager::install_self_map`] |
//! | [`ManagerState::SelfMapInstalled`] | the self-map write | `map_beyond_image`, `initialize` |
//! | [`ManagerState::BitmapAllocated`] | metadata mapped and zeroed | (internal) |
//! | [`ManagerState::Ready`] | bitmap populated | `mark_busy`, `free`, `allocate_page` |
//!
//! Page tables are reached through the fractal self-map, so the manager is
//! generic over the [`TableMapper`](kernel_vmem::TableMapper) that provides
//! it; tests substitute a simulated machine.
//!
//! ## Frames for its own tables
//!
//! Mapping the metadata may need fresh interior tables before any bitmap
//! exists. Those come from [`EarlyFrames`], a bump range placed directly
//! after the metadata and sized for the worst case; the frames it hands out
//! are marked busy together with the metadata.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod bitmap;
mod frame_alloc;
mod layout;
mod manager;
mod region;

pub use crate::frame_alloc::EarlyFrames;
pub use crate::layout::{MetadataLayout, worst_case_table_frames};
pub use crate::manager::{KernelMemoryError, KernelMemoryManager, ManagerState};
pub use crate::region::{CombinedRange, KernelRegionType, RegionDescriptor, combine};
