//! # Typed `X86_64` Paging Registers
//!
//! The handful of control registers and instructions the memory subsystem
//! touches: `CR3` (active top-level table), `EFER` (`NXE` must be on before
//! any no-execute leaf is walked) and `invlpg`. The `CPUID` feature bits
//! tell the loader whether long mode and `NXE` exist at all.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cpuid")]
pub mod cpuid;

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "efer")]
pub mod efer;

#[cfg(feature = "tlb")]
pub mod tlb;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing paging registers changes the active address space.
    unsafe fn store_unsafe(self);
}
