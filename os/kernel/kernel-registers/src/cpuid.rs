//! `CPUID` leaves the loader consults before turning on long-mode paging
//! features.

use bitfield_struct::bitfield;

/// Leaf reporting the highest supported extended leaf in `EAX`.
pub const LEAF_MAX_EXTENDED: u32 = 0x8000_0000;

/// Extended processor signature and feature bits.
pub const LEAF_EXTENDED_FEATURES: u32 = 0x8000_0001;

#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// Execute CPUID with the given leaf and subleaf.
///
/// # Safety
/// The CPUID instruction must be available.
#[cfg(feature = "asm")]
#[inline(always)]
#[allow(unused_assignments, clippy::inline_always)]
#[must_use]
pub unsafe fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
    let (mut eax, mut ebx, mut ecx, mut edx) = (leaf, 0u32, subleaf, 0u32);
    unsafe {
        // RBX is reserved by LLVM and cannot be named as an operand.
        core::arch::asm!(
            "push rbx",
            "cpuid",
            "mov {ebx_out:e}, ebx",
            "pop rbx",
            ebx_out = lateout(reg) ebx,
            inlateout("eax") eax,
            inlateout("ecx") ecx,
            lateout("edx") edx,
            options(nomem, preserves_flags),
        );
    }
    CpuidResult { eax, ebx, ecx, edx }
}

/// `CPUID.80000001H:EDX`.
#[bitfield(u32, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct ExtendedFeaturesEdx {
    /// Bits 0–10: legacy mirrors of leaf 1.
    #[bits(11)]
    __: u16,

    /// Bit 11: SYSCALL/SYSRET.
    pub syscall: bool,

    /// Bits 12–19: not used here.
    #[bits(8)]
    __: u8,

    /// Bit 20: NX: execute-disable bit in paging entries.
    pub nx: bool,

    /// Bits 21–25: not used here.
    #[bits(5)]
    __: u8,

    /// Bit 26: 1 GiB pages.
    pub page_1gb: bool,

    /// Bit 27: RDTSCP.
    pub rdtscp: bool,

    /// Bit 28: Reserved.
    __: bool,

    /// Bit 29: LM: Intel 64 / long mode.
    pub long_mode: bool,

    /// Bits 30–31: 3DNow! on older AMD parts.
    #[bits(2)]
    __: u8,
}

impl ExtendedFeaturesEdx {
    /// Decode leaf `0x8000_0001` given the highest extended leaf the CPU
    /// reports. `None` if the leaf is not implemented.
    #[must_use]
    pub const fn from_leaves(max_extended: u32, edx: u32) -> Option<Self> {
        if max_extended < LEAF_EXTENDED_FEATURES {
            return None;
        }
        Some(Self::from_bits(edx))
    }

    /// Query the running CPU.
    ///
    /// # Safety
    /// The CPUID instruction must be available.
    #[cfg(feature = "asm")]
    #[must_use]
    pub unsafe fn read() -> Option<Self> {
        let max = unsafe { cpuid(LEAF_MAX_EXTENDED, 0) }.eax;
        Self::from_leaves(max, unsafe { cpuid(LEAF_EXTENDED_FEATURES, 0) }.edx)
    }
}
