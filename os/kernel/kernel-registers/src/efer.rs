use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// `IA32_EFER` (MSR `0xC000_0080`), reduced to the bits paging depends on.
#[bitfield(u64, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct Efer {
    /// Bit 0: SCE: System Call Extensions.
    pub sce: bool,

    /// Bits 1–7: not used by the memory subsystem.
    #[bits(7)]
    __: u8,

    /// Bit 8: LME: Long Mode Enable.
    pub lme: bool,

    /// Bit 9: Reserved.
    __: bool,

    /// Bit 10: LMA: Long Mode Active (read-only).
    pub lma: bool,

    /// Bit 11: NXE: No-Execute Enable.
    ///
    /// With NXE clear, bit 63 of a paging entry is reserved and walking a
    /// no-execute entry raises a page fault.
    pub nxe: bool,

    /// Bits 12–63: preserved as read.
    #[bits(52)]
    pub upper: u64,
}

impl Efer {
    /// MSR index for `IA32_EFER` / `EFER`.
    pub const MSR_EFER: u32 = 0xC000_0080;
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Efer {
    unsafe fn load_unsafe() -> Self {
        let (lo, hi): (u32, u32);
        unsafe {
            core::arch::asm!(
                "rdmsr",
                in("ecx") Self::MSR_EFER,
                out("eax") lo,
                out("edx") hi,
                options(nomem, preserves_flags)
            );
        }
        Self::from_bits(u64::from(hi) << 32 | u64::from(lo))
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Efer {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn store_unsafe(self) {
        let efer = self.into_bits();
        let lo = efer as u32;
        let hi = (efer >> 32) as u32;
        unsafe {
            core::arch::asm!(
                "wrmsr",
                in("ecx") Self::MSR_EFER,
                in("eax") lo,
                in("edx") hi,
                options(nomem, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nxe_is_bit_eleven() {
        assert_eq!(Efer::new().with_nxe(true).into_bits(), 1 << 11);
        assert!(Efer::from_bits(0xD01).nxe());
        assert!(Efer::from_bits(0xD01).lma());
    }
}
