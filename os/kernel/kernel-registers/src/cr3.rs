use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// CR3: Page-Map Level-4 Base Register (PCID disabled).
#[bitfield(u64)]
pub struct Cr3 {
    /// Bits 0–2: Reserved.
    #[bits(3)]
    __: u8,

    /// Bit 3: PWT: write-through for PML4 accesses.
    pub pwt: bool,

    /// Bit 4: PCD: cache disable for PML4 accesses.
    pub pcd: bool,

    /// Bits 5–11: Reserved.
    #[bits(7)]
    __: u8,

    /// Bits 12–51: PML4 physical base >> 12.
    #[bits(40)]
    pml4_base_4k: u64,

    /// Bits 52–63: Reserved.
    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// `CR3` value that activates the table at `pml4_phys` with write-back caching.
    #[must_use]
    pub const fn from_pml4_phys(pml4_phys: PhysicalAddress) -> Self {
        Self::new().with_pml4_base_4k(pml4_phys.as_u64() >> 12)
    }

    /// Physical address of the active top-level table.
    #[must_use]
    pub const fn pml4_phys(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.pml4_base_4k() << 12)
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let mut cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pml4_base_round_trips_through_register_layout() {
        let cr3 = Cr3::from_pml4_phys(PhysicalAddress::new(0x0010_3000));
        assert_eq!(cr3.into_bits(), 0x0010_3000);
        assert_eq!(cr3.pml4_phys().as_u64(), 0x0010_3000);
    }

    #[test]
    fn flag_bits_do_not_leak_into_base() {
        let cr3 = Cr3::from_bits(0x0020_0000 | 0b1_1000);
        assert!(cr3.pwt());
        assert!(cr3.pcd());
        assert_eq!(cr3.pml4_phys().as_u64(), 0x0020_0000);
    }
}
