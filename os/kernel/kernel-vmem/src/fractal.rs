//! # Fractal Self-Map
//!
//! Entry [`FRACTAL_SLOT`] of the top-level table points back at the
//! top-level table itself. Every walk that passes through that slot lands
//! one level "higher" in the hierarchy than it would otherwise, so each
//! paging structure shows up at a fixed, computable virtual address:
//!
//! | Walk indices (L4, L3, L2, L1)        | Lands on          | Window base |
//! |--------------------------------------|-------------------|-------------|
//! | `510, i4, i3, i2`                    | PT for `va`       | [`PT_BASE`] |
//! | `510, 510, i4, i3`                   | PD for `va`       | [`PD_BASE`] |
//! | `510, 510, 510, i4`                  | PDPT for `va`     | [`PDPT_BASE`] |
//! | `510, 510, 510, 510`                 | the PML4          | [`PML4_BASE`] |
//!
//! The self-map must be installed before any of these addresses is
//! dereferenced.

use crate::entry::PageEntry;
use crate::table::{PageTable, TableIndex, TableLevel};
use crate::{TableMapper, VirtualWindow};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_registers::tlb::invlpg;

pub use kernel_info::memory::FRACTAL_SLOT;

const SLOT: u64 = FRACTAL_SLOT as u64;

/// Sign extension for a kernel-half address (slot 510 has bit 47 set).
const CANONICAL_HIGH: u64 = 0xFFFF_0000_0000_0000;

/// Window holding every page table (L1).
pub const PT_BASE: u64 = CANONICAL_HIGH + (SLOT << 39);
/// Window holding every page directory (L2).
pub const PD_BASE: u64 = PT_BASE + (SLOT << 30);
/// Window holding every PDPT (L3).
pub const PDPT_BASE: u64 = PD_BASE + (SLOT << 21);
/// Address of the PML4 itself.
pub const PML4_BASE: u64 = PDPT_BASE + (SLOT << 12);

const _: () = {
    assert!(PT_BASE == 0xFFFF_FF00_0000_0000);
    assert!(PML4_BASE == 0xFFFF_FF7F_BFDF_E000);
};

/// Virtual address of the `level` table on the walk for `va`.
#[inline]
#[must_use]
pub const fn table_address(level: TableLevel, va: VirtualAddress) -> VirtualAddress {
    let va = va.as_u64();
    VirtualAddress::new(match level {
        TableLevel::Pml4 => PML4_BASE,
        TableLevel::Pdpt => PDPT_BASE + ((va >> 27) & 0x0000_001F_F000),
        TableLevel::Pd => PD_BASE + ((va >> 18) & 0x0000_3FFF_F000),
        TableLevel::Pt => PT_BASE + ((va >> 9) & 0x007F_FFFF_F000),
    })
}

/// Point the fractal slot of `pml4` (stored at `pml4_phys`) back at itself.
pub fn install_self_map(pml4: &mut PageTable, pml4_phys: PhysicalPage<Size4K>) {
    pml4.set(
        TableIndex::new(FRACTAL_SLOT as u16),
        PageEntry::self_reference(pml4_phys),
    );
}

/// What the fractal slot of `pml4` currently holds.
#[must_use]
pub const fn fractal_entry(pml4: &PageTable) -> PageEntry {
    pml4.get(TableIndex::new(FRACTAL_SLOT as u16))
}

/// Whether `pml4` already maps itself through the fractal slot.
#[must_use]
pub fn is_self_mapped(pml4: &PageTable, pml4_phys: PhysicalPage<Size4K>) -> bool {
    let e = fractal_entry(pml4);
    e.is_present() && e.frame() == pml4_phys
}

/// [`TableMapper`] for the active address space once the self-map is live.
///
/// Tables are reached at [`table_address`]; freshly linked tables and new
/// leaves are invalidated on this CPU.
#[derive(Debug, Default, Copy, Clone)]
pub struct SelfMappedTables;

impl TableMapper for SelfMappedTables {
    unsafe fn table_mut<'a>(
        &self,
        level: TableLevel,
        va: VirtualAddress,
        _frame: PhysicalPage<Size4K>,
    ) -> &'a mut PageTable {
        unsafe { &mut *table_address(level, va).as_mut_ptr::<PageTable>() }
    }

    fn table_linked(&self, level: TableLevel, va: VirtualAddress) {
        unsafe { invlpg(table_address(level, va)) }
    }

    fn leaf_installed(&self, va: VirtualAddress) {
        unsafe { invlpg(va) }
    }
}

impl VirtualWindow for SelfMappedTables {
    unsafe fn bytes_mut<'a>(&self, va: VirtualAddress, len: usize) -> &'a mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(va.as_mut_ptr::<u8>(), len) }
    }
}
