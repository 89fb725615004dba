//! # Paging Entry Encoding
//!
//! One 64-bit entry layout shared by all four levels.
//!
//! | Bits      | Name              | Meaning |
//! |-----------|-------------------|----------|
//! | 0         | `P` (present)     | Valid entry if set |
//! | 1         | `RW`              | Writable if set |
//! | 2         | `US`              | User-mode accessible if set |
//! | 3         | `PWT`             | Write-through caching |
//! | 4         | `PCD`             | Disable caching |
//! | 5         | `A`               | Accessed |
//! | 6         | `D`               | Dirty (leaf only) |
//! | 7         | `PS` / `PAT`      | Large page (PD/PDPT), PAT in a PT entry |
//! | 8         | `G`               | Global (leaf only) |
//! | 9–11      | OS avail low      | Ignored by hardware |
//! | 12–51     | `addr`            | Physical frame bits [51:12] |
//! | 52–62     | OS avail high     | Ignored by hardware (or PKU) |
//! | 63        | `NX`              | Execute disable |

use crate::permissions::PagePermissions;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Mask of the frame address bits in a raw entry.
pub const FRAME_MASK: u64 = 0x000F_FFFF_FFFF_F000;

#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntry {
    /// Present (P, bit 0). With this clear the rest of the entry is meaningless.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5), set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6), set by the CPU on a write through a leaf.
    pub dirty: bool,

    /// Large page (PS, bit 7). Never set by this crate.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global: bool,

    #[bits(3)]
    pub os_available_low: u8,

    /// Physical address bits [51:12].
    #[bits(40)]
    frame_bits: u64,

    #[bits(11)]
    pub os_available_high: u16,

    /// No-Execute (NX, bit 63). Requires `EFER.NXE`.
    pub no_execute: bool,
}

impl PageEntry {
    /// A not-present entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new()
    }

    /// Interior entry linking to the next-level table at `table`.
    ///
    /// Present and writable; the effective rights are decided at the leaf.
    #[inline]
    #[must_use]
    pub const fn table(table: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_frame(table.base())
    }

    /// Leaf entry mapping one 4 KiB page at `phys`.
    ///
    /// Writable only if requested; non-executable unless requested.
    #[inline]
    #[must_use]
    pub const fn leaf(phys: PhysicalPage<Size4K>, perm: PagePermissions) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(perm.contains(PagePermissions::WRITE))
            .with_no_execute(!perm.contains(PagePermissions::EXECUTE))
            .with_frame(phys.base())
    }

    /// The self-referencing top-level entry: the table maps itself,
    /// writable and never executable.
    #[inline]
    #[must_use]
    pub const fn self_reference(pml4: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_no_execute(true)
            .with_frame(pml4.base())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.present()
    }

    /// The physical frame this entry points at.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.frame_bits() << 12))
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(self, phys: PhysicalAddress) -> Self {
        self.with_frame_bits((phys.as_u64() & FRAME_MASK) >> 12)
    }

    /// Rights granted by this entry alone (ignoring the rest of the walk).
    #[inline]
    #[must_use]
    pub const fn permissions(self) -> PagePermissions {
        let mut perm = PagePermissions::READ;
        if self.writable() {
            perm = perm.union(PagePermissions::WRITE);
        }
        if !self.no_execute() {
            perm = perm.union(PagePermissions::EXECUTE);
        }
        perm
    }
}
