//! # Page Tables and Indices

use crate::entry::PageEntry;
use core::fmt;
use kernel_info::memory::ENTRIES_PER_TABLE;
use kernel_memory_addresses::VirtualAddress;

/// The four levels of the hierarchy, root first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TableLevel {
    Pml4,
    Pdpt,
    Pd,
    Pt,
}

impl TableLevel {
    /// Root to leaf.
    pub const ALL: [Self; 4] = [Self::Pml4, Self::Pdpt, Self::Pd, Self::Pt];

    /// Lowest virtual address bit this level indexes with.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    /// The level whose tables this level's entries point at.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pml4 => Some(Self::Pdpt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pd => Some(Self::Pt),
            Self::Pt => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex(((va.as_u64() >> self.shift()) & 0x1FF) as u16)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pml4 => "PML4",
            Self::Pdpt => "PDPT",
            Self::Pd => "PD",
            Self::Pt => "PT",
        }
    }
}

impl fmt::Display for TableLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index into one table (`0..512`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// Build an index; `v` must be < 512.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// The four indices a virtual address selects, root first.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> [TableIndex; 4] {
    [
        TableLevel::Pml4.index_of(va),
        TableLevel::Pdpt.index_of(va),
        TableLevel::Pd.index_of(va),
        TableLevel::Pt.index_of(va),
    ]
}

/// One paging structure: 512 entries in a 4 KiB-aligned frame.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageEntry::zero(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Clear every entry.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntry::zero());
    }

    /// Number of present entries.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_present()).count()
    }
}

const _: () = {
    assert!(size_of::<PageTable>() == 4096);
    assert!(align_of::<PageTable>() == 4096);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_decode_bits() {
        // PML4[0xE0] PDPT[0] PD[0] PT[0]
        let [l4, l3, l2, l1] = split_indices(VirtualAddress::new(0x0000_7000_0000_0000));
        assert_eq!(
            (l4.as_usize(), l3.as_usize(), l2.as_usize(), l1.as_usize()),
            (0xE0, 0, 0, 0)
        );

        let [l4, l3, l2, l1] = split_indices(VirtualAddress::new(0xFFFF_FFFF_8020_3000));
        assert_eq!(
            (l4.as_usize(), l3.as_usize(), l2.as_usize(), l1.as_usize()),
            (511, 510, 1, 3)
        );
    }

    #[test]
    fn set_and_get() {
        let mut t = PageTable::zeroed();
        let i = TableIndex::new(510);
        t.set(i, PageEntry::new().with_present(true));
        assert!(t.get(i).is_present());
        assert_eq!(t.present_count(), 1);
        t.zero();
        assert_eq!(t.present_count(), 0);
    }
}
