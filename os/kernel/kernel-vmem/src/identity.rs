use crate::table::{PageTable, TableLevel};
use crate::{PhysicalWindow, TableMapper};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// [`TableMapper`] and [`PhysicalWindow`] for code running with
/// physical == virtual addresses.
///
/// The loader builds its tables before paging is switched on, so there is
/// no translation cache to maintain.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityTables;

impl TableMapper for IdentityTables {
    unsafe fn table_mut<'a>(
        &self,
        _level: TableLevel,
        _va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
    ) -> &'a mut PageTable {
        let ptr = frame.base().as_u64() as usize as *mut PageTable;
        unsafe { &mut *ptr }
    }
}

impl PhysicalWindow for IdentityTables {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_bytes_mut<'a>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [u8] {
        let ptr = pa.as_u64() as usize as *mut u8;
        unsafe { core::slice::from_raw_parts_mut(ptr, len) }
    }
}
