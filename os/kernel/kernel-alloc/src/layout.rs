use crate::bitmap;
use crate::region::{KernelRegionType, RegionDescriptor, combine};
use kernel_info::boot::BootRegion;
use kernel_info::memory::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{PageSize, Size4K, pages_for_bytes};

/// Sizes of the manager's metadata for a given handoff.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MetadataLayout {
    pub region_count: usize,
    /// Bitmap bytes, one whole-byte run per available region.
    pub bitmap_bytes: usize,
    /// Offset of the descriptor array from the start of the metadata.
    pub descriptors_offset: usize,
    /// Pages holding bitmap and descriptors.
    pub metadata_pages: u64,
    /// Worst-case interior tables needed to map the metadata.
    pub table_frames: u64,
}

impl MetadataLayout {
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn for_regions(regions: &[BootRegion]) -> Self {
        let (region_count, bitmap_bytes) =
            combine(regions).fold((0usize, 0u64), |(count, bytes), range| {
                let own = if range.kind == KernelRegionType::Available {
                    bitmap::bytes_for(range.pages())
                } else {
                    0
                };
                (count + 1, bytes + own)
            });

        let bitmap_bytes = bitmap_bytes as usize;
        let descriptors_offset = bitmap_bytes.next_multiple_of(align_of::<RegionDescriptor>());
        let total = descriptors_offset + region_count * size_of::<RegionDescriptor>();
        let metadata_pages = pages_for_bytes::<Size4K>(total as u64);

        Self {
            region_count,
            bitmap_bytes,
            descriptors_offset,
            metadata_pages,
            table_frames: worst_case_table_frames(metadata_pages),
        }
    }

    /// Pages the metadata host must provide.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.metadata_pages + self.table_frames
    }

    #[must_use]
    pub const fn required_bytes(&self) -> u64 {
        self.total_pages() * Size4K::SIZE
    }
}

/// Interior tables needed to map `pages` consecutive pages anywhere.
///
/// Each level may straddle one more table than the division suggests.
#[must_use]
pub const fn worst_case_table_frames(pages: u64) -> u64 {
    let per_table = ENTRIES_PER_TABLE as u64;
    let pt = pages.div_ceil(per_table) + 1;
    let pd = pt.div_ceil(per_table) + 1;
    let pdpt = pd.div_ceil(per_table) + 1;
    pt + pd + pdpt
}
