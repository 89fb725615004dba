//! # Kernel Image Loading
//!
//! The kernel arrives as an ELF64 executable in a boot module. Every
//! `PT_LOAD` segment gets fresh pages at its virtual address through
//! [`BootLoader::load_segment`]; file bytes are copied in, the rest of the
//! pages (`.bss` included) is zeroed.
//!
//! The whole image is validated before the first page is taken, so a rejected
//! image leaves the region table as it was. Segments must not share a page.

use crate::loader::BootLoader;
use crate::pager::PagerError;
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress, pages_for_bytes};
use kernel_vmem::{PagePermissions, PhysicalWindow, TableMapper};
use log::{error, info};
use xmas_elf::program::{ProgramHeader, ProgramHeader64, Type};
use xmas_elf::{ElfFile, header};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("kernel image is not 8-byte aligned")]
    Misaligned,
    #[error("kernel image is not a valid ELF file: {0}")]
    Elf(&'static str),
    #[error("kernel image is not a little-endian x86-64 ELF64 executable")]
    UnsupportedFormat,
    #[error("kernel image has no loadable segments")]
    NoSegments,
    #[error("segment at {va} does not fit the image file or the address space")]
    SegmentOutOfBounds { va: VirtualAddress },
    #[error("entry point {entry} is not inside an executable segment")]
    EntryOutsideImage { entry: VirtualAddress },
    #[error(transparent)]
    Pager(#[from] PagerError),
}

/// Where the loaded kernel lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KernelImage {
    pub entry: VirtualAddress,
    /// First byte past the highest segment.
    pub end: VirtualAddress,
    /// Number of segments placed.
    pub segments: usize,
}

/// One `PT_LOAD` segment, checked against the image it came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Segment {
    va: VirtualAddress,
    file_offset: usize,
    file_size: usize,
    mem_size: u64,
    perm: PagePermissions,
}

impl Segment {
    #[allow(clippy::cast_possible_truncation)]
    fn parse(ph: &ProgramHeader<'_>, image_len: usize) -> Result<Self, ImageError> {
        let va = VirtualAddress::new(ph.virtual_addr());
        let out_of_bounds = ImageError::SegmentOutOfBounds { va };

        let file_end = ph.offset().checked_add(ph.file_size()).ok_or(out_of_bounds)?;
        if file_end > image_len as u64
            || ph.file_size() > ph.mem_size()
            || ph.virtual_addr().checked_add(ph.mem_size()).is_none()
        {
            return Err(out_of_bounds);
        }

        let flags = ph.flags();
        let mut perm = PagePermissions::READ;
        perm.set(PagePermissions::WRITE, flags.is_write());
        perm.set(PagePermissions::EXECUTE, flags.is_execute());

        Ok(Self {
            va,
            file_offset: ph.offset() as usize,
            file_size: ph.file_size() as usize,
            mem_size: ph.mem_size(),
            perm,
        })
    }

    fn page_base(&self) -> VirtualAddress {
        self.va.page::<Size4K>().base()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn page_offset(&self) -> usize {
        self.va.offset::<Size4K>().as_u64() as usize
    }

    fn page_count(&self) -> u64 {
        pages_for_bytes::<Size4K>(self.page_offset() as u64 + self.mem_size)
    }

    fn end(&self) -> VirtualAddress {
        self.va + self.mem_size
    }

    fn contains(&self, va: VirtualAddress) -> bool {
        self.va <= va && va < self.end()
    }
}

fn parse(image: &[u8]) -> Result<ElfFile<'_>, ImageError> {
    if !image.as_ptr().cast::<u64>().is_aligned() {
        return Err(ImageError::Misaligned);
    }

    let elf = ElfFile::new(image).map_err(ImageError::Elf)?;
    let pt1 = elf.header.pt1;
    let pt2 = &elf.header.pt2;
    let supported = matches!(pt1.class(), header::Class::SixtyFour)
        && matches!(pt1.data(), header::Data::LittleEndian)
        && matches!(pt2.machine().as_machine(), header::Machine::X86_64)
        && matches!(pt2.type_().as_type(), header::Type::Executable);
    if !supported {
        return Err(ImageError::UnsupportedFormat);
    }

    let table_end = u64::from(pt2.ph_count())
        .checked_mul(u64::from(pt2.ph_entry_size()))
        .and_then(|len| len.checked_add(pt2.ph_offset()));
    if usize::from(pt2.ph_entry_size()) != size_of::<ProgramHeader64>()
        || !pt2.ph_offset().is_multiple_of(8)
        || table_end.is_none_or(|end| end > image.len() as u64)
    {
        return Err(ImageError::Elf("program header table out of bounds"));
    }

    Ok(elf)
}

/// Every loadable segment of `elf`, in program header order.
fn segments<'e>(elf: &'e ElfFile<'_>) -> impl Iterator<Item = Result<Segment, ImageError>> + 'e {
    (0..elf.header.pt2.ph_count()).filter_map(move |index| match elf.program_header(index) {
        Err(e) => Some(Err(ImageError::Elf(e))),
        Ok(ph) if !matches!(ph.get_type(), Ok(Type::Load)) || ph.mem_size() == 0 => None,
        Ok(ph) => Some(Segment::parse(&ph, elf.input.len())),
    })
}

impl<M: TableMapper + PhysicalWindow, const N: usize> BootLoader<'_, M, N> {
    /// Place the ELF64 kernel `image` at its link addresses.
    ///
    /// `image` must be 8-byte aligned. Segment pages are recorded as
    /// allocated in the region table.
    ///
    /// # Errors
    /// - [`ImageError::Misaligned`], [`ImageError::Elf`],
    ///   [`ImageError::UnsupportedFormat`] if `image` is not a usable ELF.
    /// - [`ImageError::NoSegments`], [`ImageError::SegmentOutOfBounds`],
    ///   [`ImageError::EntryOutsideImage`] if its program headers are
    ///   inconsistent. Nothing is allocated in these cases.
    /// - [`ImageError::Pager`] if backing a segment fails, including when two
    ///   segments share a page. Segments placed before stay mapped.
    pub fn load_kernel(&mut self, image: &[u8]) -> Result<KernelImage, ImageError> {
        self.try_load_kernel(image)
            .inspect_err(|e| error!("Kernel image rejected: {e}"))
    }

    fn try_load_kernel(&mut self, image: &[u8]) -> Result<KernelImage, ImageError> {
        let elf = parse(image)?;
        let entry = VirtualAddress::new(elf.header.pt2.entry_point());

        let mut count = 0;
        let mut end = VirtualAddress::new(0);
        let mut entry_found = false;
        for segment in segments(&elf) {
            let segment = segment?;
            count += 1;
            end = end.max(segment.end());
            entry_found |= segment.perm.contains(PagePermissions::EXECUTE) && segment.contains(entry);
        }
        if count == 0 {
            return Err(ImageError::NoSegments);
        }
        if !entry_found {
            return Err(ImageError::EntryOutsideImage { entry });
        }

        for segment in segments(&elf) {
            self.place(&segment?, image)?;
        }

        info!("Kernel image loaded: {count} segments, entry {entry}, end {end}");
        Ok(KernelImage {
            entry,
            end,
            segments: count,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn place(&mut self, segment: &Segment, image: &[u8]) -> Result<(), ImageError> {
        let pages = segment.page_count();
        let phys = self.load_segment(segment.page_base(), pages, segment.perm)?;

        // Freshly allocated and reserved, nothing else refers to it.
        let backing = unsafe {
            self.pager()
                .tables()
                .phys_bytes_mut(phys, (pages * Size4K::SIZE) as usize)
        };
        backing.fill(0);

        let at = segment.page_offset();
        let file = segment.file_offset..segment.file_offset + segment.file_size;
        backing[at..at + segment.file_size].copy_from_slice(&image[file]);

        info!(
            "  {} +{:#x} ({:?}) at {phys}",
            segment.va, segment.mem_size, segment.perm
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pager::PagingMode;
    use bootmem::BootstrapAllocator;
    use kernel_info::boot::BootRegionType;
    use kernel_memory_addresses::PhysicalAddress;
    use kernel_vmem::MapError;
    use kernel_vmem::testing::SimulatedMachine;

    pub const PF_X: u32 = 1;
    pub const PF_W: u32 = 2;
    pub const PF_R: u32 = 4;

    const SIM_BASE: u64 = 0x10_0000;
    const KERNEL_VA: u64 = 0xFFFF_FFFF_8000_0000;

    /// Image bytes stored 8-byte aligned, the way boot modules are placed.
    pub struct ImageBytes {
        words: Vec<u64>,
        len: usize,
    }

    impl ImageBytes {
        pub fn new(bytes: &[u8]) -> Self {
            let words = bytes
                .chunks(8)
                .map(|chunk| {
                    let mut word = [0; 8];
                    word[..chunk.len()].copy_from_slice(chunk);
                    u64::from_le_bytes(word)
                })
                .collect();
            Self {
                words,
                len: bytes.len(),
            }
        }

        pub fn as_bytes(&self) -> &[u8] {
            unsafe { core::slice::from_raw_parts(self.words.as_ptr().cast(), self.len) }
        }

        pub fn truncated(mut self, len: usize) -> Self {
            self.len = self.len.min(len);
            self
        }
    }

    /// Assembles a minimal ELF64 executable without section headers.
    pub struct ElfBuilder {
        entry: u64,
        machine: u16,
        segments: Vec<(u64, u32, Vec<u8>, u64)>,
    }

    impl ElfBuilder {
        pub fn new(entry: u64) -> Self {
            Self {
                entry,
                machine: 62,
                segments: Vec::new(),
            }
        }

        pub fn machine(mut self, machine: u16) -> Self {
            self.machine = machine;
            self
        }

        pub fn segment(mut self, vaddr: u64, flags: u32, data: &[u8], mem_size: u64) -> Self {
            self.segments.push((vaddr, flags, data.to_vec(), mem_size));
            self
        }

        pub fn build(&self) -> ImageBytes {
            let phnum = u16::try_from(self.segments.len()).expect("segment count");
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
            bytes.extend_from_slice(&[0; 8]);
            bytes.extend_from_slice(&2u16.to_le_bytes());
            bytes.extend_from_slice(&self.machine.to_le_bytes());
            bytes.extend_from_slice(&1u32.to_le_bytes());
            bytes.extend_from_slice(&self.entry.to_le_bytes());
            bytes.extend_from_slice(&64u64.to_le_bytes());
            bytes.extend_from_slice(&0u64.to_le_bytes());
            bytes.extend_from_slice(&0u32.to_le_bytes());
            bytes.extend_from_slice(&64u16.to_le_bytes());
            bytes.extend_from_slice(&56u16.to_le_bytes());
            bytes.extend_from_slice(&phnum.to_le_bytes());
            bytes.extend_from_slice(&64u16.to_le_bytes());
            bytes.extend_from_slice(&0u16.to_le_bytes());
            bytes.extend_from_slice(&0u16.to_le_bytes());
            assert_eq!(bytes.len(), 64);

            let mut offset = (64 + 56 * self.segments.len()).next_multiple_of(16);
            for (vaddr, flags, data, mem_size) in &self.segments {
                bytes.extend_from_slice(&1u32.to_le_bytes());
                bytes.extend_from_slice(&flags.to_le_bytes());
                bytes.extend_from_slice(&(offset as u64).to_le_bytes());
                bytes.extend_from_slice(&vaddr.to_le_bytes());
                bytes.extend_from_slice(&vaddr.to_le_bytes());
                bytes.extend_from_slice(&(data.len() as u64).to_le_bytes());
                bytes.extend_from_slice(&mem_size.to_le_bytes());
                bytes.extend_from_slice(&0x1000u64.to_le_bytes());
                offset += data.len().next_multiple_of(16);
            }

            for (_, _, data, _) in &self.segments {
                bytes.resize(bytes.len().next_multiple_of(16), 0);
                bytes.extend_from_slice(data);
            }
            ImageBytes::new(&bytes)
        }
    }

    fn machine() -> (SimulatedMachine, BootstrapAllocator<32>) {
        let sim = SimulatedMachine::new(PhysicalAddress::new(SIM_BASE), 64);
        let mut regions = BootstrapAllocator::new();
        regions
            .add_region(BootRegionType::Available, sim.base(), sim.end())
            .expect("sim memory");
        (sim, regions)
    }

    #[test]
    fn segments_are_copied_and_the_rest_is_zeroed() {
        let (sim, mut regions) = machine();
        let all = usize::try_from(sim.end() - sim.base()).expect("size");
        unsafe { sim.phys_bytes_mut(sim.base(), all) }.fill(0xAA);

        let text: Vec<u8> = (0..=250u8).cycle().take(0x1800).collect();
        let image = ElfBuilder::new(KERNEL_VA + 0x10)
            .segment(KERNEL_VA, PF_R | PF_X, &text, 0x1800)
            .segment(KERNEL_VA + 0x2000, PF_R | PF_W, b"data", 0x1200)
            .build();

        let mut loader =
            BootLoader::new(&mut regions, sim.tables(), PagingMode::Long64).expect("loader");
        let kernel = loader.load_kernel(image.as_bytes()).expect("kernel");
        assert_eq!(
            kernel,
            KernelImage {
                entry: VirtualAddress::new(KERNEL_VA + 0x10),
                end: VirtualAddress::new(KERNEL_VA + 0x3200),
                segments: 2,
            }
        );

        let root = loader.pager().describe_bootstrap().page();
        let read = |va: u64, len: usize| {
            let pa = sim.translate(root, VirtualAddress::new(va)).expect("mapped");
            unsafe { sim.phys_bytes_mut(pa, len) }.to_vec()
        };
        assert_eq!(read(KERNEL_VA, 0x1000), &text[..0x1000]);
        assert_eq!(read(KERNEL_VA + 0x1000, 0x800), &text[0x1000..]);
        assert!(read(KERNEL_VA + 0x1800, 0x800).iter().all(|&b| b == 0));
        assert_eq!(read(KERNEL_VA + 0x2000, 4), b"data");
        assert!(read(KERNEL_VA + 0x2004, 0xFFC).iter().all(|&b| b == 0));
        assert!(read(KERNEL_VA + 0x3000, 0x1000).iter().all(|&b| b == 0));

        let text_leaf = sim.walk(root, VirtualAddress::new(KERNEL_VA)).expect("text");
        assert!(!text_leaf.writable());
        assert!(!text_leaf.no_execute());
        let data_leaf = sim.walk(root, VirtualAddress::new(KERNEL_VA + 0x3000)).expect("bss");
        assert!(data_leaf.writable());
        assert!(data_leaf.no_execute());

        assert_eq!(
            loader.regions().total_bytes(BootRegionType::Allocated),
            4 * Size4K::SIZE
        );
    }

    #[test]
    fn unaligned_segment_start_keeps_its_page_offset() {
        let (sim, mut regions) = machine();
        let image = ElfBuilder::new(KERNEL_VA + 0x123)
            .segment(KERNEL_VA + 0x123, PF_R | PF_X, &[0xC3; 0x20], 0x20)
            .build();

        let mut loader =
            BootLoader::new(&mut regions, sim.tables(), PagingMode::Long64).expect("loader");
        loader.load_kernel(image.as_bytes()).expect("kernel");

        let root = loader.pager().describe_bootstrap().page();
        let pa = sim
            .translate(root, VirtualAddress::new(KERNEL_VA + 0x123))
            .expect("mapped");
        assert_eq!(pa.as_u64() & 0xFFF, 0x123);
        assert_eq!(unsafe { sim.phys_bytes_mut(pa, 0x20) }, &[0xC3u8; 0x20]);
    }

    #[test]
    fn segments_sharing_a_page_are_rejected() {
        let (sim, mut regions) = machine();
        let image = ElfBuilder::new(KERNEL_VA)
            .segment(KERNEL_VA, PF_R | PF_X, &[0x90; 0x800], 0x800)
            .segment(KERNEL_VA + 0x800, PF_R | PF_W, &[1; 0x10], 0x10)
            .build();

        let mut loader =
            BootLoader::new(&mut regions, sim.tables(), PagingMode::Long64).expect("loader");
        assert!(matches!(
            loader.load_kernel(image.as_bytes()),
            Err(ImageError::Pager(PagerError::Map(MapError::AlreadyMapped { va, .. })))
                if va == VirtualAddress::new(KERNEL_VA)
        ));
    }

    #[test]
    fn inconsistent_images_allocate_nothing() {
        let (sim, mut regions) = machine();
        let mut loader =
            BootLoader::new(&mut regions, sim.tables(), PagingMode::Long64).expect("loader");

        let entry_outside = ElfBuilder::new(KERNEL_VA + 0x5000)
            .segment(KERNEL_VA, PF_R | PF_X, &[0x90; 16], 0x1000)
            .build();
        assert_eq!(
            loader.load_kernel(entry_outside.as_bytes()),
            Err(ImageError::EntryOutsideImage {
                entry: VirtualAddress::new(KERNEL_VA + 0x5000)
            })
        );

        let entry_in_data = ElfBuilder::new(KERNEL_VA)
            .segment(KERNEL_VA, PF_R | PF_W, &[0; 16], 0x1000)
            .build();
        assert!(matches!(
            loader.load_kernel(entry_in_data.as_bytes()),
            Err(ImageError::EntryOutsideImage { .. })
        ));

        let cut = ElfBuilder::new(KERNEL_VA)
            .segment(KERNEL_VA, PF_R | PF_X, &[0x90; 0x100], 0x100)
            .build()
            .truncated(0x100);
        assert_eq!(
            loader.load_kernel(cut.as_bytes()),
            Err(ImageError::SegmentOutOfBounds {
                va: VirtualAddress::new(KERNEL_VA)
            })
        );

        let empty = ElfBuilder::new(KERNEL_VA).build();
        assert_eq!(
            loader.load_kernel(empty.as_bytes()),
            Err(ImageError::NoSegments)
        );

        assert_eq!(loader.regions().total_bytes(BootRegionType::Allocated), 0);
    }

    #[test]
    fn foreign_or_garbled_files_are_refused() {
        let (sim, mut regions) = machine();
        let mut loader =
            BootLoader::new(&mut regions, sim.tables(), PagingMode::Long64).expect("loader");

        let arm = ElfBuilder::new(KERNEL_VA)
            .machine(40)
            .segment(KERNEL_VA, PF_R | PF_X, &[0; 16], 16)
            .build();
        assert_eq!(
            loader.load_kernel(arm.as_bytes()),
            Err(ImageError::UnsupportedFormat)
        );

        let zeros = ImageBytes::new(&[0; 128]);
        assert!(matches!(
            loader.load_kernel(zeros.as_bytes()),
            Err(ImageError::Elf(_))
        ));

        let image = ElfBuilder::new(KERNEL_VA)
            .segment(KERNEL_VA, PF_R | PF_X, &[0; 16], 16)
            .build();
        assert_eq!(
            loader.load_kernel(&image.as_bytes()[1..]),
            Err(ImageError::Misaligned)
        );
    }
}
