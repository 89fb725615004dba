//! Bump allocator for the manager's own page tables during bring-up.

use kernel_memory_addresses::{PhysicalPage, Size4K};
use kernel_vmem::FrameAlloc;

/// Hands out `count` consecutive frames starting at `start`.
pub struct EarlyFrames {
    start: PhysicalPage<Size4K>,
    next: PhysicalPage<Size4K>,
    end: PhysicalPage<Size4K>,
}

impl EarlyFrames {
    #[must_use]
    pub const fn new(start: PhysicalPage<Size4K>, count: u64) -> Self {
        Self {
            start,
            next: start,
            end: start.add_pages(count),
        }
    }

    #[must_use]
    pub const fn start(&self) -> PhysicalPage<Size4K> {
        self.start
    }

    /// Frames handed out so far.
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.next.pages_since(self.start)
    }
}

impl FrameAlloc for EarlyFrames {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.next >= self.end {
            return None;
        }
        let frame = self.next;
        self.next = frame.add_pages(1);
        Some(frame)
    }
}
