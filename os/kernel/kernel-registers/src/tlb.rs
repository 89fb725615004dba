//! Translation cache maintenance.

use kernel_memory_addresses::VirtualAddress;

/// Drop any cached translation for the page containing `va` on this CPU.
///
/// # Safety
/// Requires ring 0. Only affects the executing CPU.
#[inline]
pub unsafe fn invlpg(va: VirtualAddress) {
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u64(), options(nostack, preserves_flags));
    }
}
