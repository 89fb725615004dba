use bitflags::bitflags;

bitflags! {
    /// Access rights requested for a mapping.
    ///
    /// Shared vocabulary of the page mapper and the image loader's segment
    /// placement. `READ` is implied by presence on x86-64; the absence of
    /// `EXECUTE` sets the no-execute bit.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct PagePermissions: u32 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;

        const RW = Self::READ.bits() | Self::WRITE.bits();
        const RX = Self::READ.bits() | Self::EXECUTE.bits();
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}
