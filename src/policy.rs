use bitflags::bitflags;

bitflags! {
    /// Halt behavior for a group.
    ///
    /// A group with no policy configured behaves as if `HALT_ON_ANY_ERROR`
    /// were set. A configured policy without that flag lets the group
    /// succeed past task errors; the errors still reach the error handler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Policy: u32 {
        /// The first observed task error becomes the group outcome and
        /// severs the chain.
        const HALT_ON_ANY_ERROR = 1;
        /// Declared extension point for deadline-based halting. No timer
        /// enforcement is implemented; the flag is inert.
        const HALT_AFTER_TIMEOUT = 1 << 1;
    }
}
