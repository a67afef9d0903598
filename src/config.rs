/// Size of the kernel heap pool in bytes
pub const POOL_SIZE: usize = 1024 * 1024;

/// Natural alignment unit of the pool
pub const WORD_SIZE: usize = size_of::<usize>();

/// What to do with the remainder of a free block when an allocation
/// consumes all of it except room for one header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitPolicy {
    /// Always split, even if the remainder carries zero payload bytes.
    /// Repeated exact fits can fill the free list with empty nodes.
    Preserve,
    /// Hand the header-sized tail to the allocation instead of keeping
    /// an empty free node around
    #[default]
    FoldEmptyRemainder,
}
