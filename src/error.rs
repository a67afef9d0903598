use thiserror::Error;

/// Errors reported by the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// No free block is large enough for the request
    #[error("out of memory: no free block can hold {requested} bytes")]
    OutOfMemory { requested: usize },

    /// The layout asks for more than word alignment
    #[error("unsupported alignment {align}")]
    LayoutUnsupported { align: usize },

    /// The offset does not name the payload of an allocated block
    #[error("offset {offset} is not an allocation of this arena")]
    ForeignAddress { offset: usize },

    /// The block is already on the free list
    #[error("block at {offset} released twice")]
    DoubleRelease { offset: usize },

    /// Walking the pool by block sizes does not end exactly at the pool end
    #[error("block chain broken at {offset}")]
    PartitionBroken { offset: usize },

    /// The free list is not in ascending address order
    #[error("free list out of order at {offset}")]
    UnorderedFreeList { offset: usize },

    /// Two free blocks touch without having been merged
    #[error("free block at {offset} is adjacent to its successor")]
    AdjacentFreeBlocks { offset: usize },

    /// A free block crosses the pool end
    #[error("free block at {offset} extends past the pool end")]
    FreeBlockOutsidePool { offset: usize },
}

pub type ArenaResult<T> = Result<T, ArenaError>;
