//! Block metadata laid over the pool.
//!
//! Every block starts with a two-word header: the payload size, then the
//! offset of the next free block. The link word is only meaningful while the
//! block sits on the free list.

use crate::{config::WORD_SIZE, pool::Pool};

pub const HEADER_SIZE: usize = 2 * WORD_SIZE;

/// Link word value for "no successor"
pub(crate) const NIL: usize = usize::MAX;

/// Offset of a block header within the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockOffset(usize);

impl BlockOffset {
    pub const fn new(offset: usize) -> Self {
        BlockOffset(offset)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    /// Offset of the first payload byte
    pub const fn payload(self) -> usize {
        self.0 + HEADER_SIZE
    }

    /// Offset one past the last byte of a block with `size` payload bytes
    pub const fn end(self, size: usize) -> usize {
        self.0 + HEADER_SIZE + size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub size: usize,
    pub next: Option<BlockOffset>,
}

impl Header {
    pub(crate) fn read<const N: usize>(pool: &Pool<N>, at: BlockOffset) -> Header {
        Header {
            size: read_size(pool, at),
            next: decode(pool.read_word(at.get() + WORD_SIZE)),
        }
    }

    pub(crate) fn write<const N: usize>(self, pool: &mut Pool<N>, at: BlockOffset) {
        debug_assert!(
            at.end(self.size) <= N,
            "header at {} with size {} crosses pool end {N}",
            at.get(),
            self.size
        );
        write_size(pool, at, self.size);
        write_next(pool, at, self.next);
    }
}

pub(crate) fn read_size<const N: usize>(pool: &Pool<N>, at: BlockOffset) -> usize {
    pool.read_word(at.get())
}

pub(crate) fn write_size<const N: usize>(pool: &mut Pool<N>, at: BlockOffset, size: usize) {
    pool.write_word(at.get(), size)
}

pub(crate) fn write_next<const N: usize>(
    pool: &mut Pool<N>,
    at: BlockOffset,
    next: Option<BlockOffset>,
) {
    pool.write_word(at.get() + WORD_SIZE, next.map_or(NIL, BlockOffset::get))
}

fn decode(word: usize) -> Option<BlockOffset> {
    (word != NIL).then_some(BlockOffset(word))
}

/// An allocation held by a caller
///
/// Not `Clone`: releasing consumes the handle. Each handle also carries the
/// arena generation it was issued in, so a handle that outlived
/// `Arena::initialize` is ignored on release. Passing a handle to an arena
/// other than the one that issued it is a caller error.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a handle leaks its block"]
pub struct Handle {
    offset: usize,
    size: usize,
    generation: usize,
}

impl Handle {
    pub(crate) fn new(block: BlockOffset, size: usize, generation: usize) -> Self {
        Handle {
            offset: block.payload(),
            size,
            generation,
        }
    }

    pub(crate) fn generation(&self) -> usize {
        self.generation
    }

    /// Payload offset within the pool; stable until the handle is released
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Usable bytes, at least the requested size
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn header(&self) -> BlockOffset {
        BlockOffset(self.offset - HEADER_SIZE)
    }
}
