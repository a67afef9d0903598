use core::alloc::Layout;

use log::{debug, trace, warn};

use crate::{
    config::{POOL_SIZE, SplitPolicy, WORD_SIZE},
    error::{ArenaError, ArenaResult},
    free_list::{FreeBlocks, FreeList},
    header::{self, BlockOffset, HEADER_SIZE, Handle, Header, NIL},
    pool::Pool,
};

/// First-fit allocator over a fixed pool of `N` bytes
///
/// Free blocks form an address-ordered list threaded through their headers.
/// Allocation splits the first block that fits; release puts the block back
/// in order and merges it with free neighbours on either side.
///
/// The arena does no locking of its own. Wrap it in a
/// [`LockedArena`](crate::locked::LockedArena) to share it.
pub struct Arena<const N: usize = POOL_SIZE> {
    pool: Pool<N>,
    free: FreeList,
    policy: SplitPolicy,
    /// Bumped by `initialize`; handles from an older generation are stale
    generation: usize,
}

/// What an allocation did to the free block it took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Split {
    Whole,
    Remainder { at: BlockOffset, size: usize },
}

/// What a release did to the free list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Released {
    /// The block is now part of the free block `into` of `size` bytes
    Freed {
        block: BlockOffset,
        into: BlockOffset,
        size: usize,
        merged_back: bool,
        merged_forward: bool,
    },
    /// The block lies on or inside a block that is already free
    AlreadyFree { block: BlockOffset },
    /// The handle was issued before the arena was last initialized
    Stale { block: BlockOffset },
}

impl Released {
    pub(crate) fn log(&self) {
        match *self {
            Released::Freed {
                block,
                into,
                size,
                merged_back,
                merged_forward,
            } => trace!(
                "release {}: free block {} now {} bytes (merged back: {}, forward: {})",
                block.get(),
                into.get(),
                size,
                merged_back,
                merged_forward
            ),
            Released::AlreadyFree { block } => {
                warn!("ignored release of block {}: already free", block.get())
            }
            Released::Stale { block } => {
                warn!("ignored release of block {}: handle predates initialize", block.get())
            }
        }
    }
}

pub(crate) fn log_allocation(size: usize, outcome: &ArenaResult<(Handle, Split)>) {
    match outcome {
        Ok((handle, Split::Whole)) => trace!(
            "allocate {}: took block {} whole ({} bytes)",
            size,
            handle.header().get(),
            handle.size()
        ),
        Ok((handle, Split::Remainder { at, size: leftover })) => trace!(
            "allocate {}: block {}, remainder {} ({} bytes)",
            size,
            handle.header().get(),
            at.get(),
            leftover
        ),
        Err(err) => warn!("allocate {} failed: {}", size, err),
    }
}

/// Request size for `layout`, rounded up to a whole word
pub(crate) fn layout_size(layout: Layout) -> ArenaResult<usize> {
    if layout.align() > WORD_SIZE {
        return Err(ArenaError::LayoutUnsupported {
            align: layout.align(),
        });
    }
    layout
        .size()
        .checked_next_multiple_of(WORD_SIZE)
        .ok_or(ArenaError::OutOfMemory {
            requested: layout.size(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Allocated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: BlockOffset,
    pub size: usize,
    pub state: BlockState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    pub capacity: usize,
    pub free_bytes: usize,
    pub free_blocks: usize,
    pub largest_free: usize,
    pub allocated_bytes: usize,
    pub allocated_blocks: usize,
}

impl<const N: usize> Default for Arena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Arena<N> {
    /// Creates an initialized arena: one free block spanning the pool
    pub const fn new() -> Self {
        Self::with_policy(SplitPolicy::FoldEmptyRemainder)
    }

    pub const fn with_policy(policy: SplitPolicy) -> Self {
        const {
            assert!(N >= HEADER_SIZE, "pool cannot hold a single header");
        }

        Arena {
            pool: Pool::with_prefix(&[N - HEADER_SIZE, NIL]),
            free: FreeList::new(Some(BlockOffset::new(0))),
            policy,
            generation: 0,
        }
    }

    /// Resets the arena to a single free block covering the whole pool.
    /// Every outstanding handle becomes invalid.
    pub fn initialize(&mut self) {
        let first = BlockOffset::new(0);
        Header {
            size: self.capacity(),
            next: None,
        }
        .write(&mut self.pool, first);
        self.free = FreeList::new(Some(first));
        self.generation = self.generation.wrapping_add(1);

        debug!("arena initialized: {} bytes, {} usable", N, self.capacity());
    }

    pub fn policy(&self) -> SplitPolicy {
        self.policy
    }

    /// Payload bytes of the initial free block
    pub const fn capacity(&self) -> usize {
        N - HEADER_SIZE
    }

    /// Allocates `size` bytes from the first free block that fits
    ///
    /// A block qualifies only if it can also hold the header of the
    /// remainder split off behind the allocation.
    pub fn allocate(&mut self, size: usize) -> ArenaResult<Handle> {
        let outcome = self.allocate_quiet(size);
        log_allocation(size, &outcome);

        outcome.map(|(handle, _)| handle)
    }

    /// [`allocate`](Self::allocate) without logging, so a lock holder can
    /// log after unlocking
    pub(crate) fn allocate_quiet(&mut self, size: usize) -> ArenaResult<(Handle, Split)> {
        let needed = size
            .checked_add(HEADER_SIZE)
            .ok_or(ArenaError::OutOfMemory { requested: size })?;

        let (prev, block, found) = self
            .free
            .find_first_fit(&self.pool, needed)
            .ok_or(ArenaError::OutOfMemory { requested: size })?;

        let leftover = found.size - needed;
        if leftover == 0 && self.policy == SplitPolicy::FoldEmptyRemainder {
            self.free.relink(&mut self.pool, prev, found.next);

            return Ok((Handle::new(block, found.size, self.generation), Split::Whole));
        }

        let remainder = BlockOffset::new(block.end(size));
        Header {
            size: leftover,
            next: found.next,
        }
        .write(&mut self.pool, remainder);
        self.free.relink(&mut self.pool, prev, Some(remainder));
        header::write_size(&mut self.pool, block, size);

        Ok((
            Handle::new(block, size, self.generation),
            Split::Remainder {
                at: remainder,
                size: leftover,
            },
        ))
    }

    /// Like [`allocate`](Self::allocate), with the payload zeroed
    pub fn allocate_zeroed(&mut self, size: usize) -> ArenaResult<Handle> {
        let handle = self.allocate(size)?;
        self.pool.fill(handle.offset(), handle.size(), 0);

        Ok(handle)
    }

    /// Allocates for a `Layout`, rounding the size up to a whole word
    ///
    /// Payloads stay word aligned as long as every allocation in the arena
    /// goes through this path.
    pub fn allocate_layout(&mut self, layout: Layout) -> ArenaResult<Handle> {
        self.allocate(layout_size(layout)?)
    }

    /// Returns a block to the free list, merging it with free neighbours
    ///
    /// Handles issued before the last [`initialize`](Self::initialize) are
    /// ignored.
    pub fn release(&mut self, handle: Handle) {
        let released = if handle.generation() == self.generation {
            self.release_block(handle.header())
        } else {
            Released::Stale {
                block: handle.header(),
            }
        };
        released.log();
    }

    /// Releases the allocation whose payload starts at `offset`
    ///
    /// Unlike [`release`](Self::release) this verifies that `offset` names a
    /// live allocation by walking the pool.
    pub fn try_release(&mut self, offset: usize) -> ArenaResult<()> {
        let found = offset
            .checked_sub(HEADER_SIZE)
            .map(BlockOffset::new)
            .and_then(|block| self.blocks().find(|info| info.offset >= block))
            .filter(|info| info.offset.payload() == offset);

        match found {
            Some(BlockInfo {
                state: BlockState::Allocated,
                offset: block,
                ..
            }) => {
                self.release_block(block).log();
                Ok(())
            }
            Some(BlockInfo {
                state: BlockState::Free,
                ..
            }) => {
                warn!("rejected release of free block at {}", offset);
                Err(ArenaError::DoubleRelease { offset })
            }
            None => {
                warn!("rejected release of foreign offset {}", offset);
                Err(ArenaError::ForeignAddress { offset })
            }
        }
    }

    /// Release by payload offset without validation or logging
    pub(crate) fn release_at(&mut self, offset: usize) -> Released {
        debug_assert!(
            (HEADER_SIZE..=N).contains(&offset),
            "release of offset {offset} outside the pool"
        );
        self.release_block(BlockOffset::new(offset - HEADER_SIZE))
    }

    fn release_block(&mut self, block: BlockOffset) -> Released {
        let size = header::read_size(&self.pool, block);
        debug_assert!(block.end(size) <= N, "released block crosses pool end");

        let (prev, next) = self.free.insertion_point(&self.pool, block);
        let prev_size = prev.map(|prev| header::read_size(&self.pool, prev));

        // linking a block that is already free would close a cycle
        let inside_prev = prev
            .zip(prev_size)
            .is_some_and(|(prev, prev_size)| prev.end(prev_size) > block.get());
        if next == Some(block) || inside_prev {
            return Released::AlreadyFree { block };
        }

        header::write_next(&mut self.pool, block, next);
        self.free.relink(&mut self.pool, prev, Some(block));

        let mut current = block;
        let mut current_size = size;
        let mut merged_back = false;
        let mut merged_forward = false;

        if let Some((prev, prev_size)) = prev.zip(prev_size) {
            if prev.end(prev_size) == block.get() {
                current_size = prev_size + HEADER_SIZE + size;
                header::write_size(&mut self.pool, prev, current_size);
                header::write_next(&mut self.pool, prev, next);
                current = prev;
                merged_back = true;
            }
        }

        if let Some(next) = next {
            if current.end(current_size) == next.get() {
                let absorbed = Header::read(&self.pool, next);
                current_size += HEADER_SIZE + absorbed.size;
                header::write_size(&mut self.pool, current, current_size);
                header::write_next(&mut self.pool, current, absorbed.next);
                merged_forward = true;
            }
        }

        Released::Freed {
            block,
            into: current,
            size: current_size,
            merged_back,
            merged_forward,
        }
    }

    pub fn payload(&self, handle: &Handle) -> &[u8] {
        self.pool.bytes(handle.offset(), handle.size())
    }

    pub fn payload_mut(&mut self, handle: &Handle) -> &mut [u8] {
        self.pool.bytes_mut(handle.offset(), handle.size())
    }

    pub(crate) fn payload_ptr(&self, handle: &Handle) -> *mut u8 {
        self.pool.base_ptr().wrapping_add(handle.offset())
    }

    pub(crate) fn offset_of(&self, ptr: *const u8) -> usize {
        ptr.addr().wrapping_sub(self.pool.base_ptr().addr())
    }

    /// Free blocks in address order
    pub fn free_list(&self) -> FreeBlocks<'_, N> {
        self.free.iter(&self.pool)
    }

    pub fn free_bytes(&self) -> usize {
        self.free_list().map(|(_, h)| h.size).sum()
    }

    pub fn free_blocks(&self) -> usize {
        self.free_list().count()
    }

    pub fn largest_free(&self) -> usize {
        self.free_list().map(|(_, h)| h.size).max().unwrap_or(0)
    }

    /// Every block in the pool, walked from offset zero by recorded sizes
    pub fn blocks(&self) -> Blocks<'_, N> {
        Blocks {
            pool: &self.pool,
            cursor: 0,
            free: self.free.head(),
        }
    }

    pub fn stats(&self) -> ArenaStats {
        self.blocks().fold(
            ArenaStats {
                capacity: self.capacity(),
                ..ArenaStats::default()
            },
            |mut stats, block| {
                match block.state {
                    BlockState::Free => {
                        stats.free_bytes += block.size;
                        stats.free_blocks += 1;
                        stats.largest_free = stats.largest_free.max(block.size);
                    }
                    BlockState::Allocated => {
                        stats.allocated_bytes += block.size;
                        stats.allocated_blocks += 1;
                    }
                }
                stats
            },
        )
    }

    /// Verifies the free list and the block chain
    ///
    /// The free list must be strictly ascending, stay inside the pool and
    /// hold no two touching blocks. Walking the pool by block sizes must end
    /// exactly at the pool end and pass through every free block.
    pub fn check_invariants(&self) -> ArenaResult<()> {
        let mut prev_end = None;
        let mut prev_offset = None;
        for (block, header) in self.free_list() {
            let offset = block.get();
            if offset > N - HEADER_SIZE || header.size > N - HEADER_SIZE - offset {
                return Err(ArenaError::FreeBlockOutsidePool { offset });
            }
            if prev_offset.is_some_and(|prev| prev >= offset) {
                return Err(ArenaError::UnorderedFreeList { offset });
            }
            if prev_end == Some(offset) {
                return Err(ArenaError::AdjacentFreeBlocks {
                    offset: prev_offset.unwrap_or(offset),
                });
            }
            prev_offset = Some(offset);
            prev_end = Some(block.end(header.size));
        }

        let mut cursor = 0;
        let mut free = self.free.head();
        while cursor < N {
            if cursor > N - HEADER_SIZE {
                return Err(ArenaError::PartitionBroken { offset: cursor });
            }
            let block = BlockOffset::new(cursor);
            let size = header::read_size(&self.pool, block);
            if size > N - HEADER_SIZE - cursor {
                return Err(ArenaError::PartitionBroken { offset: cursor });
            }
            if free == Some(block) {
                free = Header::read(&self.pool, block).next;
            }
            cursor = block.end(size);
        }

        match free {
            Some(stray) => Err(ArenaError::PartitionBroken {
                offset: stray.get(),
            }),
            None => Ok(()),
        }
    }
}

/// Iterator over every block of the pool in address order
///
/// Relies on the block chain being intact; stops at the first header that
/// would cross the pool end.
pub struct Blocks<'a, const N: usize> {
    pool: &'a Pool<N>,
    cursor: usize,
    free: Option<BlockOffset>,
}

impl<const N: usize> Iterator for Blocks<'_, N> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.cursor >= N || N - self.cursor < HEADER_SIZE {
            return None;
        }
        let offset = BlockOffset::new(self.cursor);
        let size = header::read_size(self.pool, offset);
        if size > N - HEADER_SIZE - self.cursor {
            self.cursor = N;
            return None;
        }

        let state = if self.free == Some(offset) {
            self.free = Header::read(self.pool, offset).next;
            BlockState::Free
        } else {
            BlockState::Allocated
        };
        self.cursor = offset.end(size);

        Some(BlockInfo {
            offset,
            size,
            state,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const USABLE: usize = 1024;
    const N: usize = USABLE + HEADER_SIZE;

    fn free_list(arena: &Arena<N>) -> Vec<(usize, usize)> {
        arena
            .free_list()
            .map(|(block, header)| (block.get(), header.size))
            .collect()
    }

    #[test]
    fn starts_with_one_free_block() {
        let arena = Arena::<N>::new();
        assert_eq!(free_list(&arena), [(0, USABLE)]);
        assert_eq!(arena.capacity(), USABLE);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn initialize_resets() {
        let mut arena = Arena::<N>::new();
        let _a = arena.allocate(100).unwrap();
        let _b = arena.allocate(200).unwrap();

        arena.initialize();
        assert_eq!(free_list(&arena), [(0, USABLE)]);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn alloc_chunks() {
        let mut arena = Arena::<N>::new();

        let chunk = arena.allocate(16).unwrap();
        arena.release(chunk);

        let one = arena.allocate(16).unwrap();
        let two = arena.allocate(16).unwrap();
        let three = arena.allocate(16).unwrap();
        assert!(one.offset() < two.offset() && two.offset() < three.offset());

        arena.release(three);
        arena.release(one);
        arena.release(two);

        assert_eq!(free_list(&arena), [(0, USABLE)]);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn split_and_merge_scenario() {
        let mut arena = Arena::<N>::new();

        let a = arena.allocate(100).unwrap();
        let a_offset = a.offset();
        assert_eq!(a_offset, HEADER_SIZE);
        assert_eq!(free_list(&arena), [(100 + HEADER_SIZE, USABLE - 100 - HEADER_SIZE)]);

        let b = arena.allocate(50).unwrap();
        assert!(b.offset() > a_offset);
        let tail = 150 + 2 * HEADER_SIZE;
        assert_eq!(free_list(&arena), [(tail, USABLE - 150 - 2 * HEADER_SIZE)]);

        // b sits between a and the tail, so nothing merges yet
        arena.release(a);
        assert_eq!(
            free_list(&arena),
            [(0, 100), (tail, USABLE - 150 - 2 * HEADER_SIZE)]
        );
        arena.check_invariants().unwrap();

        // b touches both free neighbours and two headers are reclaimed
        arena.release(b);
        assert_eq!(free_list(&arena), [(0, USABLE)]);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn merge_backward_only() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let _c = arena.allocate(64).unwrap();

        arena.release(a);
        arena.release(b);
        assert_eq!(
            free_list(&arena),
            [(0, 128 + HEADER_SIZE), (3 * (64 + HEADER_SIZE), USABLE - 3 * (64 + HEADER_SIZE))]
        );
        arena.check_invariants().unwrap();
    }

    #[test]
    fn merge_forward_only() {
        let mut arena = Arena::<N>::new();
        let _a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let c = arena.allocate(64).unwrap();
        let _d = arena.allocate(64).unwrap();

        arena.release(c);
        arena.release(b);
        let b_block = 64 + HEADER_SIZE;
        assert_eq!(free_list(&arena)[0], (b_block, 128 + HEADER_SIZE));
        assert_eq!(arena.free_blocks(), 2);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn first_fit_reuses_hole() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(200).unwrap();
        let _b = arena.allocate(32).unwrap();
        let a_offset = a.offset();
        arena.release(a);

        let c = arena.allocate(50).unwrap();
        assert_eq!(c.offset(), a_offset);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn block_needs_room_for_remainder_header() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(100).unwrap();
        let _b = arena.allocate(8).unwrap();
        arena.release(a);

        // the hole holds exactly 100 bytes, which leaves no room for a remainder header
        let c = arena.allocate(100).unwrap();
        assert_ne!(c.offset(), HEADER_SIZE);
        let d = arena.allocate(100 - HEADER_SIZE).unwrap();
        assert_eq!(d.offset(), HEADER_SIZE);
    }

    #[test]
    fn exact_fit_folds_remainder() {
        let mut arena = Arena::<N>::new();

        let all = arena.allocate(USABLE - HEADER_SIZE).unwrap();
        assert_eq!(all.size(), USABLE);
        assert_eq!(arena.free_blocks(), 0);
        assert_eq!(
            arena.allocate(0),
            Err(ArenaError::OutOfMemory { requested: 0 })
        );
        arena.check_invariants().unwrap();

        arena.release(all);
        assert_eq!(free_list(&arena), [(0, USABLE)]);
    }

    #[test]
    fn exact_fit_preserves_empty_remainder() {
        let mut arena = Arena::<N>::with_policy(SplitPolicy::Preserve);

        let all = arena.allocate(USABLE - HEADER_SIZE).unwrap();
        assert_eq!(all.size(), USABLE - HEADER_SIZE);
        assert_eq!(free_list(&arena), [(USABLE, 0)]);
        arena.check_invariants().unwrap();

        arena.release(all);
        assert_eq!(free_list(&arena), [(0, USABLE)]);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn overflow() {
        let mut arena = Arena::<N>::new();
        assert_eq!(
            arena.allocate(USABLE),
            Err(ArenaError::OutOfMemory { requested: USABLE })
        );
        assert_eq!(
            arena.allocate(usize::MAX),
            Err(ArenaError::OutOfMemory {
                requested: usize::MAX
            })
        );

        let one = arena.allocate(600).unwrap();
        assert!(arena.allocate(600).is_err());
        arena.release(one);

        let two = arena.allocate(600).unwrap();
        arena.release(two);
    }

    #[test]
    fn exhaustion_then_full_capacity() {
        let mut arena = Arena::<N>::new();
        let mut handles = Vec::new();
        while let Ok(handle) = arena.allocate(24) {
            handles.push(handle);
        }
        assert!(handles.len() > 1);
        arena.check_invariants().unwrap();

        let (evens, odds): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .enumerate()
            .partition(|(i, _)| i % 2 == 0);
        for (_, handle) in evens {
            arena.release(handle);
        }
        arena.check_invariants().unwrap();
        for (_, handle) in odds.into_iter().rev() {
            arena.release(handle);
        }

        assert_eq!(free_list(&arena), [(0, USABLE)]);
        let all = arena.allocate(USABLE - HEADER_SIZE).unwrap();
        assert_eq!(all.size(), USABLE);
    }

    #[test]
    fn zeroed() {
        let mut arena = Arena::<N>::new();

        let one = arena.allocate(16).unwrap();
        arena.payload_mut(&one).fill(0xff);
        arena.release(one);

        let two = arena.allocate_zeroed(16).unwrap();
        assert!(arena.payload(&two).iter().all(|&b| b == 0));
        assert_eq!(arena.payload(&two).len(), 16);
    }

    #[test]
    fn payloads_do_not_overlap_headers() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(40).unwrap();
        let b = arena.allocate(40).unwrap();
        arena.payload_mut(&a).fill(0xaa);
        arena.payload_mut(&b).fill(0xbb);

        arena.check_invariants().unwrap();
        assert!(arena.payload(&a).iter().all(|&x| x == 0xaa));
        arena.release(a);
        assert!(arena.payload(&b).iter().all(|&x| x == 0xbb));
        arena.release(b);
        arena.check_invariants().unwrap();
    }

    #[test]
    fn layout_rounding_and_alignment() {
        let mut arena = Arena::<N>::new();

        let a = arena.allocate_layout(Layout::from_size_align(5, 1).unwrap()).unwrap();
        assert_eq!(a.size(), 5usize.next_multiple_of(WORD_SIZE));
        let b = arena.allocate_layout(Layout::new::<u64>()).unwrap();
        assert_eq!(b.offset() % WORD_SIZE, 0);

        let wide = Layout::from_size_align(8, 2 * WORD_SIZE).unwrap();
        assert_eq!(
            arena.allocate_layout(wide),
            Err(ArenaError::LayoutUnsupported {
                align: 2 * WORD_SIZE
            })
        );
    }

    #[test]
    fn checked_release() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(32).unwrap();
        let _b = arena.allocate(32).unwrap();
        let a_offset = a.offset();
        drop(a);

        assert_eq!(
            arena.try_release(a_offset + 1),
            Err(ArenaError::ForeignAddress {
                offset: a_offset + 1
            })
        );
        assert_eq!(
            arena.try_release(0),
            Err(ArenaError::ForeignAddress { offset: 0 })
        );
        assert_eq!(
            arena.try_release(N + 64),
            Err(ArenaError::ForeignAddress { offset: N + 64 })
        );

        arena.try_release(a_offset).unwrap();
        assert_eq!(
            arena.try_release(a_offset),
            Err(ArenaError::DoubleRelease { offset: a_offset })
        );
        arena.check_invariants().unwrap();
    }

    #[test]
    fn blocks_and_stats() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(100).unwrap();
        let b = arena.allocate(50).unwrap();
        arena.release(a);

        let blocks: Vec<BlockInfo> = arena.blocks().collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].state, BlockState::Free);
        assert_eq!(blocks[1].state, BlockState::Allocated);
        assert_eq!(blocks[1].offset, b.header());
        assert_eq!(blocks[2].state, BlockState::Free);

        let stats = arena.stats();
        assert_eq!(stats.capacity, USABLE);
        assert_eq!(stats.allocated_blocks, 1);
        assert_eq!(stats.allocated_bytes, 50);
        assert_eq!(stats.free_blocks, 2);
        assert_eq!(stats.free_bytes, arena.free_bytes());
        assert_eq!(stats.largest_free, arena.largest_free());
        assert_eq!(
            stats.free_bytes + stats.allocated_bytes + (blocks.len() - 1) * HEADER_SIZE,
            USABLE
        );
    }

    #[test]
    fn detects_corruption() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(64).unwrap();
        header::write_size(&mut arena.pool, a.header(), USABLE * 2);
        assert_eq!(
            arena.check_invariants(),
            Err(ArenaError::PartitionBroken { offset: 0 })
        );

        let mut arena = Arena::<N>::new();
        let a = arena.allocate(64).unwrap();
        let _b = arena.allocate(64).unwrap();
        // put a on the list by hand without merging
        let tail = arena.free.head();
        header::write_next(&mut arena.pool, a.header(), tail);
        arena.free = FreeList::new(Some(a.header()));
        arena.check_invariants().unwrap();

        let tail = tail.unwrap();
        header::write_next(&mut arena.pool, a.header(), None);
        header::write_next(&mut arena.pool, tail, Some(a.header()));
        arena.free = FreeList::new(Some(tail));
        assert_eq!(
            arena.check_invariants(),
            Err(ArenaError::UnorderedFreeList {
                offset: a.header().get()
            })
        );
    }

    #[test]
    fn detects_unmerged_neighbours() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(64).unwrap();
        let tail = arena.free.head();
        header::write_next(&mut arena.pool, a.header(), tail);
        arena.free = FreeList::new(Some(a.header()));

        assert_eq!(
            arena.check_invariants(),
            Err(ArenaError::AdjacentFreeBlocks {
                offset: a.header().get()
            })
        );
    }

    #[test]
    fn stale_handle_after_initialize_is_ignored() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(100).unwrap();
        let _b = arena.allocate(50).unwrap();

        arena.initialize();
        arena.release(a);

        arena.check_invariants().unwrap();
        assert_eq!(arena.free_list().take(3).count(), 1);
        assert_eq!(free_list(&arena), [(0, USABLE)]);

        let c = arena.allocate(100).unwrap();
        arena.release(c);
        assert_eq!(free_list(&arena), [(0, USABLE)]);
    }

    #[test]
    fn unchecked_release_of_free_block_is_ignored() {
        let mut arena = Arena::<N>::new();
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let (a_offset, b_offset) = (a.offset(), b.offset());
        drop((a, b));

        assert!(matches!(arena.release_at(a_offset), Released::Freed { .. }));
        assert_eq!(
            arena.release_at(a_offset),
            Released::AlreadyFree {
                block: BlockOffset::new(0)
            }
        );
        arena.check_invariants().unwrap();
        assert_eq!(arena.free_list().take(4).count(), 2);

        // b's header now sits inside the single free block
        arena.initialize();
        assert_eq!(
            arena.release_at(b_offset),
            Released::AlreadyFree {
                block: BlockOffset::new(b_offset - HEADER_SIZE)
            }
        );
        arena.check_invariants().unwrap();
        assert_eq!(free_list(&arena), [(0, USABLE)]);
    }
}
