use crate::{
    header::{self, BlockOffset, Header},
    pool::Pool,
};

/// Singly linked list of free blocks threaded through their headers,
/// kept in ascending address order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeList {
    head: Option<BlockOffset>,
}

impl FreeList {
    pub(crate) const fn new(head: Option<BlockOffset>) -> Self {
        FreeList { head }
    }

    pub(crate) fn head(&self) -> Option<BlockOffset> {
        self.head
    }

    pub(crate) fn iter<'a, const N: usize>(&self, pool: &'a Pool<N>) -> FreeBlocks<'a, N> {
        FreeBlocks {
            pool,
            cursor: self.head,
        }
    }

    /// First node, in list order, with at least `needed` payload bytes,
    /// together with its predecessor
    pub(crate) fn find_first_fit<const N: usize>(
        &self,
        pool: &Pool<N>,
        needed: usize,
    ) -> Option<(Option<BlockOffset>, BlockOffset, Header)> {
        let mut prev = None;
        for (block, header) in self.iter(pool) {
            if header.size >= needed {
                return Some((prev, block, header));
            }
            prev = Some(block);
        }

        None
    }

    /// Neighbours a block at `block` would have on the list: the last node
    /// below it and the first node at or above it
    pub(crate) fn insertion_point<const N: usize>(
        &self,
        pool: &Pool<N>,
        block: BlockOffset,
    ) -> (Option<BlockOffset>, Option<BlockOffset>) {
        let mut prev = None;
        for (node, _) in self.iter(pool) {
            if node >= block {
                return (prev, Some(node));
            }
            prev = Some(node);
        }

        (prev, None)
    }

    /// Points `prev`'s link, or the head when there is no `prev`, at `target`
    pub(crate) fn relink<const N: usize>(
        &mut self,
        pool: &mut Pool<N>,
        prev: Option<BlockOffset>,
        target: Option<BlockOffset>,
    ) {
        match prev {
            Some(prev) => header::write_next(pool, prev, target),
            None => self.head = target,
        }
    }
}

/// Iterator over the free list in address order
pub struct FreeBlocks<'a, const N: usize> {
    pool: &'a Pool<N>,
    cursor: Option<BlockOffset>,
}

impl<const N: usize> Iterator for FreeBlocks<'_, N> {
    type Item = (BlockOffset, Header);

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.cursor?;
        let header = Header::read(self.pool, block);
        self.cursor = header.next;

        Some((block, header))
    }
}
