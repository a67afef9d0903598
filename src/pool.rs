use core::{cell::UnsafeCell, ptr, slice};

use crate::config::WORD_SIZE;

/// Fixed-size backing storage for an arena
///
/// The buffer lives inside an `UnsafeCell` because payload bytes are handed
/// out as raw pointers while the arena keeps writing headers next to them.
/// All accesses are bounds checked against `N` in every build: the accessors
/// are safe functions, so an out-of-range offset must panic rather than
/// touch memory outside the buffer.
#[repr(C, align(16))]
pub struct Pool<const N: usize> {
    buf: UnsafeCell<[u8; N]>,
}

impl<const N: usize> Pool<N> {
    /// Creates a zeroed pool with `words` written at its start
    pub const fn with_prefix(words: &[usize]) -> Self {
        let mut buf = [0u8; N];
        let mut w = 0;
        while w < words.len() {
            let bytes = words[w].to_ne_bytes();
            let mut i = 0;
            while i < WORD_SIZE {
                buf[w * WORD_SIZE + i] = bytes[i];
                i += 1;
            }
            w += 1;
        }

        Pool {
            buf: UnsafeCell::new(buf),
        }
    }

    pub fn base_ptr(&self) -> *mut u8 {
        self.buf.get().cast()
    }

    /// Pointer to `len` bytes at `offset`, panicking if the range leaves the pool
    fn at(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(
            offset <= N && len <= N - offset,
            "pool access {offset}..{} out of bounds ({N})",
            offset.saturating_add(len)
        );
        // SAFETY: offset + len <= N was checked above
        unsafe { self.base_ptr().add(offset) }
    }

    pub fn read_word(&self, offset: usize) -> usize {
        // SAFETY: `at` checked the range; unaligned reads need no alignment
        unsafe { ptr::read_unaligned(self.at(offset, WORD_SIZE).cast::<usize>()) }
    }

    pub fn write_word(&mut self, offset: usize, value: usize) {
        // SAFETY: `at` checked the range; the write touches header bytes only,
        // which no payload pointer covers
        unsafe { ptr::write_unaligned(self.at(offset, WORD_SIZE).cast::<usize>(), value) }
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        // SAFETY: in bounds, and writes require `&mut self`
        unsafe { slice::from_raw_parts(self.at(offset, len), len) }
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        // SAFETY: in bounds, and `&mut self` rules out other views
        unsafe { slice::from_raw_parts_mut(self.at(offset, len), len) }
    }

    pub fn fill(&mut self, offset: usize, len: usize, value: u8) {
        // SAFETY: in bounds; raw write avoids forming a reference over bytes
        // a caller may still hold a pointer to
        unsafe { self.at(offset, len).write_bytes(value, len) }
    }
}
