use core::{
    alloc::{GlobalAlloc, Layout},
    ptr,
};

use log::warn;
use spin::{Mutex, MutexGuard};

use crate::{
    arena_allocator::{self, Arena},
    config::POOL_SIZE,
};

/// An [`Arena`] behind a spinlock, usable as a `static` global allocator
///
/// The lock is not reentrant, so `GlobalAlloc` calls log only after it has
/// been released. A logger that allocates from this same heap is therefore
/// called back for its own allocations and has to stop that recursion itself.
///
/// ```ignore
/// #[global_allocator]
/// static HEAP: LockedArena = LockedArena::new();
/// ```
pub struct LockedArena<const N: usize = POOL_SIZE> {
    inner: Mutex<Arena<N>>,
}

impl<const N: usize> Default for LockedArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LockedArena<N> {
    pub const fn new() -> Self {
        LockedArena {
            inner: Mutex::new(Arena::new()),
        }
    }

    pub const fn from_arena(arena: Arena<N>) -> Self {
        LockedArena {
            inner: Mutex::new(arena),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Arena<N>> {
        self.inner.lock()
    }
}

unsafe impl<const N: usize> GlobalAlloc for LockedArena<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = match arena_allocator::layout_size(layout) {
            Ok(size) => size,
            Err(err) => {
                warn!("alloc {:?} refused: {}", layout, err);
                return ptr::null_mut();
            }
        };

        let (ptr, outcome) = {
            let mut arena = self.lock();
            let outcome = arena.allocate_quiet(size);
            let ptr = match &outcome {
                Ok((handle, _)) => arena.payload_ptr(handle),
                Err(_) => ptr::null_mut(),
            };
            (ptr, outcome)
        };
        arena_allocator::log_allocation(size, &outcome);

        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.alloc(layout) };
        if ptr.is_null() {
            return ptr::null_mut();
        }

        // SAFETY: alloc returned at least layout.size() writable bytes
        unsafe { ptr.write_bytes(0, layout.size()) };
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if ptr.is_null() {
            return;
        }

        let released = {
            let mut arena = self.lock();
            let offset = arena.offset_of(ptr);
            arena.release_at(offset)
        };
        released.log();
    }
}
