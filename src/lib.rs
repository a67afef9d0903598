//! Fixed-pool kernel heap.
//!
//! An [`Arena`] manages one statically sized byte pool with an address
//! ordered free list: first-fit allocation that splits blocks in place, and
//! release that coalesces with free neighbours on both sides. Internal
//! references are offsets into the pool, never raw pointers.
//!
//! [`LockedArena`] puts an arena behind a spinlock so it can serve as the
//! kernel's `#[global_allocator]`.
#![cfg_attr(not(test), no_std)]

pub mod arena_allocator;
pub mod config;
pub mod error;
mod free_list;
pub mod header;
pub mod locked;
pub mod pool;

pub use arena_allocator::{Arena, ArenaStats, BlockInfo, BlockState};
pub use config::{POOL_SIZE, SplitPolicy, WORD_SIZE};
pub use error::{ArenaError, ArenaResult};
pub use free_list::FreeBlocks;
pub use header::{BlockOffset, HEADER_SIZE, Handle, Header};
pub use locked::LockedArena;
