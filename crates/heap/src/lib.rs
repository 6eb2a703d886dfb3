//! An implicit free-list heap allocator over a simulated byte arena.
//!
//! The heap is one growable [`Arena`](arena::Arena) laid out as a chain of
//! blocks, each carrying a boundary tag ([`BlockTag`]) at both ends.
//! [`ImplicitListAllocator`] walks that chain for first-fit placement, splits
//! oversized blocks, and merges free neighbors eagerly, so no two adjacent
//! free blocks ever coexist.
//!
//! # Examples
//!
//! ```
//! use heap::ImplicitListAllocator;
//!
//! let mut heap = ImplicitListAllocator::new()?;
//!
//! let block = heap.alloc(100).expect("arena has room");
//! heap.payload_mut(block)[..5].copy_from_slice(b"hello");
//!
//! // Growing past the block's capacity moves it; the payload follows.
//! let block = heap.realloc(Some(block), 200).expect("arena has room");
//! assert_eq!(&heap.payload(block)[..5], b"hello");
//!
//! heap.free(block);
//! # Ok::<(), heap::HeapError>(())
//! ```

pub mod implicit_list;
pub mod tag;

pub use self::{
    implicit_list::{BlockHandle, HeapError, ImplicitListAllocator},
    tag::{ALIGN, BlockTag, CHUNK, MIN_BLOCK, OVERHEAD, WORD},
};
