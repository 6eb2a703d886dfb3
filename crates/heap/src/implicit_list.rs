//! The implicit free-list allocator.
//!
//! Blocks are found by walking the chain of boundary tags rather than through
//! explicit free-list links. The heap has the following shape, with all
//! offsets relative to the arena start:
//!
//! ```text
//! begin                                                               end
//!  --------------------------------------------------------------------
//! |  pad  | hdr [16:a] | ftr [16:a] | zero or more blocks | hdr [0:a]  |
//!  --------------------------------------------------------------------
//!         |         prologue        |                     | epilogue   |
//! ```
//!
//! The allocated prologue and epilogue sentinels never change, which removes
//! the edge conditions from coalescing and traversal: every real block has a
//! tagged neighbor on both sides.
//!
//! # Algorithm
//!
//! - **Placement**: first fit, scanning blocks in address order from the
//!   prologue to the epilogue.
//! - **Splitting**: a chosen block is split when the remainder could hold at
//!   least a minimal block; otherwise the whole block is handed out.
//! - **Coalescing**: immediate on `free`, merging with whichever neighbors
//!   are free, so no two adjacent free blocks ever coexist.
//! - **Growth**: when no block fits, the arena is extended by at least one
//!   [`CHUNK`] and the new region is merged with a trailing free block.

use core::{fmt, panic::Location};

use arena::{Arena, ArenaError};
use log::{debug, error};
use snafu::{ResultExt as _, Snafu};

use crate::tag::{ALIGN, BlockTag, CHUNK, MIN_BLOCK, OVERHEAD, WORD};

/// Error raised while laying out the initial heap.
#[derive(Debug, Snafu)]
pub enum HeapError {
    /// The arena could not hold the padding and sentinel tags.
    #[snafu(display("cannot lay out the empty heap"))]
    Bootstrap {
        source: ArenaError,
        #[snafu(implicit)]
        location: snafu::Location,
    },
    /// The arena could not hold the first free chunk.
    #[snafu(display("cannot reserve the initial free chunk"))]
    InitialChunk {
        source: ArenaError,
        #[snafu(implicit)]
        location: snafu::Location,
    },
}

/// An opaque handle to an allocated block: the arena offset of its first
/// payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle(usize);

impl BlockHandle {
    /// Arena offset of the block's first payload byte, always a multiple of
    /// [`ALIGN`].
    #[must_use]
    pub fn offset(self) -> usize {
        self.0
    }
}

/// A first-fit allocator over an implicit list of boundary-tagged blocks.
///
/// Handles returned by [`alloc`](Self::alloc) and [`realloc`](Self::realloc)
/// belong to the allocator that produced them; passing a handle from another
/// instance may panic or address the wrong block.
pub struct ImplicitListAllocator {
    arena: Arena,
    /// Offset of the prologue payload; block traversal starts here.
    start: usize,
}

impl ImplicitListAllocator {
    /// Creates a heap over a fresh arena with the default growth limit.
    ///
    /// # Errors
    ///
    /// Fails if the arena cannot hold the sentinels and the first chunk.
    pub fn new() -> Result<Self, HeapError> {
        Self::with_arena(Arena::new())
    }

    /// Creates a heap over the given arena, discarding its prior contents.
    ///
    /// # Errors
    ///
    /// Fails if the arena cannot hold the sentinels and the first chunk.
    pub fn with_arena(mut arena: Arena) -> Result<Self, HeapError> {
        arena.reset();
        let mut heap = Self { arena, start: 0 };

        let base = heap.arena.grow(4 * WORD).context(BootstrapSnafu)?;
        heap.start = base + ALIGN;
        heap.arena.write_word(base, 0); // alignment padding
        heap.write_tag(base + WORD, BlockTag::new(OVERHEAD, true)); // prologue header
        heap.write_tag(base + ALIGN, BlockTag::new(OVERHEAD, true)); // prologue footer
        heap.write_tag(base + WORD + ALIGN, BlockTag::new(0, true)); // epilogue header

        heap.extend(CHUNK / WORD).context(InitialChunkSnafu)?;
        Ok(heap)
    }

    /// Allocates a block whose payload holds at least `size` bytes, aligned
    /// to [`ALIGN`].
    ///
    /// A zero-size request is a no-op. Returns `None` when no free block
    /// fits and the arena refuses to grow; the heap is unchanged in that
    /// case.
    pub fn alloc(&mut self, size: usize) -> Option<BlockHandle> {
        if size == 0 {
            return None;
        }

        // Adjusted size covers the tags and rounds up to the alignment unit;
        // small requests get the minimal splittable payload. A size too
        // large to carry its tags can never fit any arena.
        let asize = if size <= ALIGN {
            ALIGN + OVERHEAD
        } else {
            match size
                .checked_add(OVERHEAD)
                .and_then(|total| total.checked_next_multiple_of(ALIGN))
            {
                Some(asize) => asize,
                None => {
                    debug!("allocation of {size} bytes failed: size overflows the address space");
                    return None;
                }
            }
        };

        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => match self.extend(asize.max(CHUNK) / WORD) {
                Ok(bp) => bp,
                Err(err) => {
                    debug!("allocation of {size} bytes failed: {err}");
                    return None;
                }
            },
        };
        self.place(bp, asize);
        Some(BlockHandle(bp))
    }

    /// Frees an allocated block and merges it with any free neighbor.
    ///
    /// Freeing an already-free block is a tolerated no-op, so a double free
    /// cannot corrupt the chain.
    pub fn free(&mut self, block: BlockHandle) {
        let bp = block.0;
        let header = self.header(bp);
        if !header.is_allocated() {
            debug!("ignoring free of already-free block at {bp:#x}");
            return;
        }

        let tag = BlockTag::new(header.size(), false);
        self.write_tag(bp - WORD, tag);
        self.write_tag(self.footer_offset(bp), tag);
        self.coalesce(bp);
    }

    /// Resizes a block, moving it when it cannot grow in place.
    ///
    /// - `None` behaves as [`alloc(new_size)`](Self::alloc);
    /// - `new_size == 0` behaves as [`free`](Self::free) and returns `None`;
    /// - a block that already accommodates `new_size` is returned unchanged
    ///   (there is no shrink-to-fit);
    /// - otherwise the payload is copied into a freshly allocated block and
    ///   the old block is freed afterwards.
    ///
    /// Returns `None` when a needed allocation fails, including a
    /// `new_size` too large to carry its tags; the old block is left intact
    /// then.
    pub fn realloc(&mut self, block: Option<BlockHandle>, new_size: usize) -> Option<BlockHandle> {
        let Some(block) = block else {
            return self.alloc(new_size);
        };
        if new_size == 0 {
            self.free(block);
            return None;
        }

        let old_size = self.block_size(block);
        let needed = new_size.checked_add(OVERHEAD)?;
        if needed <= old_size {
            return Some(block);
        }

        let new = self.alloc(needed)?;
        // The old block stays allocated until the copy is done, so the two
        // payloads cannot overlap.
        let old_payload = block.0..block.0 + old_size - OVERHEAD;
        self.arena.copy_within(old_payload, new.0);
        self.free(block);
        Some(new)
    }

    /// Borrows a block's payload bytes.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not come from this allocator.
    #[must_use]
    pub fn payload(&self, block: BlockHandle) -> &[u8] {
        self.arena.bytes(block.0..block.0 + self.block_size(block) - OVERHEAD)
    }

    /// Mutably borrows a block's payload bytes.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not come from this allocator.
    #[must_use]
    pub fn payload_mut(&mut self, block: BlockHandle) -> &mut [u8] {
        let range = block.0..block.0 + self.block_size(block) - OVERHEAD;
        self.arena.bytes_mut(range)
    }

    /// Total size of a block in bytes, tags included.
    #[must_use]
    pub fn block_size(&self, block: BlockHandle) -> usize {
        self.header(block.0).size()
    }

    /// Current heap extent in bytes, sentinels included.
    #[must_use]
    pub fn heap_size(&self) -> usize {
        self.arena.len()
    }

    /// Walks the block chain and verifies the heap invariants: a proper
    /// prologue, per-block alignment, header/footer agreement, in-bounds
    /// sizes, and a proper epilogue.
    ///
    /// The first violation is logged at `error` level, tagged with the
    /// caller's location, and makes the walk return `false`. Diagnostic
    /// only; never called on the allocation path.
    #[must_use]
    #[track_caller]
    pub fn check(&self) -> bool {
        let caller = Location::caller();

        let prologue = self.header(self.start);
        if prologue.size() != OVERHEAD || !prologue.is_allocated() {
            error!("(heap check at {caller}) bad prologue header {prologue:?}");
            return false;
        }

        let mut bp = self.start;
        loop {
            let header = self.header(bp);
            if header.size() == 0 {
                if !header.is_allocated() {
                    error!("(heap check at {caller}) bad epilogue header {header:?}");
                    return false;
                }
                return true;
            }
            if !self.check_block(caller, bp) {
                return false;
            }
            bp += header.size();
        }
    }

    fn check_block(&self, caller: &Location<'_>, bp: usize) -> bool {
        if !bp.is_multiple_of(ALIGN) {
            error!("(heap check at {caller}) block {bp:#x} is not double-word aligned");
            return false;
        }
        let header = self.header(bp);
        if bp - WORD + header.size() > self.arena.len() {
            error!("(heap check at {caller}) block {bp:#x} {header:?} runs past the arena end");
            return false;
        }
        let footer = self.footer(bp);
        if header != footer {
            error!(
                "(heap check at {caller}) block {bp:#x} header {header:?} does not match footer {footer:?}"
            );
            return false;
        }
        true
    }

    /// Extends the heap by `words` words (rounded up to keep the epilogue
    /// double-word aligned), turning the old epilogue into a free block and
    /// merging it with a free block at the old tail.
    fn extend(&mut self, words: usize) -> Result<usize, ArenaError> {
        let size = words.next_multiple_of(2) * WORD;
        let bp = self.arena.grow(size)?;
        debug!("extended heap to {} bytes", self.arena.len());

        self.write_tag(bp - WORD, BlockTag::new(size, false)); // free block header
        self.write_tag(self.footer_offset(bp), BlockTag::new(size, false)); // free block footer
        self.write_tag(self.next_block(bp) - WORD, BlockTag::new(0, true)); // new epilogue
        Ok(self.coalesce(bp))
    }

    /// First free block at least `asize` bytes large, in address order.
    fn find_fit(&self, asize: usize) -> Option<usize> {
        let mut bp = self.start;
        loop {
            let header = self.header(bp);
            if header.size() == 0 {
                return None;
            }
            if !header.is_allocated() && header.size() >= asize {
                return Some(bp);
            }
            bp += header.size();
        }
    }

    /// Places an `asize`-byte allocated block at the start of the free block
    /// at `bp`, splitting off the remainder when it can stand alone.
    fn place(&mut self, bp: usize, asize: usize) {
        let csize = self.header(bp).size();
        if csize - asize >= MIN_BLOCK {
            self.write_tag(bp - WORD, BlockTag::new(asize, true));
            self.write_tag(self.footer_offset(bp), BlockTag::new(asize, true));
            let rest = self.next_block(bp);
            self.write_tag(rest - WORD, BlockTag::new(csize - asize, false));
            self.write_tag(self.footer_offset(rest), BlockTag::new(csize - asize, false));
        } else {
            self.write_tag(bp - WORD, BlockTag::new(csize, true));
            self.write_tag(self.footer_offset(bp), BlockTag::new(csize, true));
        }
    }

    /// Merges the free block at `bp` with whichever neighbors are free and
    /// returns the merged block's payload offset.
    fn coalesce(&mut self, bp: usize) -> usize {
        let prev = self.prev_block(bp);
        let next = self.next_block(bp);
        // The first real block's previous computation folds back onto the
        // prologue, which is permanently allocated; the self guard keeps a
        // zeroed word below from aliasing the block with itself.
        let prev_free = prev != bp && !self.header(prev).is_allocated();
        let next_free = !self.header(next).is_allocated();
        let mut size = self.header(bp).size();

        match (prev_free, next_free) {
            (true, true) => {
                size += self.header(prev).size() + self.header(next).size();
                self.write_tag(prev - WORD, BlockTag::new(size, false));
                self.write_tag(self.footer_offset(prev), BlockTag::new(size, false));
                prev
            }
            (true, false) => {
                size += self.header(prev).size();
                self.write_tag(prev - WORD, BlockTag::new(size, false));
                self.write_tag(self.footer_offset(prev), BlockTag::new(size, false));
                prev
            }
            (false, true) => {
                size += self.header(next).size();
                self.write_tag(bp - WORD, BlockTag::new(size, false));
                self.write_tag(self.footer_offset(bp), BlockTag::new(size, false));
                bp
            }
            (false, false) => bp,
        }
    }

    fn header(&self, bp: usize) -> BlockTag {
        BlockTag::from_bits(self.arena.read_word(bp - WORD))
    }

    fn footer(&self, bp: usize) -> BlockTag {
        BlockTag::from_bits(self.arena.read_word(self.footer_offset(bp)))
    }

    fn footer_offset(&self, bp: usize) -> usize {
        bp + self.header(bp).size() - OVERHEAD
    }

    fn next_block(&self, bp: usize) -> usize {
        bp + self.header(bp).size()
    }

    fn prev_block(&self, bp: usize) -> usize {
        bp - BlockTag::from_bits(self.arena.read_word(bp - OVERHEAD)).size()
    }

    fn write_tag(&mut self, offset: usize, tag: BlockTag) {
        self.arena.write_word(offset, tag.bits());
    }
}

impl fmt::Debug for ImplicitListAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "heap ({} bytes, first block at {:#x}):",
            self.arena.len(),
            self.start
        )?;
        let mut bp = self.start;
        loop {
            let header = self.header(bp);
            if header.size() == 0 {
                return write!(f, "{bp:#x}: header {header:?} (end of heap)");
            }
            let footer = self.footer(bp);
            writeln!(f, "{bp:#x}: header {header:?} footer {footer:?}")?;
            bp += header.size();
        }
    }
}
