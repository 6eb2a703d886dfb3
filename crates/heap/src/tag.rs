//! Boundary-tag encoding shared by every block in the heap.
//!
//! Each block begins and ends with one machine word packing the block size
//! and an allocated flag:
//!
//! ```text
//!  63                          4  3  2  1  0
//!  -----------------------------------------
//! | s  s  s  s  ...  s  s  s  s  0  0  0  a |
//!  -----------------------------------------
//! ```
//!
//! The size occupies the high bits (it is always a multiple of [`ALIGN`], so
//! the low four bits are free), and bit 0 is 1 for an allocated block.

use core::fmt;

use platform_cast::{CastFrom as _, CastInto as _};

/// Machine word size in bytes; one boundary tag occupies one word.
pub const WORD: usize = 8;
/// Alignment unit. Payload offsets and block sizes are multiples of a double
/// word.
pub const ALIGN: usize = 2 * WORD;
/// Bookkeeping bytes per block: one header plus one footer.
pub const OVERHEAD: usize = 2 * WORD;
/// Smallest block the allocator ever creates: both tags plus a minimal
/// payload.
pub const MIN_BLOCK: usize = 2 * ALIGN;
/// Quantum the heap grows by when no free block fits.
pub const CHUNK: usize = 1 << 12;

const _: () = assert!(WORD == size_of::<u64>());
const _: () = assert!(OVERHEAD == 2 * WORD);
const _: () = assert!(MIN_BLOCK % ALIGN == 0);
const _: () = assert!(CHUNK % ALIGN == 0);

/// The size-plus-allocated word stored at both ends of a block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlockTag(u64);

impl BlockTag {
    const SIZE_MASK: u64 = !0xf;
    const ALLOCATED_MASK: u64 = 0x1;

    /// Packs a block size and an allocated flag into a tag.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a multiple of [`ALIGN`].
    #[must_use]
    pub fn new(size: usize, allocated: bool) -> Self {
        assert!(
            size.is_multiple_of(ALIGN),
            "block size must be a multiple of the alignment unit"
        );
        let mut bits = u64::cast_from(size);
        if allocated {
            bits |= Self::ALLOCATED_MASK;
        }
        Self(bits)
    }

    /// Total block size in bytes, including both tags.
    #[must_use]
    pub fn size(self) -> usize {
        (self.0 & Self::SIZE_MASK).cast_into()
    }

    /// Returns `true` if the tagged block is allocated.
    #[must_use]
    pub fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED_MASK != 0
    }

    /// The raw word as stored in the arena.
    #[must_use]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Reinterprets a word read back from the arena.
    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::Debug for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}]",
            self.size(),
            if self.is_allocated() { 'a' } else { 'f' }
        )
    }
}
