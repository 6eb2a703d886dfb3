//! A growable linear memory region backing a simulated heap.
//!
//! `Arena` owns a contiguous run of bytes addressed by offsets from zero. It
//! stands in for the host memory-extension primitive a real allocator would
//! sit on: the region grows monotonically at the high end, never moves, and
//! never shrinks (short of [`reset`](Arena::reset)). Growth is capped by a
//! byte limit fixed at construction, so address-space exhaustion is an
//! ordinary, testable error instead of an out-of-memory abort.
//!
//! All access is bounds-checked slice access; clients that hold stale or
//! fabricated offsets hit a panic here rather than corrupting neighbors.
//!
//! # Examples
//!
//! ```
//! use arena::Arena;
//!
//! let mut arena = Arena::with_limit(4096);
//!
//! // The offset of each new region is the old length.
//! let start = arena.grow(64)?;
//! assert_eq!(start, 0);
//! assert_eq!(arena.len(), 64);
//!
//! arena.write_word(0, 0x21);
//! assert_eq!(arena.read_word(0), 0x21);
//! # Ok::<(), arena::ArenaError>(())
//! ```

use core::{fmt, ops::Range};

use snafu::{Location, OptionExt as _, Snafu};

/// Default growth cap, matching the 20 MiB address space of the simulated
/// host this design was validated against.
pub const DEFAULT_LIMIT: usize = 20 * (1 << 20);

/// Error raised when growing an [`Arena`] past its configured limit.
#[derive(Debug, Snafu)]
pub enum ArenaError {
    #[snafu(display(
        "cannot grow arena by {requested} bytes: {len} of {limit} bytes in use"
    ))]
    LimitExceeded {
        requested: usize,
        len: usize,
        limit: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// A contiguous byte region, growable at the high end and addressed by
/// offsets from zero.
///
/// # Examples
///
/// ```
/// use arena::Arena;
///
/// let mut arena = Arena::with_limit(128);
/// arena.grow(32).unwrap();
/// assert!(arena.grow(1024).is_err()); // over the cap, nothing changes
/// assert_eq!(arena.len(), 32);
/// ```
pub struct Arena {
    bytes: Vec<u8>,
    limit: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    /// Creates an empty arena with the [default limit](DEFAULT_LIMIT).
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// Creates an empty arena that will refuse to grow beyond `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    /// Extends the region by exactly `extra` zeroed bytes and returns the
    /// offset where the new bytes begin (the previous length).
    ///
    /// # Errors
    ///
    /// Fails with [`ArenaError::LimitExceeded`] if the grown region would
    /// pass the limit; the arena is left untouched in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use arena::Arena;
    ///
    /// let mut arena = Arena::with_limit(64);
    /// assert_eq!(arena.grow(16).unwrap(), 0);
    /// assert_eq!(arena.grow(16).unwrap(), 16);
    /// ```
    pub fn grow(&mut self, extra: usize) -> Result<usize, ArenaError> {
        let old_len = self.bytes.len();
        let new_len = old_len
            .checked_add(extra)
            .filter(|&new_len| new_len <= self.limit)
            .context(LimitExceededSnafu {
                requested: extra,
                len: old_len,
                limit: self.limit,
            })?;
        self.bytes.resize(new_len, 0);
        Ok(old_len)
    }

    /// Discards all contents, returning the arena to length zero. The limit
    /// is unchanged.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    /// Current length of the region in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// The byte limit this arena will not grow past.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns `true` if nothing has been grown yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reads the native-endian word stored at byte offset `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset..offset + 8` is out of bounds.
    #[must_use]
    pub fn read_word(&self, offset: usize) -> u64 {
        let mut word = [0; size_of::<u64>()];
        word.copy_from_slice(&self.bytes[offset..offset + size_of::<u64>()]);
        u64::from_ne_bytes(word)
    }

    /// Stores `value` as a native-endian word at byte offset `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset..offset + 8` is out of bounds.
    pub fn write_word(&mut self, offset: usize, value: u64) {
        self.bytes[offset..offset + size_of::<u64>()].copy_from_slice(&value.to_ne_bytes());
    }

    /// Borrows the bytes in `range`.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[must_use]
    pub fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }

    /// Mutably borrows the bytes in `range`.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[must_use]
    pub fn bytes_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.bytes[range]
    }

    /// Copies the bytes in `src` to the region starting at `dst`, handling
    /// overlap like `memmove`.
    ///
    /// # Panics
    ///
    /// Panics if either the source or the destination range is out of
    /// bounds.
    pub fn copy_within(&mut self, src: Range<usize>, dst: usize) {
        self.bytes.copy_within(src, dst);
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.bytes.len())
            .field("limit", &self.limit)
            .finish()
    }
}
