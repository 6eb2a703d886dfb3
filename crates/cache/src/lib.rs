//! A set-associative cache behavior model with LRU replacement.
//!
//! [`Cache`] tracks only hit/miss/eviction behavior, not data: a line is a
//! valid flag, a tag, and a recency stamp. Addresses decompose into a block
//! offset (`b` low bits, ignored), a set index (the next `s` bits), and a tag
//! (everything above). A `Modify` access is a load followed by a store to the
//! same address, so it counts as two lookups.
//!
//! Recency is a logical clock that advances on every lookup, so LRU ordering
//! has no ties.
//!
//! # Examples
//!
//! ```
//! use cache::{AccessKind, Cache};
//!
//! let mut cache = Cache::new(4, 1, 4);
//!
//! assert!(cache.access(AccessKind::Load, 0x100).first.is_miss());
//! assert!(cache.access(AccessKind::Store, 0x100).first.is_hit());
//!
//! let stats = cache.stats();
//! assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 0));
//! println!("{stats}"); // hits:1 misses:1 evictions:0
//! ```

use core::fmt;

use derive_more::{Display, IsVariant};
use log::trace;
use platform_cast::CastInto as _;

/// The kind of memory access replayed against the cache.
///
/// `Display` renders the single-letter trace vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AccessKind {
    /// A data load (`L`).
    #[display("L")]
    Load,
    /// A data store (`S`).
    #[display("S")]
    Store,
    /// A load followed by a store to the same address (`M`).
    #[display("M")]
    Modify,
}

/// What one cache lookup did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum Outcome {
    /// The tag was resident in its set.
    Hit,
    /// The tag was absent; `evicted` tells whether a valid line was replaced
    /// to make room.
    Miss { evicted: bool },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => f.write_str("hit"),
            Self::Miss { evicted: false } => f.write_str("miss"),
            Self::Miss { evicted: true } => f.write_str("miss eviction"),
        }
    }
}

/// The outcome of one [`access`](Cache::access).
///
/// `second` is populated only for [`AccessKind::Modify`]: the load outcome
/// comes first, the store outcome second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessResult {
    pub first: Outcome,
    pub second: Option<Outcome>,
}

/// Running totals over every lookup performed so far.
///
/// `Display` renders the grading summary line,
/// `hits:H misses:M evictions:E`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheLine {
    valid: bool,
    tag: u64,
    recency: u64,
}

impl CacheLine {
    const INVALID: Self = Self {
        valid: false,
        tag: 0,
        recency: 0,
    };
}

#[derive(Debug, Clone)]
struct CacheSet {
    lines: Box<[CacheLine]>,
}

impl CacheSet {
    fn lookup(&mut self, tag: u64, clock: u64) -> Outcome {
        if let Some(line) = self.lines.iter_mut().find(|line| line.valid && line.tag == tag) {
            line.recency = clock;
            return Outcome::Hit;
        }

        // Fill an invalid line if the set has one, else replace the least
        // recently used line.
        let (line, evicted) = match self.lines.iter_mut().find(|line| !line.valid) {
            Some(line) => (line, false),
            None => {
                let line = self
                    .lines
                    .iter_mut()
                    .min_by_key(|line| line.recency)
                    .expect("a set holds at least one line");
                (line, true)
            }
        };
        *line = CacheLine {
            valid: true,
            tag,
            recency: clock,
        };
        Outcome::Miss { evicted }
    }
}

/// A fixed-structure set-associative cache with true LRU replacement.
pub struct Cache {
    sets: Box<[CacheSet]>,
    set_bits: u32,
    block_bits: u32,
    clock: u64,
    stats: CacheStats,
}

impl Cache {
    /// Builds a cache of `2^set_bits` sets, each holding `lines_per_set`
    /// invalid lines, over blocks of `2^block_bits` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `lines_per_set` is zero, or if `set_bits + block_bits`
    /// leaves no address bits for the tag.
    #[must_use]
    pub fn new(set_bits: u32, lines_per_set: usize, block_bits: u32) -> Self {
        assert!(lines_per_set > 0, "a cache set needs at least one line");
        assert!(
            set_bits + block_bits < u64::BITS,
            "set index and block offset must leave room for a tag"
        );
        let set = CacheSet {
            lines: vec![CacheLine::INVALID; lines_per_set].into_boxed_slice(),
        };
        Self {
            sets: vec![set; 1 << set_bits].into_boxed_slice(),
            set_bits,
            block_bits,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Performs one access: a single lookup for a load or a store, and a
    /// load lookup followed by a store lookup for a modify.
    pub fn access(&mut self, kind: AccessKind, addr: u64) -> AccessResult {
        let first = self.lookup(addr);
        let second = (kind == AccessKind::Modify).then(|| {
            let outcome = self.lookup(addr);
            debug_assert!(
                outcome.is_hit(),
                "the store half of a modify finds the block its load half brought in"
            );
            outcome
        });
        AccessResult { first, second }
    }

    /// Invalidates every line and zeroes the clock and the counters.
    pub fn reset(&mut self) {
        for set in &mut self.sets {
            set.lines.fill(CacheLine::INVALID);
        }
        self.clock = 0;
        self.stats = CacheStats::default();
    }

    /// Totals accumulated since construction or the last
    /// [`reset`](Self::reset).
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of sets.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Number of lines in each set.
    #[must_use]
    pub fn lines_per_set(&self) -> usize {
        self.sets[0].lines.len()
    }

    fn lookup(&mut self, addr: u64) -> Outcome {
        self.clock += 1;
        let set_index = self.set_index(addr);
        let tag = self.tag(addr);

        let clock = self.clock;
        let outcome = self.sets[set_index].lookup(tag, clock);
        match outcome {
            Outcome::Hit => self.stats.hits += 1,
            Outcome::Miss { evicted } => {
                self.stats.misses += 1;
                if evicted {
                    self.stats.evictions += 1;
                }
            }
        }
        trace!("lookup {addr:#x}: set {set_index} tag {tag:#x} -> {outcome}");
        outcome
    }

    fn set_index(&self, addr: u64) -> usize {
        let mask = (1_u64 << self.set_bits) - 1;
        ((addr >> self.block_bits) & mask).cast_into()
    }

    fn tag(&self, addr: u64) -> u64 {
        addr >> (self.set_bits + self.block_bits)
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cache: {} sets x {} lines, {} block offset bits",
            self.sets.len(),
            self.lines_per_set(),
            self.block_bits
        )?;
        for (index, set) in self.sets.iter().enumerate() {
            writeln!(f, "set {index}")?;
            for line in &set.lines {
                if line.valid {
                    writeln!(f, "    tag {:#x} recency {}", line.tag, line.recency)?;
                } else {
                    writeln!(f, "    invalid")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(cache: &Cache) -> (u64, u64, u64) {
        let stats = cache.stats();
        (stats.hits, stats.misses, stats.evictions)
    }

    #[test]
    fn test_direct_mapped_hit_after_miss() {
        let mut cache = Cache::new(0, 1, 0);
        assert_eq!(
            cache.access(AccessKind::Load, 0x0).first,
            Outcome::Miss { evicted: false }
        );
        assert_eq!(cache.access(AccessKind::Load, 0x0).first, Outcome::Hit);
        assert_eq!(cache.access(AccessKind::Store, 0x0).first, Outcome::Hit);
        assert_eq!(totals(&cache), (2, 1, 0));
    }

    #[test]
    fn test_full_set_evicts_least_recently_used() {
        let mut cache = Cache::new(0, 2, 0);
        assert!(cache.access(AccessKind::Load, 0x0).first.is_miss());
        assert!(cache.access(AccessKind::Load, 0x10).first.is_miss());
        assert_eq!(
            cache.access(AccessKind::Load, 0x20).first,
            Outcome::Miss { evicted: true }
        );
        assert_eq!(totals(&cache), (0, 3, 1));

        // 0x0 was the least recently used line, so it is the one gone.
        assert!(cache.access(AccessKind::Load, 0x10).first.is_hit());
        assert!(cache.access(AccessKind::Load, 0x0).first.is_miss());
    }

    #[test]
    fn test_hit_refreshes_recency() {
        let mut cache = Cache::new(0, 2, 0);
        assert!(cache.access(AccessKind::Load, 0xa0).first.is_miss());
        assert!(cache.access(AccessKind::Load, 0xb0).first.is_miss());
        assert!(cache.access(AccessKind::Load, 0xa0).first.is_hit());

        // 0xb0 is now the LRU line, so 0xc0 replaces it, not 0xa0.
        assert!(cache.access(AccessKind::Load, 0xc0).first.is_miss());
        assert!(cache.access(AccessKind::Load, 0xa0).first.is_hit());
        assert!(cache.access(AccessKind::Load, 0xb0).first.is_miss());
    }

    #[test]
    fn test_modify_on_cold_cache_misses_then_hits() {
        let mut cache = Cache::new(0, 1, 0);
        let result = cache.access(AccessKind::Modify, 0x0);
        assert_eq!(result.first, Outcome::Miss { evicted: false });
        assert_eq!(result.second, Some(Outcome::Hit));
        assert_eq!(totals(&cache), (1, 1, 0));
    }

    #[test]
    fn test_modify_evicts_when_set_is_occupied() {
        let mut cache = Cache::new(0, 1, 0);
        assert!(cache.access(AccessKind::Load, 0x10).first.is_miss());
        let result = cache.access(AccessKind::Modify, 0x20);
        assert_eq!(result.first, Outcome::Miss { evicted: true });
        assert_eq!(result.second, Some(Outcome::Hit));
        assert_eq!(totals(&cache), (1, 2, 1));
    }

    #[test]
    fn test_modify_on_warm_cache_hits_twice() {
        let mut cache = Cache::new(0, 1, 0);
        assert!(cache.access(AccessKind::Load, 0x0).first.is_miss());
        let result = cache.access(AccessKind::Modify, 0x0);
        assert_eq!(result.first, Outcome::Hit);
        assert_eq!(result.second, Some(Outcome::Hit));
        assert_eq!(totals(&cache), (2, 1, 0));
    }

    #[test]
    fn test_single_access_has_no_second_outcome() {
        let mut cache = Cache::new(1, 1, 1);
        assert_eq!(cache.access(AccessKind::Load, 0x0).second, None);
        assert_eq!(cache.access(AccessKind::Store, 0x0).second, None);
    }

    #[test]
    fn test_address_decomposition_routes_sets() {
        // One set index bit above two block offset bits: 0x0 and 0x4 land in
        // different sets, 0x0 and 0x8 share set 0 under different tags.
        let mut cache = Cache::new(1, 1, 2);
        assert!(cache.access(AccessKind::Load, 0x0).first.is_miss());
        assert!(cache.access(AccessKind::Load, 0x4).first.is_miss());
        assert!(cache.access(AccessKind::Load, 0x0).first.is_hit());
        assert!(cache.access(AccessKind::Load, 0x4).first.is_hit());

        assert_eq!(
            cache.access(AccessKind::Load, 0x8).first,
            Outcome::Miss { evicted: true }
        );
    }

    #[test]
    fn test_block_offset_bits_are_ignored() {
        let mut cache = Cache::new(0, 1, 4);
        assert!(cache.access(AccessKind::Load, 0x103).first.is_miss());
        assert!(cache.access(AccessKind::Load, 0x10f).first.is_hit());
        assert!(cache.access(AccessKind::Load, 0x110).first.is_miss());
    }

    #[test]
    fn test_reset_clears_lines_and_counters() {
        let mut cache = Cache::new(2, 2, 2);
        cache.access(AccessKind::Modify, 0x40);
        cache.access(AccessKind::Load, 0x80);
        cache.reset();
        assert_eq!(totals(&cache), (0, 0, 0));
        assert!(cache.access(AccessKind::Load, 0x40).first.is_miss());
    }

    #[test]
    fn test_geometry_accessors() {
        let cache = Cache::new(3, 4, 5);
        assert_eq!(cache.set_count(), 8);
        assert_eq!(cache.lines_per_set(), 4);
    }

    #[test]
    #[should_panic(expected = "at least one line")]
    fn test_zero_lines_per_set_panics() {
        let _ = Cache::new(0, 0, 0);
    }

    #[test]
    #[should_panic(expected = "room for a tag")]
    fn test_index_bits_consuming_the_address_panics() {
        let _ = Cache::new(32, 1, 32);
    }

    #[test]
    fn test_outcome_display_vocabulary() {
        assert_eq!(Outcome::Hit.to_string(), "hit");
        assert_eq!(Outcome::Miss { evicted: false }.to_string(), "miss");
        assert_eq!(Outcome::Miss { evicted: true }.to_string(), "miss eviction");
        assert_eq!(AccessKind::Modify.to_string(), "M");
    }

    #[test]
    fn test_stats_display_is_the_summary_line() {
        let mut cache = Cache::new(0, 2, 0);
        cache.access(AccessKind::Load, 0x0);
        cache.access(AccessKind::Modify, 0x0);
        assert_eq!(cache.stats().to_string(), "hits:2 misses:1 evictions:0");
    }
}
