//! Occupancy bit-vector addressed by tree node index
//!
//! One bit per node. The buddy allocator owns two of these: one for
//! "unavailable at this order" and one for the exact nodes handed out.

use alloc::vec;
use alloc::vec::Vec;
use core::ops::RangeInclusive;

const WORD_BITS: usize = u64::BITS as usize;

/// Fixed-size bit-vector.
pub struct OccupancyTracker {
    words: Vec<u64>,
    len: usize,
}

impl OccupancyTracker {
    /// Create a tracker with `len` bits, all clear.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Number of addressable bits.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len, "bit {} out of range {}", idx, self.len);
        self.words[idx / WORD_BITS] & (1 << (idx % WORD_BITS)) != 0
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        debug_assert!(idx < self.len, "bit {} out of range {}", idx, self.len);
        self.words[idx / WORD_BITS] |= 1 << (idx % WORD_BITS);
    }

    #[inline]
    pub fn clear(&mut self, idx: usize) {
        debug_assert!(idx < self.len, "bit {} out of range {}", idx, self.len);
        self.words[idx / WORD_BITS] &= !(1 << (idx % WORD_BITS));
    }

    /// Set the bit only if it is currently clear.
    ///
    /// Returns `true` if this call set the bit.
    #[inline]
    pub fn test_and_set(&mut self, idx: usize) -> bool {
        if self.test(idx) {
            return false;
        }
        self.set(idx);
        true
    }

    /// Set every bit in `range`.
    pub fn set_range(&mut self, range: RangeInclusive<usize>) {
        self.apply_range(range, |word, mask| *word |= mask);
    }

    /// Clear every bit in `range`.
    pub fn clear_range(&mut self, range: RangeInclusive<usize>) {
        self.apply_range(range, |word, mask| *word &= !mask);
    }

    /// Index of the lowest clear bit in `range`, if any.
    pub fn first_clear_in(&self, range: RangeInclusive<usize>) -> Option<usize> {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return None;
        }
        debug_assert!(end < self.len, "range end {} out of range {}", end, self.len);

        let mut idx = start;
        while idx <= end {
            let word_idx = idx / WORD_BITS;
            let bit = idx % WORD_BITS;
            // Treat bits below `idx` as set so they are skipped.
            let word = self.words[word_idx] | low_mask(bit);
            if word != u64::MAX {
                let found = word_idx * WORD_BITS + word.trailing_ones() as usize;
                return (found <= end).then_some(found);
            }
            idx = (word_idx + 1) * WORD_BITS;
        }
        None
    }

    /// Whether any bit in `range` is clear. Never mutates.
    pub fn any_clear_in(&self, range: RangeInclusive<usize>) -> bool {
        self.first_clear_in(range).is_some()
    }

    /// Number of set bits in `range`.
    pub fn count_set_in(&self, range: RangeInclusive<usize>) -> usize {
        let mut count = 0;
        self.for_each_word(range, |word, mask| count += (word & mask).count_ones() as usize);
        count
    }

    /// Number of set bits overall.
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    fn apply_range(&mut self, range: RangeInclusive<usize>, mut op: impl FnMut(&mut u64, u64)) {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return;
        }
        debug_assert!(end < self.len, "range end {} out of range {}", end, self.len);

        let first_word = start / WORD_BITS;
        let last_word = end / WORD_BITS;
        for word_idx in first_word..=last_word {
            let mask = range_mask(word_idx, start, end);
            op(&mut self.words[word_idx], mask);
        }
    }

    fn for_each_word(&self, range: RangeInclusive<usize>, mut op: impl FnMut(u64, u64)) {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return;
        }
        for word_idx in start / WORD_BITS..=end / WORD_BITS {
            op(self.words[word_idx], range_mask(word_idx, start, end));
        }
    }
}

/// Mask with the lowest `bits` bits set.
#[inline]
const fn low_mask(bits: usize) -> u64 {
    if bits >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Bits of word `word_idx` that fall inside `[start, end]`.
#[inline]
fn range_mask(word_idx: usize, start: usize, end: usize) -> u64 {
    let word_start = word_idx * WORD_BITS;
    let lo = start.saturating_sub(word_start);
    let hi = (end - word_start).min(WORD_BITS - 1);
    low_mask(hi + 1) & !low_mask(lo)
}
