//! Lock-free concurrent Bloom filter over clause literal sets.

use crate::clause::lookup3_hash_clause;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default filter width: 2^20 bits.
const DEFAULT_NUM_BITS: usize = 1 << 20;

/// Hash function over a literal slice.
pub type ClauseHashFn = fn(&[i32]) -> u64;

/// A fixed-size Bloom filter whose bit array is a vector of atomic words, so
/// concurrent inserts and probes need no outer lock. False positives are
/// possible, false negatives are not (for the lifetime of the filter).
pub struct BloomFilter {
    bits: Vec<AtomicU64>,
    num_bits: usize,
    hash_functions: Vec<ClauseHashFn>,
}

const BITS_PER_WORD: usize = u64::BITS as usize;

impl BloomFilter {
    /// Filter with the default width and the lookup3 clause hash.
    pub fn new() -> Self {
        Self::with_bits(DEFAULT_NUM_BITS)
    }

    /// Filter of `num_bits` bits with the lookup3 clause hash.
    pub fn with_bits(num_bits: usize) -> Self {
        Self::with_hashes(num_bits, vec![lookup3_hash_clause])
    }

    /// Fully custom filter. Panics without at least one hash function.
    pub fn with_hashes(num_bits: usize, hash_functions: Vec<ClauseHashFn>) -> Self {
        assert!(
            !hash_functions.is_empty(),
            "a bloom filter needs at least one hash function"
        );
        let num_bits = num_bits.max(BITS_PER_WORD);
        BloomFilter {
            bits: (0..num_bits.div_ceil(BITS_PER_WORD))
                .map(|_| AtomicU64::new(0))
                .collect(),
            num_bits,
            hash_functions,
        }
    }

    fn probe(&self, hash: u64) -> (usize, u64) {
        let bit = (hash % self.num_bits as u64) as usize;
        (bit / BITS_PER_WORD, 1u64 << (bit % BITS_PER_WORD))
    }

    /// Insert a clause (by literal content).
    pub fn insert(&self, lits: &[i32]) {
        for hash_fn in &self.hash_functions {
            let (word, mask) = self.probe(hash_fn(lits));
            self.bits[word].fetch_or(mask, Ordering::AcqRel);
        }
    }

    /// True when every probed bit is already set (possible false positive).
    pub fn contains(&self, lits: &[i32]) -> bool {
        self.hash_functions.iter().all(|hash_fn| {
            let (word, mask) = self.probe(hash_fn(lits));
            self.bits[word].load(Ordering::Acquire) & mask != 0
        })
    }

    /// Insert and report how many probed bits were already set: 0 for a
    /// first sighting, up to the number of hash functions for a likely
    /// duplicate.
    pub fn test_and_insert(&self, lits: &[i32]) -> u32 {
        let mut already_set = 0;
        for hash_fn in &self.hash_functions {
            let (word, mask) = self.probe(hash_fn(lits));
            if self.bits[word].fetch_or(mask, Ordering::AcqRel) & mask != 0 {
                already_set += 1;
            }
        }
        already_set
    }

    /// Insert unless already present; true when the clause was (probably)
    /// seen before.
    pub fn contains_or_insert(&self, lits: &[i32]) -> bool {
        self.test_and_insert(lits) == self.hash_functions.len() as u32
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_reports_zero() {
        let filter = BloomFilter::new();
        assert_eq!(filter.test_and_insert(&[1, -2, 3]), 0);
        assert_eq!(filter.test_and_insert(&[1, -2, 3]), 1);
        assert!(filter.contains(&[1, -2, 3]));
        // Order-independent, like clause equality.
        assert!(filter.contains(&[3, 1, -2]));
    }

    #[test]
    fn unseen_clauses_are_absent() {
        let filter = BloomFilter::new();
        filter.insert(&[1, 2]);
        assert!(!filter.contains(&[5, 6, 7]));
    }
}
