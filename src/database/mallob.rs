//! Size x LBD partitioned database with a hard literal capacity.
//!
//! The index formula places a clause of a given size and LBD at
//! `(size - 1) * P + min(lbd - 2, P - 1)` where `P` is the number of LBD
//! partitions per size; LBD values past the last partition all collapse into
//! it. Lower index means better clause, and `worst_index` tracks the worst
//! bucket currently populated so an over-capacity add can still be admitted
//! when it beats the current worst.
//!
//! Additions take a *try* read lock on the shrink mutex: when a shrink is
//! running, the clause is parked in a missed-additions buffer and reinjected
//! at the start of the next shrink instead of blocking the producer.

use crate::buffer::ClauseBuffer;
use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use log::debug;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

const MIN_LBD: usize = 2;
const UNIT_SIZE: usize = 1;
const MISSED_ADDITIONS_CAPACITY: usize = 1000;

/// Mallob-style adaptive clause database.
pub struct MallobDatabase {
    buckets: Vec<ClauseBuffer>,
    max_clause_size: usize,
    partitioning_lbd: usize,
    /// Clauses up to this size do not count against the selection budget.
    free_max_size: usize,
    /// Hard capacity in literals.
    capacity: usize,
    /// Literals currently stored; transiently negative while concurrent
    /// consumers race additions, corrected under the shrink lock.
    current_literal_size: AtomicI64,
    /// Index of the worst populated bucket; only grows outside of shrink.
    worst_index: AtomicUsize,
    /// Guards shrink (write) against add/selection (read).
    shrink_lock: RwLock<()>,
    /// Clauses that arrived while a shrink held the write lock.
    missed_additions: ClauseBuffer,
}

impl MallobDatabase {
    /// Panics when any geometry parameter is zero; these are configuration
    /// errors, not runtime conditions.
    pub fn new(
        max_clause_size: usize,
        partitioning_lbd: usize,
        capacity: usize,
        free_max_size: usize,
    ) -> Self {
        assert!(max_clause_size > 0, "max clause size must be positive");
        assert!(partitioning_lbd > 0, "lbd partition count must be positive");
        assert!(free_max_size > 0, "free max size must be positive");
        let bucket_count = max_clause_size * partitioning_lbd;
        MallobDatabase {
            buckets: (0..bucket_count)
                .map(|_| ClauseBuffer::new(MISSED_ADDITIONS_CAPACITY))
                .collect(),
            max_clause_size,
            partitioning_lbd,
            free_max_size,
            capacity,
            current_literal_size: AtomicI64::new(0),
            worst_index: AtomicUsize::new(1),
            shrink_lock: RwLock::new(()),
            missed_additions: ClauseBuffer::new(MISSED_ADDITIONS_CAPACITY),
        }
    }

    /// Bucket index of a clause; units always map to bucket 0.
    fn index_of(&self, size: usize, lbd: usize) -> usize {
        debug_assert!(size >= UNIT_SIZE && (size == UNIT_SIZE || lbd >= MIN_LBD));
        (size - 1) * self.partitioning_lbd
            + (lbd.saturating_sub(MIN_LBD)).min(self.partitioning_lbd - 1)
    }

    /// Clause size stored by bucket `index`.
    fn size_from_index(&self, index: usize) -> usize {
        if index == 0 {
            UNIT_SIZE
        } else {
            index / self.partitioning_lbd + 1
        }
    }

    /// Literals currently accounted for.
    pub fn current_literal_size(&self) -> i64 {
        self.current_literal_size.load(Ordering::Acquire)
    }

    /// Worst populated bucket index.
    pub fn worst_index(&self) -> usize {
        self.worst_index.load(Ordering::Acquire)
    }

    /// Hard literal capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ClauseDatabase for MallobDatabase {
    fn add_clause(&self, clause: ClauseRef) -> bool {
        let size = clause.len();
        let lbd = clause.lbd as usize;
        debug_assert!(size > 0);

        if size > self.max_clause_size {
            return false;
        }

        // A running shrink owns the write lock; park the clause instead of
        // stalling the producer.
        let Some(_guard) = self.shrink_lock.try_read() else {
            self.missed_additions.try_add_clause_bounded(clause);
            return false;
        };

        if size == UNIT_SIZE {
            // Units are always admitted and never shrunk, so they stay out
            // of the literal accounting: counting storage that can never be
            // reclaimed would make the shrink invariant unsatisfiable.
            self.buckets[0].add_clause(clause);
            return true;
        }

        let index = self.index_of(size, lbd);
        let new_size = self.current_literal_size.load(Ordering::Acquire) + size as i64;
        let mut worst = self.worst_index.load(Ordering::Acquire);

        // Admit while under capacity, or when strictly better than the worst
        // bucket currently populated; a transient overshoot is corrected at
        // the next shrink.
        if new_size <= self.capacity as i64 || index < worst {
            self.buckets[index].add_clause(clause);
            self.current_literal_size
                .fetch_add(size as i64, Ordering::AcqRel);
            while index > worst {
                match self.worst_index.compare_exchange_weak(
                    worst,
                    index,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(current) => worst = current,
                }
            }
            true
        } else {
            false
        }
    }

    fn get_one_clause(&self) -> Option<ClauseRef> {
        let _guard = self.shrink_lock.read();
        let worst = self.worst_index.load(Ordering::Acquire);
        for bucket in &self.buckets[..=worst.min(self.buckets.len() - 1)] {
            if let Some(clause) = bucket.get_clause() {
                if !clause.is_unit() {
                    self.current_literal_size
                        .fetch_sub(clause.len() as i64, Ordering::AcqRel);
                }
                return Some(clause);
            }
        }
        None
    }

    fn give_selection(&self, out: &mut Vec<ClauseRef>, literal_limit: usize) -> usize {
        let _guard = self.shrink_lock.read();
        let mut selected = 0;
        let mut consumed = 0;

        // Units first; always free for the budget and not part of the
        // literal accounting.
        while selected < literal_limit {
            let Some(clause) = self.buckets[0].get_clause() else {
                break;
            };
            out.push(clause);
        }

        for bucket in &self.buckets[1..] {
            if selected >= literal_limit {
                break;
            }
            while selected < literal_limit {
                let Some(clause) = bucket.get_clause() else {
                    break;
                };
                consumed += clause.len();
                if clause.len() > self.free_max_size {
                    selected += clause.len();
                }
                out.push(clause);
            }
        }

        self.current_literal_size
            .fetch_sub(consumed as i64, Ordering::AcqRel);
        selected
    }

    fn get_clauses(&self, out: &mut Vec<ClauseRef>) {
        let _guard = self.shrink_lock.read();
        let start = out.len();
        let worst = self.worst_index.load(Ordering::Acquire);
        for bucket in &self.buckets[..=worst.min(self.buckets.len() - 1)] {
            bucket.get_clauses(out);
        }
        let consumed: usize = out[start..]
            .iter()
            .filter(|c| !c.is_unit())
            .map(|c| c.len())
            .sum();
        self.current_literal_size
            .fetch_sub(consumed as i64, Ordering::AcqRel);
    }

    fn size(&self) -> usize {
        self.buckets.iter().map(|b| b.size()).sum()
    }

    fn shrink(&self) -> usize {
        // Reinject additions missed during the previous shrink before taking
        // the write lock, so they are subject to this shrink's capacity pass.
        if !self.missed_additions.is_empty() {
            debug!(
                "reinjecting {} clauses missed during the previous shrink",
                self.missed_additions.size()
            );
            while let Some(clause) = self.missed_additions.get_clause() {
                self.add_clause(clause);
            }
        }

        let _guard = self.shrink_lock.write();

        let mut current = self.current_literal_size.load(Ordering::Acquire);
        debug_assert!(current >= 0, "literal count must settle under the lock");
        let mut removed_total = 0usize;
        let mut new_worst = 1usize;

        // Walk back-to-front; bucket 0 (units) is never shrunk.
        for index in (1..self.buckets.len()).rev() {
            let bucket = &self.buckets[index];
            let bucket_clauses = bucket.size();
            if bucket_clauses == 0 {
                continue;
            }

            if current > self.capacity as i64 {
                let clause_size = self.size_from_index(index);
                let bucket_literals = (bucket_clauses * clause_size) as i64;
                if current - bucket_literals < self.capacity as i64 {
                    // Dropping the whole bucket would undershoot: pop one by
                    // one until under capacity.
                    let mut removed = 0usize;
                    while current > self.capacity as i64 {
                        if bucket.get_clause().is_some() {
                            removed += 1;
                            current -= clause_size as i64;
                        } else {
                            break;
                        }
                    }
                    removed_total += removed;
                } else {
                    current -= bucket_literals;
                    removed_total += bucket_clauses;
                    bucket.clear();
                }
            }

            if !bucket.is_empty() {
                new_worst = index;
                break;
            }
        }

        debug_assert!(current <= self.capacity as i64);
        self.current_literal_size.store(current, Ordering::Release);
        self.worst_index.store(new_worst, Ordering::Release);
        removed_total
    }

    fn clear(&self) {
        let _guard = self.shrink_lock.write();
        for bucket in &self.buckets {
            bucket.clear();
        }
        self.missed_additions.clear();
        self.current_literal_size.store(0, Ordering::Release);
        self.worst_index.store(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;

    fn cls(lits: &[i32], lbd: u32) -> ClauseRef {
        Clause::from_lits(lits, lbd, 0).unwrap()
    }

    #[test]
    fn index_formula() {
        let db = MallobDatabase::new(10, 2, 1000, 1);
        assert_eq!(db.index_of(1, 0), 0);
        assert_eq!(db.index_of(2, 2), 2);
        assert_eq!(db.index_of(2, 3), 3);
        assert_eq!(db.index_of(2, 9), 3);
        assert_eq!(db.index_of(3, 2), 4);
        assert_eq!(db.size_from_index(0), 1);
        assert_eq!(db.size_from_index(3), 2);
        assert_eq!(db.size_from_index(4), 3);
    }

    #[test]
    #[should_panic]
    fn zero_partitioning_panics() {
        MallobDatabase::new(10, 0, 1000, 1);
    }

    #[test]
    fn units_are_always_admitted() {
        let db = MallobDatabase::new(10, 2, 2, 1);
        db.add_clause(cls(&[1, 2], 2));
        // Capacity reached, but units bypass it.
        for v in 3..20 {
            assert!(db.add_clause(cls(&[v], 0)));
        }
    }

    #[test]
    fn over_capacity_add_needs_a_better_index() {
        let db = MallobDatabase::new(10, 2, 6, 1);
        assert!(db.add_clause(cls(&[1, 2, 3], 4))); // index 5
        assert!(db.add_clause(cls(&[4, 5, 6], 4))); // capacity now full
        // Worse or equal index over capacity is rejected.
        assert!(!db.add_clause(cls(&[7, 8, 9], 4)));
        // A strictly better clause still gets in.
        assert!(db.add_clause(cls(&[10, 11], 2))); // index 2 < worst 5
        assert_eq!(db.worst_index(), 5);
    }

    #[test]
    fn shrink_restores_the_capacity_invariant() {
        let db = MallobDatabase::new(10, 2, 6, 1);
        db.add_clause(cls(&[1, 2, 3], 4));
        db.add_clause(cls(&[4, 5, 6], 4));
        db.add_clause(cls(&[10, 11], 2));
        assert!(db.current_literal_size() > db.capacity() as i64);

        let removed = db.shrink();
        assert!(removed >= 1);
        assert!(db.current_literal_size() <= db.capacity() as i64);
        // Worst now points at the first populated non-unit bucket.
        assert_eq!(db.worst_index(), 5);
    }

    #[test]
    fn shrink_never_evicts_units() {
        let db = MallobDatabase::new(10, 2, 4, 1);
        for v in 1..=8 {
            db.add_clause(cls(&[v], 0));
        }
        db.add_clause(cls(&[1, 2, 3], 2));
        db.add_clause(cls(&[4, 5, 6], 2));
        db.shrink();
        let mut all = Vec::new();
        db.get_clauses(&mut all);
        assert!(all.iter().filter(|c| c.is_unit()).count() == 8);
    }

    #[test]
    fn selection_is_best_first_and_frees_small_clauses() {
        let db = MallobDatabase::new(10, 2, 1000, 1);
        db.add_clause(cls(&[1, 2, 3], 5));
        db.add_clause(cls(&[4, 5], 2));
        db.add_clause(cls(&[6], 0));

        let mut out = Vec::new();
        let selected = db.give_selection(&mut out, 100);
        let sizes: Vec<usize> = out.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
        // The unit is free, so only the two non-units count.
        assert_eq!(selected, 5);
        assert_eq!(db.current_literal_size(), 0);
    }
}
