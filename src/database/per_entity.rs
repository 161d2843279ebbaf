//! Producer-partitioned database.

use crate::buffer::ClauseBuffer;
use crate::clause::ClauseRef;
use crate::database::{ClauseDatabase, PerSizeDatabase};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A [`ClauseDatabase`] holding one buffer per producing entity.
///
/// Buffers are lock-free, so clause traffic only takes the read lock; the
/// write lock is needed solely to create the bucket the first time a
/// producer shows up. Selection pours every bucket through a transient
/// [`PerSizeDatabase`] so the outgoing order is still shortest-first across
/// all producers.
pub struct PerEntityDatabase {
    buckets: RwLock<HashMap<i32, ClauseBuffer>>,
    max_clause_size: usize,
}

impl PerEntityDatabase {
    pub fn new(max_clause_size: usize) -> Self {
        PerEntityDatabase {
            buckets: RwLock::new(HashMap::new()),
            max_clause_size,
        }
    }
}

impl ClauseDatabase for PerEntityDatabase {
    fn add_clause(&self, clause: ClauseRef) -> bool {
        let producer = clause.from;
        {
            let buckets = self.buckets.read();
            if let Some(bucket) = buckets.get(&producer) {
                return bucket.add_clause(clause);
            }
        }
        // First clause of this producer: upgrade to the write lock. Another
        // thread may have created the bucket in between, entry() handles it.
        let mut buckets = self.buckets.write();
        buckets
            .entry(producer)
            .or_insert_with(|| ClauseBuffer::new(self.max_clause_size.max(1)))
            .add_clause(clause)
    }

    fn get_one_clause(&self) -> Option<ClauseRef> {
        let buckets = self.buckets.read();
        buckets.values().find_map(|bucket| bucket.get_clause())
    }

    fn give_selection(&self, out: &mut Vec<ClauseRef>, literal_limit: usize) -> usize {
        let staging = PerSizeDatabase::new(self.max_clause_size);
        let mut drained = Vec::new();
        {
            let buckets = self.buckets.read();
            for bucket in buckets.values() {
                drained.clear();
                bucket.get_clauses(&mut drained);
                for clause in drained.drain(..) {
                    staging.add_clause(clause);
                }
            }
        }
        staging.give_selection(out, literal_limit)
    }

    fn get_clauses(&self, out: &mut Vec<ClauseRef>) {
        let buckets = self.buckets.read();
        for bucket in buckets.values() {
            bucket.get_clauses(out);
        }
    }

    fn size(&self) -> usize {
        let buckets = self.buckets.read();
        buckets.values().map(|b| b.size()).sum()
    }

    fn shrink(&self) -> usize {
        0
    }

    fn clear(&self) {
        let buckets = self.buckets.write();
        for bucket in buckets.values() {
            bucket.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;

    fn cls(lits: &[i32], from: i32) -> ClauseRef {
        Clause::from_lits(lits, 2, from).unwrap()
    }

    #[test]
    fn buckets_are_created_per_producer() {
        let db = PerEntityDatabase::new(10);
        db.add_clause(cls(&[1, 2], 0));
        db.add_clause(cls(&[3], 1));
        db.add_clause(cls(&[4, 5, 6], 1));
        assert_eq!(db.size(), 3);
        assert_eq!(db.buckets.read().len(), 2);
    }

    #[test]
    fn selection_merges_producers_shortest_first() {
        let db = PerEntityDatabase::new(10);
        db.add_clause(cls(&[1, 2, 3], 0));
        db.add_clause(cls(&[4], 1));
        db.add_clause(cls(&[5, 6], 2));

        let mut out = Vec::new();
        let used = db.give_selection(&mut out, 100);
        assert_eq!(used, 6);
        let sizes: Vec<usize> = out.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
    }
}
