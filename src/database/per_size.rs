//! Size-partitioned database: shortest clauses are served first.

use crate::buffer::ClauseBuffer;
use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use log::warn;

const FALLBACK_MAX_CLAUSE_SIZE: usize = 80;

/// Bounded-push capacity of a bucket; databases only use unbounded adds.
const BUCKET_CAPACITY: usize = 1024;

/// A [`ClauseDatabase`] with one buffer per clause size `1..=max_clause_size`.
///
/// Short clauses are the most valuable to share, so selection walks the
/// buckets in ascending size and stops as soon as the next bucket cannot fit
/// a single clause in the remaining literal budget.
pub struct PerSizeDatabase {
    buckets: Vec<ClauseBuffer>,
    max_clause_size: usize,
}

impl PerSizeDatabase {
    pub fn new(max_clause_size: usize) -> Self {
        let max_clause_size = if max_clause_size == 0 {
            warn!(
                "max clause size 0 is not usable for a per-size database, using {FALLBACK_MAX_CLAUSE_SIZE}"
            );
            FALLBACK_MAX_CLAUSE_SIZE
        } else {
            max_clause_size
        };
        PerSizeDatabase {
            buckets: (0..max_clause_size)
                .map(|_| ClauseBuffer::new(BUCKET_CAPACITY))
                .collect(),
            max_clause_size,
        }
    }

    /// Largest clause size this database admits.
    pub fn max_clause_size(&self) -> usize {
        self.max_clause_size
    }
}

impl ClauseDatabase for PerSizeDatabase {
    fn add_clause(&self, clause: ClauseRef) -> bool {
        let size = clause.len();
        if size == 0 || size > self.max_clause_size {
            return false;
        }
        self.buckets[size - 1].add_clause(clause)
    }

    fn get_one_clause(&self) -> Option<ClauseRef> {
        self.buckets.iter().find_map(|bucket| bucket.get_clause())
    }

    fn give_selection(&self, out: &mut Vec<ClauseRef>, literal_limit: usize) -> usize {
        let mut used = 0;
        for (i, bucket) in self.buckets.iter().enumerate() {
            let size = i + 1;
            if literal_limit - used < size {
                break;
            }
            while literal_limit - used >= size {
                match bucket.get_clause() {
                    Some(clause) => {
                        used += size;
                        out.push(clause);
                    }
                    None => break,
                }
            }
        }
        used
    }

    fn get_clauses(&self, out: &mut Vec<ClauseRef>) {
        for bucket in &self.buckets {
            bucket.get_clauses(out);
        }
    }

    fn size(&self) -> usize {
        self.buckets.iter().map(|b| b.size()).sum()
    }

    fn shrink(&self) -> usize {
        0
    }

    fn clear(&self) {
        for bucket in &self.buckets {
            bucket.clear();
        }
    }
}
