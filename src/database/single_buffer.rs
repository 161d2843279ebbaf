//! The simplest database shape: one FIFO buffer.

use crate::buffer::ClauseBuffer;
use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;

/// A [`ClauseDatabase`] that is a thin wrapper around a single
/// [`ClauseBuffer`]; selection is arrival order.
pub struct SingleBufferDatabase {
    buffer: ClauseBuffer,
}

impl SingleBufferDatabase {
    pub fn new(capacity: usize) -> Self {
        SingleBufferDatabase {
            buffer: ClauseBuffer::new(capacity),
        }
    }
}

impl ClauseDatabase for SingleBufferDatabase {
    fn add_clause(&self, clause: ClauseRef) -> bool {
        self.buffer.add_clause(clause)
    }

    fn get_one_clause(&self) -> Option<ClauseRef> {
        self.buffer.get_clause()
    }

    fn give_selection(&self, out: &mut Vec<ClauseRef>, literal_limit: usize) -> usize {
        let mut taken = 0;
        while let Some(clause) = self.buffer.get_clause() {
            if taken + clause.len() <= literal_limit {
                taken += clause.len();
                out.push(clause);
            } else {
                // Would overshoot: requeue and stop.
                self.buffer.add_clause(clause);
                break;
            }
        }
        taken
    }

    fn get_clauses(&self, out: &mut Vec<ClauseRef>) {
        self.buffer.get_clauses(out);
    }

    fn size(&self) -> usize {
        self.buffer.size()
    }

    fn shrink(&self) -> usize {
        0
    }

    fn clear(&self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;

    #[test]
    fn selection_is_fifo_until_the_limit() {
        let db = SingleBufferDatabase::new(100);
        db.add_clause(Clause::from_lits(&[1, 2, 3], 2, 0).unwrap());
        db.add_clause(Clause::from_lits(&[4, 5], 2, 0).unwrap());
        db.add_clause(Clause::from_lits(&[6], 0, 0).unwrap());

        let mut out = Vec::new();
        let taken = db.give_selection(&mut out, 4);
        assert_eq!(taken, 3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].lits(), &[1, 2, 3]);
        // The clause that would overshoot stays queued.
        assert_eq!(db.size(), 2);
    }
}
