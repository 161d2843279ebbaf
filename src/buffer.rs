//! Lock-free clause FIFO.
//!
//! [`ClauseBuffer`] is the storage primitive under every clause database: a
//! multi-producer/multi-consumer unbounded queue of clause handles with an
//! atomic element counter. The counter is updated with release semantics
//! after each successful push/pop so `size()` is a consistent (if slightly
//! stale) view for the selection heuristics.
//!
//! The bounded push variant fails fast once the buffer holds `capacity`
//! clauses; the engine import path uses it to signal back-pressure instead of
//! letting a slow consumer accumulate unbounded advisory clauses.

use crate::clause::ClauseRef;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Multi-producer/multi-consumer FIFO of clause handles.
pub struct ClauseBuffer {
    queue: SegQueue<ClauseRef>,
    len: AtomicUsize,
    capacity: usize,
}

impl ClauseBuffer {
    /// Create a buffer whose bounded push admits at most `capacity` clauses.
    ///
    /// The plain [`add_clause`](Self::add_clause) path is unbounded; the
    /// capacity only limits [`try_add_clause_bounded`](Self::try_add_clause_bounded).
    pub fn new(capacity: usize) -> Self {
        ClauseBuffer {
            queue: SegQueue::new(),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Push a clause. The handle moves into the queue, so the refcount held
    /// by the buffer is the caller's transferred one.
    pub fn add_clause(&self, clause: ClauseRef) -> bool {
        self.queue.push(clause);
        self.len.fetch_add(1, Ordering::Release);
        true
    }

    /// Push every clause of `clauses`, returning how many were added.
    pub fn add_clauses(&self, clauses: &[ClauseRef]) -> usize {
        for clause in clauses {
            self.add_clause(clause.clone());
        }
        clauses.len()
    }

    /// Bounded push: fails once the buffer already holds `capacity` clauses.
    /// The rejected handle is dropped here, releasing its refcount.
    pub fn try_add_clause_bounded(&self, clause: ClauseRef) -> bool {
        if self.len.load(Ordering::Acquire) >= self.capacity {
            drop(clause);
            return false;
        }
        self.add_clause(clause)
    }

    /// Bounded bulk push; stops at the first rejection and returns the
    /// number of clauses actually added.
    pub fn try_add_clauses_bounded(&self, clauses: &[ClauseRef]) -> usize {
        for (i, clause) in clauses.iter().enumerate() {
            if !self.try_add_clause_bounded(clause.clone()) {
                return i;
            }
        }
        clauses.len()
    }

    /// Pop one clause, FIFO order.
    pub fn get_clause(&self) -> Option<ClauseRef> {
        let clause = self.queue.pop()?;
        self.len.fetch_sub(1, Ordering::Release);
        Some(clause)
    }

    /// Drain every currently queued clause into `out`.
    pub fn get_clauses(&self, out: &mut Vec<ClauseRef>) {
        while let Some(clause) = self.get_clause() {
            out.push(clause);
        }
    }

    /// Number of queued clauses.
    pub fn size(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// True when no clause is queued.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drop every queued clause, releasing their handles.
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
        self.len.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;
    use std::sync::Arc;

    fn cls(lits: &[i32]) -> ClauseRef {
        Clause::from_lits(lits, 2, 0).unwrap()
    }

    #[test]
    fn fifo_order_and_size() {
        let buf = ClauseBuffer::new(16);
        buf.add_clause(cls(&[1]));
        buf.add_clause(cls(&[2, 3]));
        assert_eq!(buf.size(), 2);
        assert_eq!(buf.get_clause().unwrap().lits(), &[1]);
        assert_eq!(buf.get_clause().unwrap().lits(), &[2, 3]);
        assert!(buf.get_clause().is_none());
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn bounded_push_signals_back_pressure() {
        let buf = ClauseBuffer::new(2);
        assert!(buf.try_add_clause_bounded(cls(&[1])));
        assert!(buf.try_add_clause_bounded(cls(&[2])));
        assert!(!buf.try_add_clause_bounded(cls(&[3])));
        assert_eq!(buf.size(), 2);
        // A rejected push must not leak its handle.
        let c = cls(&[4]);
        let witness = Arc::clone(&c);
        assert!(!buf.try_add_clause_bounded(c));
        assert_eq!(Arc::strong_count(&witness), 1);
    }

    #[test]
    fn clear_releases_everything() {
        let buf = ClauseBuffer::new(4);
        let c = cls(&[1, 2]);
        buf.add_clause(Arc::clone(&c));
        buf.add_clause(Arc::clone(&c));
        assert_eq!(Arc::strong_count(&c), 3);
        buf.clear();
        assert_eq!(Arc::strong_count(&c), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn concurrent_producers_and_consumers_keep_the_count() {
        let buf = Arc::new(ClauseBuffer::new(1 << 20));
        let mut handles = Vec::new();
        for t in 0..4 {
            let buf = Arc::clone(&buf);
            handles.push(std::thread::spawn(move || {
                for i in 0..500 {
                    buf.add_clause(cls(&[t * 1000 + i + 1]));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut drained = Vec::new();
        buf.get_clauses(&mut drained);
        assert_eq!(drained.len(), 2000);
        assert_eq!(buf.size(), 0);
    }
}
