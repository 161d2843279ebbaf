//! Clause databases.
//!
//! A clause database is where a sharing strategy parks exported clauses
//! between rounds. All shapes share one trait so strategies stay agnostic of
//! the organisation:
//!
//! - [`SingleBufferDatabase`] -- one FIFO, selection in arrival order.
//! - [`PerSizeDatabase`] -- one FIFO per clause size, shortest first.
//! - [`PerEntityDatabase`] -- one FIFO per producer, merged at selection.
//! - [`MallobDatabase`] -- (size, lbd)-indexed buckets under a hard literal
//!   capacity with an explicit shrink pass.
//!
//! Databases are shared across producer threads; every operation takes
//! `&self` and relies on the lock-free buffers plus (where structure mutates)
//! an internal reader-writer lock.

mod mallob;
mod per_entity;
mod per_size;
mod single_buffer;

pub use mallob::MallobDatabase;
pub use per_entity::PerEntityDatabase;
pub use per_size::PerSizeDatabase;
pub use single_buffer::SingleBufferDatabase;

use crate::clause::ClauseRef;
use log::{info, warn};
use std::sync::Arc;

/// Common interface of every clause container.
pub trait ClauseDatabase: Send + Sync {
    /// Store a clause. Returns false when the database rejects it (over the
    /// size limit, over capacity, or shed under contention).
    fn add_clause(&self, clause: ClauseRef) -> bool;

    /// Take the best single clause currently stored, if any.
    fn get_one_clause(&self) -> Option<ClauseRef>;

    /// Fill `out` with a selection of at most `literal_limit` literals,
    /// best clauses first. Returns the number of literals taken.
    fn give_selection(&self, out: &mut Vec<ClauseRef>, literal_limit: usize) -> usize;

    /// Drain every stored clause into `out`.
    fn get_clauses(&self, out: &mut Vec<ClauseRef>);

    /// Number of stored clauses.
    fn size(&self) -> usize;

    /// Reduce the database below its capacity, returning the number of
    /// clauses removed. A no-op for the unbounded shapes.
    fn shrink(&self) -> usize;

    /// Remove every stored clause.
    fn clear(&self);
}

/// Construction parameters shared by the database factory.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseOptions {
    /// Largest admissible clause for the size-limited shapes.
    pub max_clause_size: usize,
    /// Literal (Mallob) or clause (single buffer) capacity.
    pub capacity: usize,
    /// Number of LBD partitions per size in the Mallob shape.
    pub mallob_partitioning_lbd: usize,
    /// Clauses up to this size are free at Mallob selection.
    pub mallob_free_max_size: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        DatabaseOptions {
            max_clause_size: 60,
            capacity: 10_000,
            mallob_partitioning_lbd: 2,
            mallob_free_max_size: 1,
        }
    }
}

/// Build a database from its selection character: `s`ingle buffer, per-size
/// (`d`), per-`e`ntity or `m`allob. Unknown characters fall back to per-size.
pub fn create_database(kind: char, opts: &DatabaseOptions) -> Arc<dyn ClauseDatabase> {
    match kind {
        's' => {
            info!("db: single buffer, clause capacity {}", opts.capacity);
            Arc::new(SingleBufferDatabase::new(opts.capacity))
        }
        'd' => {
            info!("db: per-size, max clause size {}", opts.max_clause_size);
            Arc::new(PerSizeDatabase::new(opts.max_clause_size))
        }
        'e' => {
            info!("db: per-entity, max clause size {}", opts.max_clause_size);
            Arc::new(PerEntityDatabase::new(opts.max_clause_size))
        }
        'm' => {
            info!(
                "db: mallob, max clause size {}, lbd partitions {}, literal capacity {}, free size {}",
                opts.max_clause_size,
                opts.mallob_partitioning_lbd,
                opts.capacity,
                opts.mallob_free_max_size
            );
            Arc::new(MallobDatabase::new(
                opts.max_clause_size,
                opts.mallob_partitioning_lbd,
                opts.capacity,
                opts.mallob_free_max_size,
            ))
        }
        other => {
            warn!("unknown database kind '{other}', defaulting to per-size");
            Arc::new(PerSizeDatabase::new(opts.max_clause_size))
        }
    }
}

/// True when `kind` names one of the four database shapes.
pub fn is_valid_database_kind(kind: char) -> bool {
    matches!(kind, 's' | 'd' | 'e' | 'm')
}
