//! Tree-structured global sharing with volume compensation and bit-vector
//! feedback.
//!
//! Ranks form a binary heap. One round, in six phases:
//!
//! 1. The root recomputes the *compensation factor* from moving averages of
//!    admitted vs. desired literals and broadcasts it.
//! 2. Every inner node receives one serialised buffer per child; the last
//!    integer of a child buffer is how many rank buffers it aggregates.
//! 3. The literal budget for the outgoing merge is
//!    `compensation * default_buffer_size(aggregated)`, where the default
//!    size grows from `base_size` toward `max_size` as more buffers merge.
//! 4. The child buffers are merged with a selection from the local database
//!    in ascending `(size, lbd)` order through the exact filter (duplicates
//!    dropped); clauses up to the free size are budget-free and units are
//!    always kept.
//! 5. The merged buffer funnels up; the root's own merge becomes the
//!    downward buffer every node forwards to its children, so all nodes of
//!    one epoch hold a byte-identical downward buffer.
//! 6. Every node marks the downward clauses its filter says were already
//!    shared, the bit-vectors OR together up the tree, the root broadcasts
//!    the union, and each node exports only clauses with a zero final bit to
//!    its local consumers, respecting the filter's per-consumer source mask.
//!
//! The round ends by advancing the filter epoch, shrinking the database and
//! the filter, and sleeping whatever remains of `1 / sharings_per_second`.

use crate::bitset::Bitset;
use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use crate::filters::ExactFilter;
use crate::global::base::GlobalBase;
use crate::global::comm::{Comm, ROOT_RANK, TreePosition, tags};
use crate::global::wire;
use crate::runtime::Runtime;
use crate::sharing::entity::{EntityCore, SharingEntity};
use crate::sharing::strategy::{SharingStrategy, StrategyCore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Lower clamp of the compensation factor.
const MIN_COMPENSATION: f32 = 0.1;

/// Tuning of the tree strategy.
#[derive(Debug, Clone)]
pub struct MallobConfig {
    /// Buffer size for a single rank's contribution, in literals.
    pub base_buffer_size: usize,
    /// Asymptotic buffer size as aggregation grows.
    pub max_buffer_size: usize,
    /// LBD cap at import.
    pub lbd_limit: u32,
    /// Size cap at import.
    pub size_limit: usize,
    /// Sharing cadence, rounds per second.
    pub sharings_per_second: u32,
    /// Upper clamp of the compensation factor.
    pub max_compensation: f32,
    /// Reshare period of the exact filter, microseconds.
    pub reshare_period_micros: u64,
    /// Clauses up to this size are budget-free.
    pub free_max_size: usize,
}

struct MallobRound {
    filter: ExactFilter,
    compensation_factor: f32,
    default_buffer_size: usize,
    accumulated_admitted_literals: f32,
    accumulated_desired_literals: f32,
    last_epoch_admitted_literals: usize,
    last_epoch_received_literals: usize,
    estimated_incoming_literals: f32,
    estimated_shared_literals: f32,
    sleep: Duration,
}

/// Mallob-style tree sharing strategy.
pub struct MallobSharing {
    base: GlobalBase,
    tree: TreePosition,
    cfg: MallobConfig,
    round: Mutex<MallobRound>,
}

impl MallobSharing {
    pub fn new(
        db: Arc<dyn ClauseDatabase>,
        comm: Arc<dyn Comm>,
        runtime: Arc<Runtime>,
        cfg: MallobConfig,
    ) -> Arc<Self> {
        let filter = ExactFilter::new(cfg.reshare_period_micros, cfg.sharings_per_second, 63);
        let tree = TreePosition::for_rank(comm.rank(), comm.world_size());
        log::info!(
            "mallob sharing: rank {} parent {:?} children {:?}/{:?}",
            comm.rank(),
            tree.parent,
            tree.first_child,
            tree.second_child
        );
        Arc::new(MallobSharing {
            base: GlobalBase::new(db, comm, runtime, 10_000),
            tree,
            cfg,
            round: Mutex::new(MallobRound {
                filter,
                compensation_factor: 1.0,
                default_buffer_size: 0,
                accumulated_admitted_literals: 0.0,
                accumulated_desired_literals: 0.0,
                last_epoch_admitted_literals: 0,
                last_epoch_received_literals: 0,
                estimated_incoming_literals: 0.0,
                estimated_shared_literals: -1.0,
                sleep: Duration::from_micros(10_000),
            }),
        })
    }

    /// Buffer growth law: starts at `base` for one aggregated buffer and
    /// asymptotically approaches `max` as more buffers merge.
    pub fn compute_buffer_size(base: usize, max: usize, aggregated_buffers: usize) -> usize {
        if base >= max {
            return base;
        }
        let basef = base as f32;
        let maxf = max as f32;
        let exponent = (basef / (basef - maxf)) * (aggregated_buffers as f32 - 1.0);
        (maxf - (maxf - basef) * exponent.exp()).ceil() as usize
    }

    fn compute_compensation(&self, round: &mut MallobRound) {
        if round.estimated_incoming_literals <= 0.0 {
            round.estimated_incoming_literals = round.last_epoch_received_literals as f32;
        }
        if round.estimated_shared_literals <= 0.0 {
            round.estimated_shared_literals = round.last_epoch_admitted_literals as f32;
        } else {
            round.accumulated_admitted_literals = 0.9 * round.accumulated_admitted_literals
                + round.last_epoch_admitted_literals as f32;
            round.accumulated_desired_literals = (0.9 * round.accumulated_desired_literals
                + round
                    .last_epoch_received_literals
                    .min(round.default_buffer_size) as f32)
                .max(1.0);
            round.estimated_incoming_literals = 0.6 * round.estimated_incoming_literals
                + 0.4 * (round.last_epoch_received_literals as f32 / round.compensation_factor);
            round.estimated_shared_literals = 0.6 * round.estimated_shared_literals
                + 0.4 * (round.last_epoch_admitted_literals as f32 / round.compensation_factor);
        }

        round.compensation_factor = if round.estimated_shared_literals <= 0.0 {
            1.0
        } else {
            (round.accumulated_desired_literals - round.accumulated_admitted_literals
                + round.estimated_incoming_literals)
                / round.estimated_shared_literals
        };
        round.compensation_factor = round
            .compensation_factor
            .clamp(MIN_COMPENSATION, self.cfg.max_compensation);
    }

    /// Merge the child buffers with a selection from the local database in
    /// ascending `(size, lbd)` order, deduplicating through the exact
    /// filter. Returns the serialised merge, the number of clauses kept and
    /// the non-free literal count.
    fn merge_with_local(
        &self,
        round: &mut MallobRound,
        child_buffers: Vec<Vec<i32>>,
        literal_budget: usize,
    ) -> (Vec<i32>, usize, usize) {
        let mut sources: Vec<std::iter::Peekable<std::vec::IntoIter<ClauseRef>>> = Vec::new();
        for buffer in child_buffers {
            match wire::deserialize_clauses(&buffer) {
                Ok(decoded) => sources.push(decoded.into_iter().peekable()),
                Err(err) => {
                    log::error!("mallob: corrupt child buffer: {err}");
                    std::process::exit(crate::errors::MPI);
                }
            }
        }

        let db = self.base.core.db();
        let mut local_head = db.get_one_clause();
        let mut budget_exhausted = false;

        let mut merged = Vec::new();
        let mut kept = 0usize;
        let mut non_free_literals = 0usize;

        loop {
            // Pick the best head across the child sources and the local
            // database (children first on ties, for a stable order).
            let mut best: Option<(usize, (usize, u32))> = None; // (source, key)
            for (i, source) in sources.iter_mut().enumerate() {
                if let Some(head) = source.peek() {
                    let key = (head.len(), head.lbd);
                    if best.is_none_or(|(_, k)| key < k) {
                        best = Some((i, key));
                    }
                }
            }
            let local_key = local_head.as_ref().map(|c| (c.len(), c.lbd));
            let take_local = match (local_key, best) {
                (Some(lk), Some((_, bk))) => lk < bk,
                (Some(_), None) => true,
                _ => false,
            };

            let clause = if take_local {
                let clause = local_head.take().expect("local head checked above");
                if !budget_exhausted {
                    local_head = db.get_one_clause();
                }
                clause
            } else if let Some((i, _)) = best {
                sources[i].next().expect("peeked head exists")
            } else {
                break;
            };

            if round.filter.contains(&clause) {
                self.base
                    .gstats
                    .shared_duplicates_avoided
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let free = clause.len() <= self.cfg.free_max_size;
            if !free && non_free_literals + clause.len() > literal_budget {
                // Budget exhausted: stop draining the local database, drop
                // non-free child clauses, but keep letting units through.
                if !budget_exhausted {
                    budget_exhausted = true;
                    if let Some(head) = local_head.take() {
                        db.add_clause(head);
                    }
                }
                if take_local {
                    db.add_clause(clause);
                }
                continue;
            }

            round.filter.insert(&clause);
            if !free {
                non_free_literals += clause.len();
            }
            wire::serialize_clause(&mut merged, &clause);
            kept += 1;
        }

        (merged, kept, non_free_literals)
    }
}

impl SharingEntity for MallobSharing {
    fn entity_core(&self) -> &EntityCore {
        &self.base.core.entity
    }

    /// Called by solvers; the filter is only touched later, from the sharer
    /// thread, when the clause leaves the database.
    fn import_clause(&self, clause: &ClauseRef) -> bool {
        if clause.len() > self.cfg.size_limit || clause.lbd > self.cfg.lbd_limit {
            return false;
        }
        self.base.core.db().add_clause(clause.clone())
    }
}

impl SharingStrategy for MallobSharing {
    fn strategy_core(&self) -> &StrategyCore {
        &self.base.core
    }

    fn do_sharing(&self) -> bool {
        if self.base.check_end() {
            self.base.join_process();
            return true;
        }

        let started = Instant::now();
        let comm = &self.base.comm;
        let mut round = self.round.lock();

        // Phase 1: compensation.
        if self.tree.is_root() {
            self.compute_compensation(&mut round);
        }
        round.compensation_factor = comm.broadcast_f32(ROOT_RANK, round.compensation_factor);
        round.last_epoch_received_literals = 0;
        round.last_epoch_admitted_literals = 0;

        // Phase 2: child aggregation.
        let mut aggregated_buffers: i32 = 1; // our own buffer
        let mut child_buffers = Vec::new();
        for child in self.tree.children() {
            let mut buffer = comm.recv_i32s(child, tags::CLAUSES);
            aggregated_buffers += buffer.pop().unwrap_or(0);
            child_buffers.push(buffer);
        }

        // Phase 3: buffer sizing.
        round.default_buffer_size = Self::compute_buffer_size(
            self.cfg.base_buffer_size,
            self.cfg.max_buffer_size,
            aggregated_buffers.max(1) as usize,
        );
        let literal_budget =
            (round.compensation_factor * round.default_buffer_size as f32).ceil() as usize;

        // Phase 4: merge.
        let (mut merged, kept, non_free_literals) =
            self.merge_with_local(&mut round, child_buffers, literal_budget);
        round.last_epoch_received_literals = non_free_literals;
        self.base.gstats.base.add_shared(kept as u64);
        log::debug!(
            "mallob: budget {literal_budget} ({aggregated_buffers} buffers), merged {kept} clauses, {non_free_literals} non-free literals",
        );

        // Phase 5: funnel up, downward buffer back, forward to children.
        let downward = match self.tree.parent {
            Some(parent) => {
                merged.push(aggregated_buffers);
                comm.send_i32s(parent, tags::CLAUSES, &merged);
                self.base.count_message();
                comm.recv_i32s(parent, tags::CLAUSES)
            }
            None => merged,
        };
        for child in self.tree.children() {
            comm.send_i32s(child, tags::CLAUSES, &downward);
            self.base.count_message();
        }

        // Phase 6: bit-vector feedback.
        let deserialized = match wire::deserialize_clauses(&downward) {
            Ok(deserialized) => deserialized,
            Err(err) => {
                log::error!("mallob: corrupt downward buffer: {err}");
                std::process::exit(crate::errors::MPI);
            }
        };
        let mut bits = Bitset::new(deserialized.len());
        for (i, clause) in deserialized.iter().enumerate() {
            if round.filter.is_shared(clause) {
                bits.set(i, true);
            }
        }
        for child in self.tree.children() {
            let blocks = comm.recv_u64s(child, tags::BITSET);
            bits.merge_or(&Bitset::from_blocks(blocks, deserialized.len()));
        }
        if let Some(parent) = self.tree.parent {
            comm.send_u64s(parent, tags::BITSET, bits.blocks());
            self.base.count_message();
        }
        let final_bits = Bitset::from_blocks(
            comm.broadcast_u64s(ROOT_RANK, bits.blocks().to_vec()),
            deserialized.len(),
        );

        self.base.gstats.base.add_received(deserialized.len() as u64);
        for (i, clause) in deserialized.iter().enumerate() {
            if final_bits.get(i) {
                self.base
                    .gstats
                    .received_duplicates
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }
            {
                // Decoded clauses carry no producer, so the per-consumer
                // source mask is the only echo protection needed here.
                let filter = &round.filter;
                self.base.core.entity.export_clause_with(clause, |cls, client| {
                    let consumer = client.sharing_id().max(0) as u32;
                    if filter.can_consumer_import(cls, consumer) {
                        client.import_clause(cls)
                    } else {
                        false
                    }
                });
            }
            if clause.len() > self.cfg.free_max_size {
                round.last_epoch_admitted_literals += clause.len();
            }
            round.filter.mark_as_shared(clause);
        }

        if self.tree.is_root() {
            log::debug!(
                "mallob: epoch done, admitted {} / received {} literals, compensation {:.3}",
                round.last_epoch_admitted_literals,
                round.last_epoch_received_literals,
                round.compensation_factor
            );
        }

        round.filter.increment_epoch();
        self.base.core.db().shrink();
        round.filter.shrink();

        // Keep the configured cadence: sleep whatever the round left over.
        let cadence = Duration::from_micros(1_000_000 / u64::from(self.cfg.sharings_per_second));
        round.sleep = cadence.saturating_sub(started.elapsed());

        false
    }

    fn sleeping_time(&self) -> Duration {
        self.round.lock().sleep
    }

    fn print_stats(&self) {
        self.base.print_stats("mallob sharing");
    }

    fn stats_json(&self) -> serde_json::Value {
        self.base.gstats.to_json()
    }

    fn as_entity(self: Arc<Self>) -> Arc<dyn SharingEntity> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_growth_law() {
        // One aggregated buffer: exactly the base size.
        assert_eq!(MallobSharing::compute_buffer_size(100, 1000, 1), 100);
        // Growth is monotonic toward the maximum.
        let mut last = 0;
        for count in 1..50 {
            let size = MallobSharing::compute_buffer_size(100, 1000, count);
            assert!(size >= last);
            assert!(size <= 1000);
            last = size;
        }
        // Asymptote: a huge aggregation count approaches the maximum.
        assert_eq!(MallobSharing::compute_buffer_size(100, 1000, 10_000), 1000);
    }
}
