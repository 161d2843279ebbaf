//! Flat global sharing over an all-gather collective.
//!
//! Every rank contributes one fixed-size slot of serialised clauses per
//! round (zero-terminated, zero-padded) and receives everyone else's slot.
//! Duplicate suppression is a Bloom filter spanning both directions: what a
//! rank has already sent it will not send again, and what it has already
//! seen it will not re-import.

use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use crate::filters::BloomFilter;
use crate::global::base::{GlobalBase, serialize_from_database};
use crate::global::comm::Comm;
use crate::global::wire;
use crate::runtime::Runtime;
use crate::sharing::entity::{EntityCore, SharingEntity};
use crate::sharing::strategy::{SharingStrategy, StrategyCore};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// All-gather global sharing strategy.
pub struct AllGatherSharing {
    base: GlobalBase,
    /// Per-rank slot width in integers.
    total_size: usize,
    bloom: BloomFilter,
}

impl AllGatherSharing {
    pub fn new(
        db: Arc<dyn ClauseDatabase>,
        comm: Arc<dyn Comm>,
        runtime: Arc<Runtime>,
        buffer_size: usize,
        sleep_micros: u64,
    ) -> Arc<Self> {
        Arc::new(AllGatherSharing {
            base: GlobalBase::new(db, comm, runtime, sleep_micros),
            total_size: buffer_size.max(3),
            bloom: BloomFilter::new(),
        })
    }
}

impl SharingEntity for AllGatherSharing {
    fn entity_core(&self) -> &EntityCore {
        &self.base.core.entity
    }

    fn import_clause(&self, clause: &ClauseRef) -> bool {
        self.base.core.db().add_clause(clause.clone())
    }
}

impl SharingStrategy for AllGatherSharing {
    fn strategy_core(&self) -> &StrategyCore {
        &self.base.core
    }

    fn do_sharing(&self) -> bool {
        if self.base.check_end() {
            self.base.join_process();
            return true;
        }

        // Serialise this rank's slot. Everyone participates every round;
        // a rank without material contributes an empty, zero-terminated
        // slot.
        let mut slot = Vec::with_capacity(self.total_size);
        serialize_from_database(&self.base, &self.bloom, &mut slot, self.total_size - 1);
        slot.resize(self.total_size, 0);

        let gathered = self.base.comm.all_gather_i32s(&slot);
        self.base
            .gstats
            .messages_sent
            .fetch_add(self.base.comm.world_size() as u64, Ordering::Relaxed);

        // Decode every slot but our own, drop what the Bloom filter already
        // saw, hand the rest to the local clients.
        let my_rank = self.base.comm.rank() as usize;
        let mut fresh = Vec::new();
        for (rank, slot) in gathered.chunks(self.total_size).enumerate() {
            if rank == my_rank {
                continue;
            }
            let decoded = match wire::deserialize_slot(slot) {
                Ok(decoded) => decoded,
                Err(err) => {
                    log::error!("all-gather: corrupt slot from rank {rank}: {err}");
                    std::process::exit(crate::errors::MPI);
                }
            };
            for clause in decoded {
                self.base.gstats.base.add_received(1);
                if self.bloom.contains_or_insert(clause.lits()) {
                    self.base
                        .gstats
                        .received_duplicates
                        .fetch_add(1, Ordering::Relaxed);
                } else {
                    fresh.push(clause);
                }
            }
        }
        self.base.core.export_selection(&fresh);
        log::debug!(
            "all-gather: round done, {} fresh clauses imported",
            fresh.len()
        );

        false
    }

    fn sleeping_time(&self) -> Duration {
        self.base.sleeping_time()
    }

    fn print_stats(&self) {
        self.base.print_stats("all-gather");
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
    use crate::clause::Clause;
    use crate::database::{DatabaseOptions, create_database};
    use crate::global::loopback::LoopbackComm;

    #[test]
    fn slots_are_fixed_size_and_zero_terminated() {
        let world = LoopbackComm::create_world(1);
        let comm: Arc<dyn Comm> = Arc::new(world.into_iter().next().unwrap());
        let strategy = AllGatherSharing::new(
            create_database('d', &DatabaseOptions::default()),
            comm,
            Arc::new(Runtime::new()),
            16,
            1000,
        );
        strategy.import_clause(&Clause::from_lits(&[1, -2], 2, 0).unwrap());

        let mut slot = Vec::new();
        serialize_from_database(&strategy.base, &strategy.bloom, &mut slot, 15);
        slot.resize(16, 0);
        assert_eq!(&slot[..4], &[2, 2, 1, -2]);
        assert!(slot[4..].iter().all(|&v| v == 0));
    }
}
