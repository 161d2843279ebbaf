//! Point-to-point global sharing over explicit neighbour sets.
//!
//! The constructor fixes two rank lists: `subscribers` this rank sends its
//! selection to, and `subscriptions` it receives from, in order. No
//! aggregation, no compensation; two Bloom filters suppress duplicates in
//! each direction independently. With both lists set to the two ring
//! neighbours this is the ring topology the PRS portfolio uses.

use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use crate::filters::BloomFilter;
use crate::global::base::{GlobalBase, serialize_from_database};
use crate::global::comm::{Comm, tags};
use crate::global::wire;
use crate::runtime::Runtime;
use crate::sharing::entity::{EntityCore, SharingEntity};
use crate::sharing::strategy::{SharingStrategy, StrategyCore};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Neighbour-set global sharing strategy.
pub struct GenericGlobalSharing {
    base: GlobalBase,
    /// Ranks we receive clause buffers from, in receive order.
    subscriptions: Vec<i32>,
    /// Ranks we send our selection to.
    subscribers: Vec<i32>,
    /// Integer budget of one outgoing buffer.
    total_size: usize,
    bloom_send: BloomFilter,
    bloom_recv: BloomFilter,
}

impl GenericGlobalSharing {
    pub fn new(
        db: Arc<dyn ClauseDatabase>,
        comm: Arc<dyn Comm>,
        runtime: Arc<Runtime>,
        subscriptions: Vec<i32>,
        subscribers: Vec<i32>,
        buffer_size: usize,
        sleep_micros: u64,
    ) -> Arc<Self> {
        Arc::new(GenericGlobalSharing {
            base: GlobalBase::new(db, comm, runtime, sleep_micros),
            subscriptions,
            subscribers,
            total_size: buffer_size.max(3),
            bloom_send: BloomFilter::new(),
            bloom_recv: BloomFilter::new(),
        })
    }

    /// The two-neighbour ring instance over the full world.
    pub fn ring(
        db: Arc<dyn ClauseDatabase>,
        comm: Arc<dyn Comm>,
        runtime: Arc<Runtime>,
        buffer_size: usize,
        sleep_micros: u64,
    ) -> Arc<Self> {
        let world_size = comm.world_size();
        let rank = comm.rank();
        let previous = (rank - 1 + world_size) % world_size;
        let next = (rank + 1) % world_size;
        Self::new(
            db,
            comm,
            runtime,
            vec![previous],
            vec![next],
            buffer_size,
            sleep_micros,
        )
    }
}

impl SharingEntity for GenericGlobalSharing {
    fn entity_core(&self) -> &EntityCore {
        &self.base.core.entity
    }

    fn import_clause(&self, clause: &ClauseRef) -> bool {
        self.base.core.db().add_clause(clause.clone())
    }
}

impl SharingStrategy for GenericGlobalSharing {
    fn strategy_core(&self) -> &StrategyCore {
        &self.base.core
    }

    fn do_sharing(&self) -> bool {
        if self.base.check_end() {
            self.base.join_process();
            return true;
        }

        let mut outgoing = Vec::with_capacity(self.total_size);
        serialize_from_database(&self.base, &self.bloom_send, &mut outgoing, self.total_size);

        for &subscriber in &self.subscribers {
            self.base
                .comm
                .send_i32s(subscriber, tags::CLAUSES, &outgoing);
            self.base.count_message();
            log::trace!(
                "generic sharing: sent {} ints to rank {subscriber}",
                outgoing.len()
            );
        }

        let mut fresh = Vec::new();
        for &subscription in &self.subscriptions {
            let buffer = self.base.comm.recv_i32s(subscription, tags::CLAUSES);
            log::trace!(
                "generic sharing: received {} ints from rank {subscription}",
                buffer.len()
            );
            let decoded = match wire::deserialize_clauses(&buffer) {
                Ok(decoded) => decoded,
                Err(err) => {
                    log::error!("generic sharing: corrupt buffer from rank {subscription}: {err}");
                    std::process::exit(crate::errors::MPI);
                }
            };
            for clause in decoded {
                self.base.gstats.base.add_received(1);
                if self.bloom_recv.contains_or_insert(clause.lits()) {
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

        false
    }

    fn sleeping_time(&self) -> Duration {
        self.base.sleeping_time()
    }

    fn print_stats(&self) {
        self.base.print_stats("generic sharing");
    }

    fn stats_json(&self) -> serde_json::Value {
        self.base.gstats.to_json()
    }

    fn as_entity(self: Arc<Self>) -> Arc<dyn SharingEntity> {
        self
    }
}
