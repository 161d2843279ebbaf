//! HordeSat-style local sharing: per-producer adaptive LBD throttling.
//!
//! Every producer gets its own LBD admission cap. Each round the strategy
//! measures how much of its literal budget the producer actually filled and
//! steers the cap: an under-producing engine gets a looser cap (more clauses
//! qualify), a saturating one gets it tightened, never below 2.

use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use crate::runtime::Runtime;
use crate::sharing::entity::{EntityCore, SharingEntity, SharingId};
use crate::sharing::strategy::{SharingStrategy, StrategyCore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const UNDER_UTILIZATION_PERCENT: usize = 75;
const OVER_UTILIZATION_PERCENT: usize = 98;
const LBD_LIMIT_FLOOR: u32 = 2;

struct ProducerState {
    lbd_limit: AtomicU32,
    literals_this_round: AtomicU64,
}

/// The Horde local sharing strategy.
pub struct HordeSharing {
    core: StrategyCore,
    runtime: Arc<Runtime>,
    literals_per_producer: usize,
    initial_lbd_limit: u32,
    /// Round number from which the LBD caps start adapting.
    adjust_from_round: u32,
    round: AtomicU32,
    sleep: Duration,
    producer_states: RwLock<HashMap<SharingId, ProducerState>>,
}

impl HordeSharing {
    /// Panics when `literals_per_producer` is zero: the utilisation
    /// percentage would be meaningless.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn ClauseDatabase>,
        runtime: Arc<Runtime>,
        literals_per_producer: usize,
        initial_lbd_limit: u32,
        adjust_from_round: u32,
        sleep_micros: u64,
        producers: &[Arc<dyn SharingEntity>],
        consumers: &[Arc<dyn SharingEntity>],
    ) -> Arc<Self> {
        assert!(
            literals_per_producer > 0,
            "literals per producer must be positive to compute utilisation"
        );
        let strategy = Arc::new(HordeSharing {
            core: StrategyCore::new(db, producers, consumers),
            runtime,
            literals_per_producer,
            initial_lbd_limit,
            adjust_from_round,
            round: AtomicU32::new(0),
            sleep: Duration::from_micros(sleep_micros),
            producer_states: RwLock::new(HashMap::new()),
        });
        {
            let mut states = strategy.producer_states.write();
            strategy.core.for_each_producer(|producer| {
                states.insert(producer.sharing_id(), strategy.fresh_state());
            });
        }
        log::info!(
            "horde sharing {}: producers {}, consumers {}, initial lbd limit {}, literals per round {}",
            strategy.sharing_id(),
            strategy.core.producer_count(),
            strategy.client_count(),
            initial_lbd_limit,
            literals_per_producer
        );
        strategy
    }

    fn fresh_state(&self) -> ProducerState {
        ProducerState {
            lbd_limit: AtomicU32::new(self.initial_lbd_limit),
            literals_this_round: AtomicU64::new(0),
        }
    }

    /// Current LBD cap of a producer, if known.
    pub fn lbd_limit_of(&self, producer: SharingId) -> Option<u32> {
        self.producer_states
            .read()
            .get(&producer)
            .map(|state| state.lbd_limit.load(Ordering::Relaxed))
    }
}

impl SharingEntity for HordeSharing {
    fn entity_core(&self) -> &EntityCore {
        &self.core.entity
    }

    fn import_clause(&self, clause: &ClauseRef) -> bool {
        debug_assert!(clause.len() > 0 && clause.from != -1);
        let states = self.producer_states.read();
        let Some(state) = states.get(&clause.from) else {
            // Unknown producer: nothing to throttle against, filter it out.
            self.core.stats.add_filtered(1);
            return false;
        };
        if clause.lbd <= state.lbd_limit.load(Ordering::Relaxed) {
            self.core.stats.add_received(1);
            if self.core.db().add_clause(clause.clone()) {
                state
                    .literals_this_round
                    .fetch_add(clause.len() as u64, Ordering::Relaxed);
                true
            } else {
                false
            }
        } else {
            self.core.stats.add_filtered(1);
            false
        }
    }
}

impl SharingStrategy for HordeSharing {
    fn strategy_core(&self) -> &StrategyCore {
        &self.core
    }

    fn do_sharing(&self) -> bool {
        if self.runtime.is_ending() {
            return true;
        }

        let round = self.round.fetch_add(1, Ordering::Relaxed) + 1;
        let mut selection = Vec::new();
        let budget = self.literals_per_producer * self.core.producer_count();
        self.core.db().give_selection(&mut selection, budget);

        // Steer every producer's cap from its round utilisation.
        let adjust = round >= self.adjust_from_round;
        {
            let states = self.producer_states.read();
            self.core.for_each_producer(|producer| {
                let Some(state) = states.get(&producer.sharing_id()) else {
                    return;
                };
                let produced = state.literals_this_round.swap(0, Ordering::Relaxed) as usize;
                let percent = 100 * produced / self.literals_per_producer;
                log::trace!(
                    "horde: producer {} utilisation {percent}%",
                    producer.sharing_id()
                );
                if !adjust {
                    return;
                }
                if percent < UNDER_UTILIZATION_PERCENT {
                    state.lbd_limit.fetch_add(1, Ordering::Relaxed);
                } else if percent > OVER_UTILIZATION_PERCENT {
                    // Single writer (the sharer thread), plain load/store.
                    let current = state.lbd_limit.load(Ordering::Relaxed);
                    if current > LBD_LIMIT_FLOOR {
                        state.lbd_limit.store(current - 1, Ordering::Relaxed);
                    }
                }
            });
        }

        self.core.stats.add_shared(selection.len() as u64);
        self.core.export_selection(&selection);
        log::debug!(
            "horde round {round}: budget {budget}, selected {} clauses",
            selection.len()
        );

        self.runtime.is_ending()
    }

    fn sleeping_time(&self) -> Duration {
        self.sleep
    }

    fn as_entity(self: Arc<Self>) -> Arc<dyn SharingEntity> {
        self
    }

    fn add_producer(&self, producer: &Arc<dyn SharingEntity>) {
        self.core.push_producer(producer);
        self.producer_states
            .write()
            .insert(producer.sharing_id(), self.fresh_state());
    }

    fn remove_producer(&self, producer: &Arc<dyn SharingEntity>) {
        producer.remove_client(self.sharing_id());
        self.core.retain_producer(producer.sharing_id());
        self.producer_states.write().remove(&producer.sharing_id());
    }
}
