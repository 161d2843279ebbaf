//! Size-capped local sharing.
//!
//! The simplest useful policy: admit only clauses up to a fixed size, ship
//! one budgeted selection per round to every client, and drop whatever is
//! left in the database so it cannot grow without bound.

use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use crate::runtime::Runtime;
use crate::sharing::entity::{EntityCore, SharingEntity};
use crate::sharing::strategy::{SharingStrategy, StrategyCore};
use std::sync::Arc;
use std::time::Duration;

/// Size-filtering local sharing strategy.
pub struct SimpleSharing {
    core: StrategyCore,
    runtime: Arc<Runtime>,
    size_limit: usize,
    literals_per_producer: usize,
    sleep: Duration,
}

impl SimpleSharing {
    pub fn new(
        db: Arc<dyn ClauseDatabase>,
        runtime: Arc<Runtime>,
        size_limit: usize,
        literals_per_producer: usize,
        sleep_micros: u64,
        producers: &[Arc<dyn SharingEntity>],
        consumers: &[Arc<dyn SharingEntity>],
    ) -> Arc<Self> {
        let strategy = Arc::new(SimpleSharing {
            core: StrategyCore::new(db, producers, consumers),
            runtime,
            size_limit,
            literals_per_producer,
            sleep: Duration::from_micros(sleep_micros),
        });
        log::info!(
            "simple sharing {}: producers {}, consumers {}, size limit {}",
            strategy.sharing_id(),
            strategy.core.producer_count(),
            strategy.client_count(),
            size_limit
        );
        strategy
    }
}

impl SharingEntity for SimpleSharing {
    fn entity_core(&self) -> &EntityCore {
        &self.core.entity
    }

    fn import_clause(&self, clause: &ClauseRef) -> bool {
        debug_assert!(clause.len() > 0 && clause.from != -1);
        if clause.len() <= self.size_limit {
            self.core.stats.add_received(1);
            self.core.db().add_clause(clause.clone())
        } else {
            self.core.stats.add_filtered(1);
            false
        }
    }
}

impl SharingStrategy for SimpleSharing {
    fn strategy_core(&self) -> &StrategyCore {
        &self.core
    }

    fn do_sharing(&self) -> bool {
        if self.runtime.is_ending() {
            return true;
        }

        let mut selection = Vec::new();
        let budget = self.literals_per_producer * self.core.producer_count();
        self.core.db().give_selection(&mut selection, budget);
        self.core.stats.add_shared(selection.len() as u64);
        self.core.export_selection(&selection);
        log::debug!(
            "simple sharing: budget {budget}, selected {} clauses, db size {}",
            selection.len(),
            self.core.db().size()
        );

        // Unshared leftovers are stale by the next round; drop them.
        self.core.db().clear();

        self.runtime.is_ending()
    }

    fn sleeping_time(&self) -> Duration {
        self.sleep
    }

    fn as_entity(self: Arc<Self>) -> Arc<dyn SharingEntity> {
        self
    }
}
