//! Sharing strategies: routing clauses from producers to clients.
//!
//! A strategy is an entity that additionally tracks *producers* (the engines
//! whose exports it aggregates) and owns the clause database where those
//! exports land between rounds. It acts as a client of each of its producers
//! and as a producer toward every entity it exports to.
//!
//! Wiring is two-step on purpose: constructors record the producer list, and
//! [`connect_constructor_producers`] -- called exactly once after the
//! strategy is behind an `Arc` -- registers the strategy as a client of each
//! initial producer. The cross-link cannot be made inside the constructor
//! because the strategy's own `Arc` does not exist yet there.

use crate::clause::ClauseRef;
use crate::database::ClauseDatabase;
use crate::sharing::entity::{EntityCore, SharingEntity, SharingId};
use crate::sharing::stats::SharingStats;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A clause-sharing strategy driven by a [`Sharer`](crate::sharing::Sharer).
pub trait SharingStrategy: SharingEntity {
    /// The embedded producer list, database and stats.
    fn strategy_core(&self) -> &StrategyCore;

    /// Run one sharing round. Returns true when the strategy has observed
    /// the end of the solve and its sharer may stop driving it.
    fn do_sharing(&self) -> bool;

    /// How long the sharer should sleep after a round of this strategy.
    fn sleeping_time(&self) -> Duration;

    /// Log the strategy's counters.
    fn print_stats(&self) {
        let snapshot = self.strategy_core().stats.snapshot();
        log::info!(
            "strategy {}: received {}, shared {}, filtered at import {}",
            self.sharing_id(),
            snapshot.received,
            snapshot.shared,
            snapshot.filtered_at_import
        );
    }

    /// The strategy's counters as JSON. Global strategies override this to
    /// report their extended counter set.
    fn stats_json(&self) -> serde_json::Value {
        self.strategy_core().stats.to_json()
    }

    /// Upcast to a plain sharing entity (for client lists).
    fn as_entity(self: Arc<Self>) -> Arc<dyn SharingEntity>;

    /// Record a new producer. Subtypes carrying per-producer state override
    /// this to initialise it.
    fn add_producer(&self, producer: &Arc<dyn SharingEntity>) {
        self.strategy_core().push_producer(producer);
        log::debug!(
            "strategy {}: added producer {}",
            self.sharing_id(),
            producer.sharing_id()
        );
    }

    /// Forget a producer and detach this strategy from its client list.
    fn remove_producer(&self, producer: &Arc<dyn SharingEntity>) {
        producer.remove_client(self.sharing_id());
        self.strategy_core().retain_producer(producer.sharing_id());
        log::debug!(
            "strategy {}: removed producer {}",
            self.sharing_id(),
            producer.sharing_id()
        );
    }
}

/// Register `strategy` as a client of `producer`, so the producer's exports
/// start flowing in. The producer must have been added beforehand.
pub fn connect_producer(strategy: &Arc<dyn SharingStrategy>, producer: &Arc<dyn SharingEntity>) {
    producer.add_client(Arc::clone(strategy).as_entity());
    log::debug!(
        "strategy {}: connected producer {}",
        strategy.sharing_id(),
        producer.sharing_id()
    );
}

/// Cross-link the strategy with every producer passed to its constructor.
/// Call exactly once per strategy, right after construction; calling it
/// again would register the strategy twice with each producer.
pub fn connect_constructor_producers(strategy: &Arc<dyn SharingStrategy>) {
    let mut producers = Vec::new();
    strategy
        .strategy_core()
        .for_each_producer(|producer| producers.push(Arc::clone(producer)));
    for producer in producers {
        producer.add_client(Arc::clone(strategy).as_entity());
    }
}

/// Producer list, clause database and statistics embedded in every strategy.
pub struct StrategyCore {
    pub entity: EntityCore,
    producers: RwLock<Vec<Weak<dyn SharingEntity>>>,
    db: Arc<dyn ClauseDatabase>,
    pub stats: SharingStats,
}

impl StrategyCore {
    /// Build a core over `db` with initial producer and consumer lists.
    /// Remember to call [`connect_constructor_producers`] once the strategy
    /// is behind an `Arc`.
    pub fn new(
        db: Arc<dyn ClauseDatabase>,
        producers: &[Arc<dyn SharingEntity>],
        consumers: &[Arc<dyn SharingEntity>],
    ) -> Self {
        StrategyCore {
            entity: EntityCore::with_clients(consumers),
            producers: RwLock::new(producers.iter().map(Arc::downgrade).collect()),
            db,
            stats: SharingStats::default(),
        }
    }

    /// The database exports land in.
    pub fn db(&self) -> &Arc<dyn ClauseDatabase> {
        &self.db
    }

    /// Producer-list length (stale edges included).
    pub fn producer_count(&self) -> usize {
        self.producers.read().len()
    }

    /// Visit every producer that is still alive.
    pub fn for_each_producer(&self, mut visit: impl FnMut(&Arc<dyn SharingEntity>)) {
        let producers = self.producers.read();
        for weak in producers.iter() {
            if let Some(producer) = weak.upgrade() {
                visit(&producer);
            }
        }
    }

    pub(crate) fn push_producer(&self, producer: &Arc<dyn SharingEntity>) {
        self.producers.write().push(Arc::downgrade(producer));
    }

    pub(crate) fn retain_producer(&self, removed: SharingId) {
        self.producers.write().retain(|weak| match weak.upgrade() {
            Some(producer) => producer.sharing_id() != removed,
            None => true,
        });
    }

    /// Export a selection to every client, never reflecting a clause back to
    /// the client it came from.
    pub fn export_selection(&self, clauses: &[ClauseRef]) {
        self.entity.export_clauses_with(clauses, |cls, client| {
            if cls.from == client.sharing_id() {
                false
            } else {
                client.import_clause(cls)
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;
    use crate::database::{DatabaseOptions, create_database};
    use parking_lot::Mutex;

    struct Probe {
        core: EntityCore,
        seen: Mutex<Vec<ClauseRef>>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Probe {
                core: EntityCore::new(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl SharingEntity for Probe {
        fn entity_core(&self) -> &EntityCore {
            &self.core
        }

        fn import_clause(&self, clause: &ClauseRef) -> bool {
            self.seen.lock().push(clause.clone());
            true
        }
    }

    struct NullStrategy {
        core: StrategyCore,
    }

    impl SharingEntity for NullStrategy {
        fn entity_core(&self) -> &EntityCore {
            &self.core.entity
        }

        fn import_clause(&self, clause: &ClauseRef) -> bool {
            self.core.db().add_clause(clause.clone())
        }
    }

    impl SharingStrategy for NullStrategy {
        fn strategy_core(&self) -> &StrategyCore {
            &self.core
        }

        fn do_sharing(&self) -> bool {
            true
        }

        fn sleeping_time(&self) -> Duration {
            Duration::from_micros(0)
        }

        fn as_entity(self: Arc<Self>) -> Arc<dyn SharingEntity> {
            self
        }
    }

    #[test]
    fn constructor_producers_get_exactly_one_cross_link() {
        let p1 = Probe::new();
        let p2 = Probe::new();
        let producers: Vec<Arc<dyn SharingEntity>> = vec![p1.clone(), p2.clone()];
        let strategy: Arc<dyn SharingStrategy> = Arc::new(NullStrategy {
            core: StrategyCore::new(
                create_database('d', &DatabaseOptions::default()),
                &producers,
                &[],
            ),
        });
        assert_eq!(p1.client_count(), 0);
        connect_constructor_producers(&strategy);
        assert_eq!(p1.client_count(), 1);
        assert_eq!(p2.client_count(), 1);
        // The cross-link routes producer exports into the strategy database.
        let clause = Clause::from_lits(&[1, 2], 2, p1.sharing_id()).unwrap();
        p1.entity_core().export_clause(&clause);
        assert_eq!(strategy.strategy_core().db().size(), 1);
    }

    #[test]
    fn export_selection_never_reflects_to_the_source() {
        let producer = Probe::new();
        let other = Probe::new();
        let strategy = Arc::new(NullStrategy {
            core: StrategyCore::new(
                create_database('d', &DatabaseOptions::default()),
                &[],
                &[],
            ),
        });
        strategy.add_client(producer.clone());
        strategy.add_client(other.clone());

        let clause = Clause::from_lits(&[1, 2], 2, producer.sharing_id()).unwrap();
        strategy.strategy_core().export_selection(&[clause]);
        assert!(producer.seen.lock().is_empty());
        assert_eq!(other.seen.lock().len(), 1);
    }
}
