//! Local strategies end to end: scripted producers, a driven sharer, and
//! the Horde feedback loop.

use satswarm::config::Config;
use satswarm::database::{ClauseDatabase, DatabaseOptions, create_database};
use satswarm::runtime::Runtime;
use satswarm::sharing::{
    HordeSharing, Sharer, SharingEntity, SharingStrategy, SimpleSharing,
    connect_constructor_producers,
};
use satswarm::solvers::SatResult;
use satswarm::testing::{RecordingConsumer, ScriptedProducer};
use std::sync::Arc;
use std::time::Duration;

fn db() -> Arc<dyn satswarm::database::ClauseDatabase> {
    create_database('d', &DatabaseOptions::default())
}

fn cfgless_horde(
    runtime: &Arc<Runtime>,
    literals_per_producer: usize,
    producers: &[Arc<dyn SharingEntity>],
    consumers: &[Arc<dyn SharingEntity>],
) -> Arc<HordeSharing> {
    HordeSharing::new(
        db(),
        Arc::clone(runtime),
        literals_per_producer,
        2,
        1,
        1000,
        producers,
        consumers,
    )
}

#[test]
fn horde_routes_producer_clauses_to_consumers() {
    let runtime = Arc::new(Runtime::new());
    let producer = ScriptedProducer::new();
    let consumer = RecordingConsumer::new();
    let producers: Vec<Arc<dyn SharingEntity>> = vec![producer.clone()];
    let consumers: Vec<Arc<dyn SharingEntity>> = vec![consumer.clone()];

    let strategy = cfgless_horde(&runtime, 100, &producers, &consumers);
    let dyn_strategy: Arc<dyn SharingStrategy> = strategy.clone();
    connect_constructor_producers(&dyn_strategy);

    producer.emit(&[1, 2], 2);
    producer.emit(&[3, 4, 5], 9); // over the LBD cap, filtered at import

    assert!(!strategy.do_sharing());
    let seen = consumer.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].lits(), &[1, 2]);
}

#[test]
fn horde_adapts_the_lbd_cap_to_utilisation() {
    let runtime = Arc::new(Runtime::new());
    let producer = ScriptedProducer::new();
    let producers: Vec<Arc<dyn SharingEntity>> = vec![producer.clone()];

    let strategy = cfgless_horde(&runtime, 4, &producers, &[]);
    let dyn_strategy: Arc<dyn SharingStrategy> = strategy.clone();
    connect_constructor_producers(&dyn_strategy);
    let id = producer.sharing_id();
    assert_eq!(strategy.lbd_limit_of(id), Some(2));

    // Under-utilised round: nothing produced, the cap loosens.
    strategy.do_sharing();
    assert_eq!(strategy.lbd_limit_of(id), Some(3));

    // Saturated round: 5 of 4 budgeted literals, the cap tightens.
    producer.emit(&[1, 2, 3], 2);
    producer.emit(&[4, 5], 2);
    strategy.do_sharing();
    assert_eq!(strategy.lbd_limit_of(id), Some(2));

    // The cap never drops below 2.
    producer.emit(&[1, 2, 3], 2);
    producer.emit(&[4, 5], 2);
    strategy.do_sharing();
    assert_eq!(strategy.lbd_limit_of(id), Some(2));
}

#[test]
fn simple_sharing_cuts_by_size_and_clears_its_database() {
    let runtime = Arc::new(Runtime::new());
    let producer = ScriptedProducer::new();
    let consumer = RecordingConsumer::new();
    let producers: Vec<Arc<dyn SharingEntity>> = vec![producer.clone()];
    let consumers: Vec<Arc<dyn SharingEntity>> = vec![consumer.clone()];

    let strategy = SimpleSharing::new(
        db(),
        Arc::clone(&runtime),
        3,
        100,
        1000,
        &producers,
        &consumers,
    );
    let dyn_strategy: Arc<dyn SharingStrategy> = strategy.clone();
    connect_constructor_producers(&dyn_strategy);

    producer.emit(&[1, 2], 2);
    producer.emit(&[3, 4, 5, 6], 2); // over the size limit

    assert!(!strategy.do_sharing());
    assert_eq!(consumer.seen_count(), 1);
    assert_eq!(strategy.strategy_core().db().size(), 0);
}

#[test]
fn strategies_report_termination_once_the_run_ends() {
    let runtime = Arc::new(Runtime::new());
    let strategy = cfgless_horde(&runtime, 10, &[], &[]);
    assert!(!strategy.do_sharing());
    runtime.finish(SatResult::Unsat, Vec::new(), 0);
    assert!(strategy.do_sharing());
}

#[test]
fn a_sharer_thread_drives_rounds_and_stops_at_the_end() {
    let runtime = Arc::new(Runtime::new());
    let producer = ScriptedProducer::new();
    let consumer = RecordingConsumer::new();
    let producers: Vec<Arc<dyn SharingEntity>> = vec![producer.clone()];
    let consumers: Vec<Arc<dyn SharingEntity>> = vec![consumer.clone()];

    let strategy = HordeSharing::new(
        db(),
        Arc::clone(&runtime),
        100,
        2,
        1,
        2_000, // 2ms cadence
        &producers,
        &consumers,
    );
    let dyn_strategy: Arc<dyn SharingStrategy> = strategy.clone();
    connect_constructor_producers(&dyn_strategy);

    let mut sharer = Sharer::new(
        0,
        vec![dyn_strategy],
        Arc::clone(&runtime),
        Duration::from_micros(100),
    );

    producer.emit(&[1, 2], 2);
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while consumer.seen_count() == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(consumer.seen_count() >= 1, "sharer never delivered");

    runtime.finish(SatResult::Unsat, Vec::new(), 0);
    sharer.join();
}

#[test]
fn two_group_horde_shares_across_groups() {
    let runtime = Arc::new(Runtime::new());
    let cfg = Config::default();
    // Engines backed by the real factory, split into two producer groups by
    // the strategy factory.
    let solvers = satswarm::solvers::SolverFactory::create_solvers(4, "d", 100).unwrap();
    let mut cfg = cfg;
    cfg.sharing_strategy = 2;
    let strategies = satswarm::sharing::factory::instantiate_local_strategies(
        2, &cfg, &runtime, &solvers,
    )
    .unwrap();
    assert_eq!(strategies.len(), 2);
    // Every engine is a client of both strategies; each strategy has half
    // the engines as producers.
    assert_eq!(strategies[0].strategy_core().producer_count(), 2);
    assert_eq!(strategies[1].strategy_core().producer_count(), 2);
}
