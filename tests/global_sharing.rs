//! Multi-rank protocols over the loopback transport: the Mallob tree round,
//! the flat all-gather, the ring, and the winner funnel.

use satswarm::clause::Clause;
use satswarm::database::{DatabaseOptions, create_database};
use satswarm::global::base::GlobalBase;
use satswarm::global::{
    AllGatherSharing, Comm, GenericGlobalSharing, LoopbackComm, MallobConfig, MallobSharing,
};
use satswarm::runtime::Runtime;
use satswarm::sharing::{SharingEntity, SharingStrategy};
use satswarm::solvers::SatResult;
use satswarm::testing::RecordingConsumer;
use std::sync::Arc;

fn spawn_ranks<T: Send + 'static>(
    world: Vec<LoopbackComm>,
    body: impl Fn(Arc<dyn Comm>) -> T + Send + Sync + 'static,
) -> Vec<T> {
    let body = Arc::new(body);
    let handles: Vec<_> = world
        .into_iter()
        .map(|comm| {
            let body = Arc::clone(&body);
            std::thread::spawn(move || body(Arc::new(comm)))
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().expect("rank thread panicked"))
        .collect()
}

fn mallob_config() -> MallobConfig {
    MallobConfig {
        base_buffer_size: 1_000,
        max_buffer_size: 10_000,
        lbd_limit: 60,
        size_limit: 60,
        sharings_per_second: 50,
        max_compensation: 5.0,
        reshare_period_micros: 1_000_000,
        free_max_size: 1,
    }
}

fn mallob_db() -> Arc<dyn satswarm::database::ClauseDatabase> {
    create_database(
        'm',
        &DatabaseOptions {
            max_clause_size: 60,
            capacity: 100_000,
            mallob_partitioning_lbd: 2,
            mallob_free_max_size: 1,
        },
    )
}

#[test]
fn mallob_round_exports_identical_clause_sequences_everywhere() {
    let world = LoopbackComm::create_world(3);
    let orders = spawn_ranks(world, |comm| {
        let rank = comm.rank();
        let runtime = Arc::new(Runtime::new());
        let strategy = MallobSharing::new(
            mallob_db(),
            Arc::clone(&comm),
            Arc::clone(&runtime),
            mallob_config(),
        );
        let consumer = RecordingConsumer::new();
        strategy.add_client(consumer.clone());

        // One distinct clause per rank enters the tree.
        let clause =
            Clause::from_lits(&[rank * 10 + 1, rank * 10 + 2, rank * 10 + 3], 2, -1).unwrap();
        assert!(strategy.import_clause(&clause));

        assert!(!strategy.do_sharing());
        let order: Vec<Vec<i32>> = consumer.seen().iter().map(|c| c.lits().to_vec()).collect();
        assert_eq!(order.len(), 3, "rank {rank} missed downward clauses");

        // Rank 1 concludes; everyone runs the end protocol to completion.
        if rank == 1 {
            runtime.finish(SatResult::Unsat, Vec::new(), 1);
        }
        while !strategy.do_sharing() {}
        assert!(runtime.is_ending());
        assert_eq!(runtime.result(), SatResult::Unsat);
        assert_eq!(runtime.winner_rank(), 1);
        order
    });

    // The downward buffer is byte-identical per round, so every rank
    // exported the same clauses in the same order.
    assert_eq!(orders[0], orders[1]);
    assert_eq!(orders[1], orders[2]);
}

#[test]
fn mallob_does_not_reshare_within_the_reshare_period() {
    let world = LoopbackComm::create_world(2);
    let counts = spawn_ranks(world, |comm| {
        let rank = comm.rank();
        let runtime = Arc::new(Runtime::new());
        let strategy = MallobSharing::new(
            mallob_db(),
            Arc::clone(&comm),
            Arc::clone(&runtime),
            mallob_config(),
        );
        let consumer = RecordingConsumer::new();
        strategy.add_client(consumer.clone());

        // The same clause enters on both ranks, twice over two rounds.
        let clause = Clause::from_lits(&[7, -8], 2, -1).unwrap();
        strategy.import_clause(&clause);
        assert!(!strategy.do_sharing());
        let after_first = consumer.seen_count();

        strategy.import_clause(&clause);
        assert!(!strategy.do_sharing());
        let after_second = consumer.seen_count();

        if rank == 0 {
            runtime.finish(SatResult::Unsat, Vec::new(), 0);
        }
        while !strategy.do_sharing() {}
        (after_first, after_second)
    });

    for (rank, (first, second)) in counts.iter().enumerate() {
        assert_eq!(*first, 1, "rank {rank}: the clause arrives exactly once");
        assert_eq!(
            second, first,
            "rank {rank}: the duplicate was filtered by the exact filter"
        );
    }
}

#[test]
fn allgather_exchanges_selections_between_ranks() {
    let world = LoopbackComm::create_world(2);
    let results = spawn_ranks(world, |comm| {
        let rank = comm.rank();
        let runtime = Arc::new(Runtime::new());
        let strategy = AllGatherSharing::new(
            create_database('d', &DatabaseOptions::default()),
            Arc::clone(&comm),
            Arc::clone(&runtime),
            64,
            1_000,
        );
        let consumer = RecordingConsumer::new();
        strategy.add_client(consumer.clone());

        let mine: Vec<i32> = vec![rank * 10 + 1, rank * 10 + 2];
        strategy.import_clause(&Clause::from_lits(&mine, 2, -1).unwrap());
        assert!(!strategy.do_sharing());

        let seen = consumer.seen();
        // Exactly the other rank's clause came through.
        assert_eq!(seen.len(), 1);
        let other = 1 - rank;
        assert_eq!(seen[0].lits(), &[other * 10 + 1, other * 10 + 2]);

        // Re-importing the same clause is suppressed by the Bloom filter.
        strategy.import_clause(&Clause::from_lits(&mine, 2, -1).unwrap());
        assert!(!strategy.do_sharing());
        assert_eq!(consumer.seen_count(), 1);

        if rank == 0 {
            runtime.finish(SatResult::Sat, vec![1, 2], 0);
        }
        while !strategy.do_sharing() {}
        (runtime.result(), runtime.winner_rank())
    });
    for (result, winner) in results {
        assert_eq!(result, SatResult::Sat);
        assert_eq!(winner, 0);
    }
}

#[test]
fn ring_sharing_forwards_clauses_around_the_ring() {
    let world = LoopbackComm::create_world(3);
    let seen_counts = spawn_ranks(world, |comm| {
        let rank = comm.rank();
        let runtime = Arc::new(Runtime::new());
        let strategy = GenericGlobalSharing::ring(
            create_database('d', &DatabaseOptions::default()),
            Arc::clone(&comm),
            Arc::clone(&runtime),
            256,
            1_000,
        );
        let consumer = RecordingConsumer::new();
        strategy.add_client(consumer.clone());
        // The strategy is its own client so received clauses keep moving.
        let self_entity = Arc::clone(&strategy).as_entity();
        strategy.add_client(self_entity);

        if rank == 0 {
            strategy.import_clause(&Clause::from_lits(&[42, -43], 2, -1).unwrap());
        }

        // Two rounds move the clause two hops: 0 -> 1 -> 2.
        assert!(!strategy.do_sharing());
        assert!(!strategy.do_sharing());

        if rank == 2 {
            runtime.finish(SatResult::Unsat, Vec::new(), 2);
        }
        while !strategy.do_sharing() {}
        assert_eq!(runtime.winner_rank(), 2);
        consumer.seen_count()
    });

    // Rank 1 got it on the first hop, rank 2 on the second.
    assert_eq!(seen_counts[1], 1);
    assert_eq!(seen_counts[2], 1);
}

#[test]
fn winner_funnel_elects_the_reporting_rank() {
    let world = LoopbackComm::create_world(4);
    let outcomes = spawn_ranks(world, |comm| {
        let rank = comm.rank();
        let runtime = Arc::new(Runtime::new());
        let base = GlobalBase::new(
            create_database('d', &DatabaseOptions::default()),
            Arc::clone(&comm),
            Arc::clone(&runtime),
            1_000,
        );

        if rank == 3 {
            runtime.finish(SatResult::Sat, vec![1, -2], 3);
        }
        while !base.check_end() {}
        base.join_process();
        (runtime.result(), runtime.winner_rank(), runtime.is_ending())
    });

    for (result, winner, ending) in outcomes {
        assert_eq!(result, SatResult::Sat);
        assert_eq!(winner, 3);
        assert!(ending);
    }
}
