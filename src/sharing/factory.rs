//! Strategy selection and wiring.

use crate::config::Config;
use crate::database::{DatabaseOptions, create_database};
use crate::global::{
    AllGatherSharing, Comm, GenericGlobalSharing, MallobConfig, MallobSharing,
};
use crate::runtime::Runtime;
use crate::sharing::entity::SharingEntity;
use crate::sharing::horde::HordeSharing;
use crate::sharing::sharer::Sharer;
use crate::sharing::simple::SimpleSharing;
use crate::sharing::strategy::{SharingStrategy, connect_constructor_producers};
use crate::solvers::SolverInterface;
use anyhow::{Result, bail};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

const LOCAL_STRATEGY_COUNT: u32 = 3;

/// Capacity of the databases backing the local strategies.
const LOCAL_DB_CAPACITY: usize = 100_000;

fn local_db_options(cfg: &Config) -> DatabaseOptions {
    DatabaseOptions {
        max_clause_size: cfg.max_clause_size,
        capacity: LOCAL_DB_CAPACITY,
        mallob_partitioning_lbd: 2,
        mallob_free_max_size: 1,
    }
}

fn global_db_options(cfg: &Config) -> DatabaseOptions {
    DatabaseOptions {
        max_clause_size: cfg.max_clause_size,
        capacity: cfg.global_shared_literals * 10,
        mallob_partitioning_lbd: 2,
        mallob_free_max_size: 1,
    }
}

/// Build the selected local strategy (or strategies) over the given
/// engines. `0` picks a strategy at random; `2` splits the engines into two
/// producer groups exporting into a common database.
pub fn instantiate_local_strategies(
    mut number: u32,
    cfg: &Config,
    runtime: &Arc<Runtime>,
    solvers: &[Arc<dyn SolverInterface>],
) -> Result<Vec<Arc<dyn SharingStrategy>>> {
    let entities: Vec<Arc<dyn SharingEntity>> = solvers
        .iter()
        .map(|solver| Arc::clone(solver).as_sharing_entity())
        .collect();
    if entities.is_empty() {
        log::warn!("no sharing entities, local strategy {number} will not be instantiated");
        return Ok(Vec::new());
    }

    if number == 0 {
        number = rand::thread_rng().gen_range(1..=LOCAL_STRATEGY_COUNT);
        log::info!("local strategy picked at random: {number}");
    }

    let opts = local_db_options(cfg);
    let mut strategies: Vec<Arc<dyn SharingStrategy>> = Vec::new();

    match number {
        1 => {
            log::info!("local strategy: horde, one producer group");
            strategies.push(HordeSharing::new(
                create_database(cfg.import_db, &opts),
                Arc::clone(runtime),
                cfg.shared_literals_per_producer,
                cfg.horde_initial_lbd_limit,
                cfg.horde_init_round,
                cfg.sharing_sleep,
                &entities,
                &entities,
            ));
        }
        2 => {
            if entities.len() <= 2 {
                bail!(
                    "local strategy 2 needs more than 2 engines, got {}",
                    entities.len()
                );
            }
            log::info!("local strategy: horde, two producer groups");
            let half = entities.len() / 2;
            for group in [&entities[..half], &entities[half..]] {
                strategies.push(HordeSharing::new(
                    create_database(cfg.import_db, &opts),
                    Arc::clone(runtime),
                    cfg.shared_literals_per_producer,
                    cfg.horde_initial_lbd_limit,
                    cfg.horde_init_round,
                    cfg.sharing_sleep,
                    group,
                    &entities,
                ));
            }
        }
        3 => {
            log::info!("local strategy: simple size cut-off");
            strategies.push(SimpleSharing::new(
                create_database(cfg.import_db, &opts),
                Arc::clone(runtime),
                cfg.simple_share_limit,
                cfg.shared_literals_per_producer,
                cfg.sharing_sleep,
                &entities,
                &entities,
            ));
        }
        other => bail!("local sharing strategy {other} is not defined"),
    }

    for strategy in &strategies {
        connect_constructor_producers(strategy);
    }
    Ok(strategies)
}

/// Build the selected global strategy. Returns an empty list (with a
/// warning) for a world of one: there is nobody to share with.
pub fn instantiate_global_strategies(
    number: u32,
    cfg: &Config,
    runtime: &Arc<Runtime>,
    comm: &Arc<dyn Comm>,
) -> Result<Vec<Arc<dyn SharingStrategy>>> {
    if comm.world_size() < 2 {
        log::warn!("single-rank world, global sharing disabled");
        return Ok(Vec::new());
    }

    let opts = global_db_options(cfg);
    let db = create_database(cfg.import_db, &opts);
    let strategy: Arc<dyn SharingStrategy> = match number {
        1 => {
            log::info!("global strategy: all-gather");
            AllGatherSharing::new(
                db,
                Arc::clone(comm),
                Arc::clone(runtime),
                cfg.global_shared_literals,
                cfg.global_sharing_sleep,
            )
        }
        2 => {
            log::info!("global strategy: mallob tree");
            MallobSharing::new(
                db,
                Arc::clone(comm),
                Arc::clone(runtime),
                MallobConfig {
                    base_buffer_size: cfg.global_shared_literals,
                    max_buffer_size: cfg.mallob_max_buffer_size,
                    lbd_limit: cfg.mallob_lbd_limit,
                    size_limit: cfg.mallob_size_limit,
                    sharings_per_second: cfg.mallob_sharings_per_second,
                    max_compensation: cfg.mallob_max_compensation,
                    reshare_period_micros: cfg.mallob_reshare_period,
                    free_max_size: 1,
                },
            )
        }
        3 => {
            log::info!("global strategy: ring");
            GenericGlobalSharing::ring(
                db,
                Arc::clone(comm),
                Arc::clone(runtime),
                cfg.global_shared_literals,
                cfg.global_sharing_sleep,
            )
        }
        other => bail!("global sharing strategy {other} is not defined"),
    };
    Ok(vec![strategy])
}

/// Spawn the sharer threads: one per strategy, or a single round-robin
/// sharer when `one_sharer` is set.
pub fn launch_sharers(
    strategies: Vec<Arc<dyn SharingStrategy>>,
    runtime: &Arc<Runtime>,
    one_sharer: bool,
    init_sleep_micros: u64,
) -> Vec<Sharer> {
    if strategies.is_empty() {
        return Vec::new();
    }
    let init_sleep = Duration::from_micros(init_sleep_micros);
    if one_sharer {
        vec![Sharer::new(0, strategies, Arc::clone(runtime), init_sleep)]
    } else {
        strategies
            .into_iter()
            .enumerate()
            .map(|(id, strategy)| {
                Sharer::new(id, vec![strategy], Arc::clone(runtime), init_sleep)
            })
            .collect()
    }
}
