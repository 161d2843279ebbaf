//! PRS-style distributed portfolio.
//!
//! Rank 0 runs the preprocessing passes and a conclusive verdict ends the
//! whole run before anything else starts. The surviving formula is broadcast
//! and the world is partitioned into five topology groups -- SAT-focused,
//! UNSAT-focused, MAPLE, LGL and DEFAULT -- whose sizes split the world as
//! `world/8, world/4, world/8, 1, rest`. The group selects the engine
//! configuration (a per-group diversification lane); clause exchange runs a
//! Horde local strategy and the two-neighbour ring instance of the generic
//! global strategy, with the global strategy its own client so received
//! clauses keep travelling around the ring.

use crate::config::Config;
use crate::database::{DatabaseOptions, create_database};
use crate::formula::broadcast_formula;
use crate::global::comm::{Comm, ROOT_RANK, tags};
use crate::global::generic::GenericGlobalSharing;
use crate::preprocess::{
    Preprocessor, PureLiteralPass, UnitPropagationPass, restore_model_stack, run_passes,
};
use crate::runtime::Runtime;
use crate::sharing::factory as sharing_factory;
use crate::sharing::horde::HordeSharing;
use crate::sharing::{Sharer, SharingEntity, SharingStrategy, connect_producer};
use crate::solvers::{IdScaler, SatResult, SolverFactory, SolverInterface};
use crate::working::{SequentialWorker, WorkingStrategy};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Largest clause size kept by the local Horde database in this strategy.
const PRS_LOCAL_MAX_CLAUSE_SIZE: usize = 80;

/// Topology group of a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrsGroup {
    Sat,
    Unsat,
    Maple,
    Lgl,
    Default,
}

impl PrsGroup {
    /// Diversification lane of the group, folded into the type scaler so
    /// engines of different groups never share a configuration.
    fn lane(self) -> u32 {
        match self {
            PrsGroup::Sat => 0,
            PrsGroup::Unsat => 1,
            PrsGroup::Maple => 2,
            PrsGroup::Lgl => 3,
            PrsGroup::Default => 4,
        }
    }
}

/// Split the world into the five groups and place `rank`: returns the group
/// and the rank within it.
pub fn compute_node_group(world_size: usize, rank: usize) -> (PrsGroup, usize) {
    assert!(rank < world_size, "rank outside the world");
    let half_quarter = world_size / 8;
    let quarter = world_size / 4;
    let sizes = [
        (PrsGroup::Sat, half_quarter),
        (PrsGroup::Unsat, quarter),
        (PrsGroup::Maple, half_quarter),
        (PrsGroup::Lgl, 1.min(world_size)),
    ];

    let mut offset = 0;
    for (group, size) in sizes {
        if rank < offset + size {
            return (group, rank - offset);
        }
        offset += size;
    }
    (PrsGroup::Default, rank - offset)
}

/// The PRS distributed coordinator.
pub struct PortfolioPrs {
    cfg: Config,
    runtime: Arc<Runtime>,
    comm: Arc<dyn Comm>,
    strategy_ending: AtomicBool,
    slaves: Mutex<Vec<Arc<SequentialWorker>>>,
    solvers: Mutex<Vec<Arc<dyn SolverInterface>>>,
    sharers: Mutex<Vec<Sharer>>,
    preprocessors: Mutex<Vec<Box<dyn Preprocessor>>>,
    self_weak: OnceLock<Weak<PortfolioPrs>>,
}

impl PortfolioPrs {
    pub fn new(cfg: Config, runtime: Arc<Runtime>, comm: Arc<dyn Comm>) -> Arc<Self> {
        let portfolio = Arc::new(PortfolioPrs {
            cfg,
            runtime,
            comm,
            strategy_ending: AtomicBool::new(false),
            slaves: Mutex::new(Vec::new()),
            solvers: Mutex::new(Vec::new()),
            sharers: Mutex::new(Vec::new()),
            preprocessors: Mutex::new(Vec::new()),
            self_weak: OnceLock::new(),
        });
        let _ = portfolio.self_weak.set(Arc::downgrade(&portfolio));
        portfolio
    }

    fn self_as_parent(&self) -> Weak<dyn WorkingStrategy> {
        let weak: Weak<PortfolioPrs> = self
            .self_weak
            .get()
            .expect("constructed through new()")
            .clone();
        weak
    }
}

impl WorkingStrategy for PortfolioPrs {
    fn solve(&self, cube: &[i32]) {
        log::info!(">> portfolio prs");
        let rank = self.comm.rank();

        // Rank 0 is the sole executor of the preprocessing pipeline.
        let mut formula = None;
        if rank == ROOT_RANK {
            let Some(path) = self.cfg.input.as_ref() else {
                log::error!("no input file");
                std::process::exit(crate::errors::ARGS);
            };
            let mut parsed = match crate::formula::Formula::from_dimacs_file(path) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::error!("parse error: {err:#}");
                    std::process::exit(crate::errors::PARSING);
                }
            };
            let mut passes: Vec<Box<dyn Preprocessor>> = vec![
                Box::new(UnitPropagationPass::new()),
                Box::new(PureLiteralPass::new()),
            ];
            let verdict = run_passes(&mut passes, &mut parsed, self.cfg.preprocess_clause_limit);
            match verdict {
                SatResult::Unknown => {
                    *self.preprocessors.lock() = passes;
                    formula = Some(parsed);
                }
                SatResult::Sat => {
                    let mut model = passes
                        .last()
                        .map(|pass| pass.model(parsed.var_count))
                        .unwrap_or_default();
                    restore_model_stack(&passes, &mut model);
                    log::info!("preprocessing answered SAT");
                    self.runtime.set_result(SatResult::Sat);
                    self.runtime.set_model(model);
                }
                other => {
                    log::info!("preprocessing answered {other}");
                    self.runtime.set_result(other);
                }
            }
        }

        // Verdict synchronisation, then the formula itself.
        let verdict = self
            .comm
            .broadcast_i32(ROOT_RANK, self.runtime.result() as i32);
        if verdict != 0 {
            self.runtime
                .finish(SatResult::from_i32(verdict), Vec::new(), ROOT_RANK);
            return;
        }
        let formula = match broadcast_formula(self.comm.as_ref(), ROOT_RANK, formula) {
            Ok(formula) => formula,
            Err(err) => {
                log::error!("formula broadcast failed: {err:#}");
                std::process::exit(crate::errors::MPI);
            }
        };

        // Topology group of this rank.
        let world_size = self.comm.world_size() as usize;
        let (group, rank_in_group) = compute_node_group(world_size, rank as usize);
        log::info!("rank {rank} is in group {group:?} (rank {rank_in_group} within it)");

        // Engines, diversified within the group lane.
        let solvers = match SolverFactory::create_solvers(
            self.cfg.cpus,
            &self.cfg.solver,
            self.cfg.import_db_cap,
        ) {
            Ok(solvers) => solvers,
            Err(err) => {
                log::error!("portfolio construction failed: {err:#}");
                std::process::exit(crate::errors::UNKNOWN_SOLVER);
            }
        };
        let cpus = self.cfg.cpus as u32;
        let global_scaler: IdScaler = {
            let rank = rank as u32;
            Arc::new(move |solver: &dyn SolverInterface| rank * cpus + solver.solver_id())
        };
        let type_scaler: IdScaler = {
            let rank_in_group = rank_in_group as u32;
            let lane = group.lane();
            Arc::new(move |solver: &dyn SolverInterface| {
                (lane << 12) + rank_in_group * cpus + solver.solver_type_id()
            })
        };
        SolverFactory::diversification(&solvers, &global_scaler, &type_scaler);

        // Load the formula and start the race before sharing spins up.
        let workers: Vec<Arc<SequentialWorker>> = solvers
            .iter()
            .map(|solver| {
                let worker = SequentialWorker::new(Arc::clone(solver), Arc::clone(&self.runtime));
                worker.set_parent(self.self_as_parent());
                worker
            })
            .collect();
        solvers.par_iter().for_each(|solver| {
            solver.add_initial_clauses(&formula.clauses, formula.var_count);
        });
        log::info!("all solvers loaded the clauses");
        for worker in &workers {
            WorkingStrategy::solve(worker.as_ref(), cube);
        }

        // Local Horde over a wider per-size database.
        let local_db = create_database(
            self.cfg.import_db,
            &DatabaseOptions {
                max_clause_size: PRS_LOCAL_MAX_CLAUSE_SIZE,
                capacity: self.cfg.import_db_cap,
                mallob_partitioning_lbd: 2,
                mallob_free_max_size: 1,
            },
        );
        let local_strategy: Arc<dyn SharingStrategy> = HordeSharing::new(
            local_db,
            Arc::clone(&self.runtime),
            self.cfg.shared_literals_per_producer,
            self.cfg.horde_initial_lbd_limit,
            self.cfg.horde_init_round,
            self.cfg.sharing_sleep,
            &[],
            &[],
        );

        // Ring exchange: the previous neighbour produces for us, we produce
        // for the next one.
        let global_db = create_database(
            self.cfg.import_db,
            &DatabaseOptions {
                max_clause_size: self.cfg.max_clause_size,
                capacity: self.cfg.global_shared_literals * 10,
                mallob_partitioning_lbd: 2,
                mallob_free_max_size: 1,
            },
        );
        let global_strategy: Arc<dyn SharingStrategy> = GenericGlobalSharing::ring(
            global_db,
            Arc::clone(&self.comm),
            Arc::clone(&self.runtime),
            self.cfg.global_shared_literals,
            self.cfg.global_sharing_sleep,
        );

        // Producers export to the local strategy, which feeds the ring;
        // clauses received from the ring go straight to the solvers, and the
        // strategy is its own client so they also travel onward.
        let global_entity = Arc::clone(&global_strategy).as_entity();
        local_strategy.add_client(Arc::clone(&global_entity));
        global_strategy.add_client(Arc::clone(&global_entity));
        for solver in &solvers {
            let entity = Arc::clone(solver).as_sharing_entity();
            local_strategy.add_client(Arc::clone(&entity));
            local_strategy.add_producer(&entity);
            connect_producer(&local_strategy, &entity);
            global_strategy.add_client(entity);
        }

        *self.sharers.lock() = sharing_factory::launch_sharers(
            vec![local_strategy, global_strategy],
            &self.runtime,
            self.cfg.one_sharer,
            self.cfg.init_sleep,
        );
        *self.slaves.lock() = workers;
        *self.solvers.lock() = solvers;
    }

    fn join(&self, winner: Option<&SequentialWorker>, result: SatResult, model: Vec<i32>) {
        if result == SatResult::Unknown || self.strategy_ending.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_solver_interrupt();
        if let Some(winner) = winner {
            winner.solver().print_winning_log();
        }
        self.runtime.finish(result, model, self.comm.rank());
    }

    fn set_solver_interrupt(&self) {
        for slave in self.slaves.lock().iter() {
            slave.set_solver_interrupt();
        }
    }

    fn unset_solver_interrupt(&self) {
        for slave in self.slaves.lock().iter() {
            slave.unset_solver_interrupt();
        }
    }

    fn wait_interrupt(&self) {
        for slave in self.slaves.lock().iter() {
            slave.wait_interrupt();
        }
    }

    fn finalize(&self) {
        for sharer in self.sharers.lock().iter_mut() {
            sharer.join();
        }

        // Winner model funnel, then reverse model restoration on rank 0.
        let winner = self.runtime.winner_rank();
        if self.runtime.result() == SatResult::Sat && winner > 0 {
            if self.comm.rank() == winner {
                let model = self.runtime.model();
                self.comm.send_i32s(ROOT_RANK, tags::MODEL, &model);
            } else if self.comm.rank() == ROOT_RANK {
                let model = self.comm.recv_i32s(winner, tags::MODEL);
                self.runtime.set_model(model);
            }
        }
        if self.comm.rank() == ROOT_RANK && self.runtime.result() == SatResult::Sat {
            let passes = self.preprocessors.lock();
            self.runtime
                .with_model_mut(|model| restore_model_stack(&passes, model));
        }

        SolverFactory::print_stats(&self.solvers.lock());
        self.slaves.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_partition_covers_the_world() {
        // World of 16: 2 SAT, 4 UNSAT, 2 MAPLE, 1 LGL, 7 DEFAULT.
        let groups: Vec<PrsGroup> = (0..16).map(|r| compute_node_group(16, r).0).collect();
        assert_eq!(groups.iter().filter(|g| **g == PrsGroup::Sat).count(), 2);
        assert_eq!(groups.iter().filter(|g| **g == PrsGroup::Unsat).count(), 4);
        assert_eq!(groups.iter().filter(|g| **g == PrsGroup::Maple).count(), 2);
        assert_eq!(groups.iter().filter(|g| **g == PrsGroup::Lgl).count(), 1);
        assert_eq!(groups.iter().filter(|g| **g == PrsGroup::Default).count(), 7);
        // Boundaries in declaration order.
        assert_eq!(compute_node_group(16, 0).0, PrsGroup::Sat);
        assert_eq!(compute_node_group(16, 2).0, PrsGroup::Unsat);
        assert_eq!(compute_node_group(16, 6).0, PrsGroup::Maple);
        assert_eq!(compute_node_group(16, 8).0, PrsGroup::Lgl);
        assert_eq!(compute_node_group(16, 9), (PrsGroup::Default, 0));
    }

    #[test]
    fn tiny_worlds_still_place_every_rank() {
        assert_eq!(compute_node_group(1, 0).0, PrsGroup::Lgl);
        let (g0, _) = compute_node_group(2, 0);
        let (g1, _) = compute_node_group(2, 1);
        assert_eq!(g0, PrsGroup::Lgl);
        assert_eq!(g1, PrsGroup::Default);
    }
}
