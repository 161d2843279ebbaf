//! The simple portfolio: every engine attacks the whole formula.
//!
//! Flow of `solve`: rank 0 (or the solo process) parses the formula and runs
//! the preprocessing passes, any conclusive verdict short-circuiting the
//! run; distributed mode broadcasts the verdict and then the simplified
//! formula; engines are built from the portfolio string and diversified;
//! local strategies come from the factory, global strategies when
//! distributed, cross-linked so the global layer is both a producer and a
//! client of the local one; sharers launch; the initial clauses are loaded
//! into every engine in parallel and the workers start racing.

use crate::config::Config;
use crate::formula::{Formula, broadcast_formula};
use crate::global::comm::{Comm, ROOT_RANK, tags};
use crate::preprocess::{
    Preprocessor, PureLiteralPass, UnitPropagationPass, restore_model_stack, run_passes,
};
use crate::runtime::Runtime;
use crate::sharing::factory as sharing_factory;
use crate::sharing::{Sharer, SharingEntity, SharingStrategy, connect_producer};
use crate::solvers::{SatResult, SolverFactory, SolverInterface};
use crate::working::{SequentialWorker, WorkingStrategy};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Portfolio coordinator over one process (optionally one rank of many).
pub struct PortfolioSimple {
    cfg: Config,
    runtime: Arc<Runtime>,
    comm: Option<Arc<dyn Comm>>,
    strategy_ending: AtomicBool,
    slaves: Mutex<Vec<Arc<SequentialWorker>>>,
    solvers: Mutex<Vec<Arc<dyn SolverInterface>>>,
    sharers: Mutex<Vec<Sharer>>,
    preprocessors: Mutex<Vec<Box<dyn Preprocessor>>>,
    self_weak: OnceLock<Weak<PortfolioSimple>>,
}

impl PortfolioSimple {
    pub fn new(cfg: Config, runtime: Arc<Runtime>, comm: Option<Arc<dyn Comm>>) -> Arc<Self> {
        let portfolio = Arc::new(PortfolioSimple {
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

    fn rank(&self) -> i32 {
        self.comm.as_ref().map_or(0, |comm| comm.rank())
    }

    fn self_as_parent(&self) -> Weak<dyn WorkingStrategy> {
        let weak: Weak<PortfolioSimple> = self
            .self_weak
            .get()
            .expect("portfolio is always constructed through new()")
            .clone();
        weak
    }

    /// Parse and preprocess on rank 0; a conclusive verdict ends the run
    /// before any worker spawns.
    fn prepare_formula(&self) -> Option<Formula> {
        let path = self.cfg.input.as_ref()?;
        let formula = match Formula::from_dimacs_file(path) {
            Ok(formula) => formula,
            Err(err) => {
                log::error!("parse error: {err:#}");
                std::process::exit(crate::errors::PARSING);
            }
        };
        log::info!(
            "parsed {} variables, {} clauses",
            formula.var_count,
            formula.clause_count()
        );

        let mut formula = formula;
        let mut passes: Vec<Box<dyn Preprocessor>> = vec![
            Box::new(UnitPropagationPass::new()),
            Box::new(PureLiteralPass::new()),
        ];
        let verdict = run_passes(
            &mut passes,
            &mut formula,
            self.cfg.preprocess_clause_limit,
        );
        let var_count = formula.var_count;

        match verdict {
            SatResult::Unknown => {
                *self.preprocessors.lock() = passes;
                Some(formula)
            }
            SatResult::Sat => {
                log::info!("preprocessing concluded SAT");
                let mut model = passes
                    .last()
                    .map(|pass| pass.model(var_count))
                    .unwrap_or_default();
                restore_model_stack(&passes, &mut model);
                self.join(None, SatResult::Sat, model);
                None
            }
            other => {
                log::info!("preprocessing concluded {other}");
                self.join(None, other, Vec::new());
                None
            }
        }
    }
}

impl WorkingStrategy for PortfolioSimple {
    fn solve(&self, cube: &[i32]) {
        log::info!(">> portfolio simple");
        let rank = self.rank();

        let mut formula = if rank <= 0 {
            self.prepare_formula()
        } else {
            None
        };

        // Distributed: agree on the preprocessing verdict, then ship the
        // formula.
        if let Some(comm) = &self.comm {
            let verdict = comm.broadcast_i32(ROOT_RANK, self.runtime.result() as i32);
            if verdict != 0 {
                self.runtime
                    .finish(SatResult::from_i32(verdict), Vec::new(), ROOT_RANK);
                return;
            }
            formula = match broadcast_formula(comm.as_ref(), ROOT_RANK, formula) {
                Ok(formula) => Some(formula),
                Err(err) => {
                    log::error!("formula broadcast failed: {err:#}");
                    std::process::exit(crate::errors::MPI);
                }
            };
        } else if formula.is_none() {
            // Solo run concluded (or had no input) during preparation.
            return;
        }
        let formula = formula.expect("formula available past the broadcast");

        // Engines.
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
        let (global_scaler, type_scaler) = match &self.comm {
            Some(comm) => {
                SolverFactory::distributed_scalers(comm.rank() as u32, self.cfg.cpus as u32)
            }
            None => SolverFactory::local_scalers(),
        };
        SolverFactory::diversification(&solvers, &global_scaler, &type_scaler);
        log::info!("diversified all solvers");

        // Sharing graph.
        let local_strategies = match sharing_factory::instantiate_local_strategies(
            self.cfg.sharing_strategy,
            &self.cfg,
            &self.runtime,
            &solvers,
        ) {
            Ok(strategies) => strategies,
            Err(err) => {
                log::error!("local sharing setup failed: {err:#}");
                std::process::exit(crate::errors::NOT_SUPPORTED);
            }
        };
        let global_strategies = match &self.comm {
            Some(comm) => match sharing_factory::instantiate_global_strategies(
                self.cfg.global_sharing_strategy,
                &self.cfg,
                &self.runtime,
                comm,
            ) {
                Ok(strategies) => strategies,
                Err(err) => {
                    log::error!("global sharing setup failed: {err:#}");
                    std::process::exit(crate::errors::NOT_SUPPORTED);
                }
            },
            None => Vec::new(),
        };

        // The global layer is a producer and a client of every local
        // strategy: local selections flow out to the world, and clauses
        // arriving from the world enter local distribution.
        for local in &local_strategies {
            for global in &global_strategies {
                let global_entity = Arc::clone(global).as_entity();
                local.add_producer(&global_entity);
                local.add_client(Arc::clone(&global_entity));
                connect_producer(local, &global_entity);
            }
        }

        let mut all_strategies: Vec<Arc<dyn SharingStrategy>> = Vec::new();
        all_strategies.extend(local_strategies.iter().cloned());
        all_strategies.extend(global_strategies.iter().cloned());

        if self.runtime.is_ending() {
            self.set_solver_interrupt();
            return;
        }

        // Workers: load the formula into every engine in parallel, then
        // start the race.
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
        log::info!("all solvers are fully initialized");

        for worker in &workers {
            WorkingStrategy::solve(worker.as_ref(), cube);
        }

        *self.sharers.lock() = sharing_factory::launch_sharers(
            all_strategies,
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
        self.runtime.finish(result, model, self.rank());
        log::debug!("broadcasted the end locally");
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
        // Sharers first: the distributed end protocol and its statistics
        // complete inside them.
        for sharer in self.sharers.lock().iter_mut() {
            sharer.join();
        }

        // Model funnel: the winning rank ships its model to rank 0.
        if let Some(comm) = &self.comm {
            let winner = self.runtime.winner_rank();
            if self.runtime.result() == SatResult::Sat && winner > 0 {
                if comm.rank() == winner {
                    let model = self.runtime.model();
                    comm.send_i32s(ROOT_RANK, tags::MODEL, &model);
                    log::debug!("sent the model to rank 0");
                } else if comm.rank() == ROOT_RANK {
                    let model = comm.recv_i32s(winner, tags::MODEL);
                    self.runtime.set_model(model);
                    log::debug!("received the model from rank {winner}");
                }
            }
        }

        // Undo the preprocessing renames, last pass first.
        if self.rank() <= 0 && self.runtime.result() == SatResult::Sat {
            let passes = self.preprocessors.lock();
            self.runtime
                .with_model_mut(|model| restore_model_stack(&passes, model));
        }

        SolverFactory::print_stats(&self.solvers.lock());
        // Workers interrupt and join on drop.
        self.slaves.lock().clear();
    }
}
