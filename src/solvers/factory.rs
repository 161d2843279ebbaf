//! Engine construction and diversification.

use crate::solvers::{DpllSolver, SolverInterface};
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps an engine to one of its diversification ids. Distributed runs scale
/// the local ids by the process rank so every engine of the whole run gets a
/// unique pair.
pub type IdScaler = Arc<dyn Fn(&dyn SolverInterface) -> u32 + Send + Sync>;

/// Builds engine portfolios.
pub struct SolverFactory;

impl SolverFactory {
    /// Instantiate `count` engines by cycling over the portfolio string,
    /// one character per engine kind.
    ///
    /// Currently `d` (the built-in DPLL engine) is linked in; the CDCL and
    /// local-search characters of the historical portfolios require their
    /// external engines.
    pub fn create_solvers(
        count: usize,
        portfolio: &str,
        import_capacity: usize,
    ) -> Result<Vec<Arc<dyn SolverInterface>>> {
        if portfolio.is_empty() {
            bail!("empty portfolio string");
        }
        let kinds: Vec<char> = portfolio.chars().collect();
        let mut per_kind_count: HashMap<char, u32> = HashMap::new();
        let mut solvers: Vec<Arc<dyn SolverInterface>> = Vec::with_capacity(count);

        for id in 0..count {
            let kind = kinds[id % kinds.len()];
            let type_id = {
                let counter = per_kind_count.entry(kind).or_insert(0);
                let type_id = *counter;
                *counter += 1;
                type_id
            };
            let solver: Arc<dyn SolverInterface> = match kind {
                'd' => DpllSolver::new(id as u32, type_id, import_capacity),
                other => {
                    bail!("unknown engine kind '{other}' in portfolio '{portfolio}'");
                }
            };
            solvers.push(solver);
        }
        log::info!("created {count} engines from portfolio '{portfolio}'");
        Ok(solvers)
    }

    /// Hand every engine its `(global_id, type_id)` pair through the
    /// injectable scalers; each engine then deranges its own knobs.
    pub fn diversification(
        solvers: &[Arc<dyn SolverInterface>],
        global_scaler: &IdScaler,
        type_scaler: &IdScaler,
    ) {
        for solver in solvers {
            let global_id = global_scaler(solver.as_ref());
            let type_id = type_scaler(solver.as_ref());
            solver.diversify(global_id, type_id);
        }
    }

    /// The identity scalers of a single-process run.
    pub fn local_scalers() -> (IdScaler, IdScaler) {
        (
            Arc::new(|solver: &dyn SolverInterface| solver.solver_id()),
            Arc::new(|solver: &dyn SolverInterface| solver.solver_type_id()),
        )
    }

    /// Rank-scaled id computation for distributed runs:
    /// `rank * cpus + local_id`.
    pub fn distributed_scalers(rank: u32, cpus: u32) -> (IdScaler, IdScaler) {
        (
            Arc::new(move |solver: &dyn SolverInterface| rank * cpus + solver.solver_id()),
            Arc::new(move |solver: &dyn SolverInterface| rank * cpus + solver.solver_type_id()),
        )
    }

    /// Log the statistics of every engine.
    pub fn print_stats(solvers: &[Arc<dyn SolverInterface>]) {
        for solver in solvers {
            solver.print_statistics();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_is_cycled_and_type_ids_count_per_kind() {
        let solvers = SolverFactory::create_solvers(4, "d", 100).unwrap();
        assert_eq!(solvers.len(), 4);
        let type_ids: Vec<u32> = solvers.iter().map(|s| s.solver_type_id()).collect();
        assert_eq!(type_ids, vec![0, 1, 2, 3]);
        let ids: Vec<u32> = solvers.iter().map(|s| s.solver_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(SolverFactory::create_solvers(2, "dx", 100).is_err());
        assert!(SolverFactory::create_solvers(1, "", 100).is_err());
    }

    #[test]
    fn diversification_gives_unique_pairs() {
        let solvers = SolverFactory::create_solvers(3, "d", 100).unwrap();
        let (global, typed) = SolverFactory::distributed_scalers(2, 3);
        SolverFactory::diversification(&solvers, &global, &typed);
        // rank 2, cpus 3: global ids 6, 7, 8.
        let globals: Vec<u32> = solvers.iter().map(|s| global(s.as_ref())).collect();
        assert_eq!(globals, vec![6, 7, 8]);
    }
}
