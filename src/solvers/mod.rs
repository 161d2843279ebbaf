//! Solver engines and their contract.
//!
//! The framework treats SAT engines as opaque collaborators behind
//! [`SolverInterface`]: load a formula, diversify, solve (possibly for
//! hours), hand back a model, accept an interrupt, and exchange learned
//! clauses. Every engine is also a [`SharingEntity`]: clauses it deems
//! exportable go out to its clients (its local sharing strategy), and
//! clauses shared by others arrive through `import_clause` into a bounded
//! receive buffer consumed at the engine's own checkpoints.
//!
//! [`DpllSolver`] is the built-in reference engine; real CDCL/local-search
//! engines plug in by implementing the same trait.

mod dpll;
mod factory;

pub use dpll::DpllSolver;
pub use factory::{IdScaler, SolverFactory};

use crate::clause::ClauseRef;
use crate::sharing::SharingEntity;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Outcome of a solve call. The numeric values are the classic SAT-solver
/// exit codes and also travel the wire in the winner funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SatResult {
    Unknown = 0,
    Sat = 10,
    Unsat = 20,
    Timeout = 30,
}

impl SatResult {
    /// Decode a wire/exit value; anything unrecognised is `Unknown`.
    pub fn from_i32(value: i32) -> SatResult {
        match value {
            10 => SatResult::Sat,
            20 => SatResult::Unsat,
            30 => SatResult::Timeout,
            _ => SatResult::Unknown,
        }
    }
}

impl std::fmt::Display for SatResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SatResult::Sat => "SATISFIABLE",
            SatResult::Unsat => "UNSATISFIABLE",
            SatResult::Timeout => "TIMEOUT",
            SatResult::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// Algorithm family of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverAlgorithmType {
    Cdcl,
    LocalSearch,
    LookAhead,
    Other,
}

/// Contract every engine implements.
///
/// `solve` may block for hours; `set_solver_interrupt` flips an atomic the
/// engine is required to poll at every conflict boundary, so cancellation is
/// best-effort with no latency guarantee. `import_clause` (from
/// [`SharingEntity`]) must be safe from any thread, including engine-internal
/// ones.
pub trait SolverInterface: SharingEntity {
    /// Sequential id of this engine within the process.
    fn solver_id(&self) -> u32;

    /// Id among engines of the same kind (used by diversification).
    fn solver_type_id(&self) -> u32;

    /// Engine family.
    fn algo_type(&self) -> SolverAlgorithmType;

    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Number of variables of the loaded formula.
    fn variables_count(&self) -> usize;

    /// Parse a DIMACS file and load it.
    fn load_formula(&self, path: &Path) -> Result<()>;

    /// Load an already parsed formula.
    fn add_initial_clauses(&self, clauses: &[Vec<i32>], var_count: usize);

    /// Permanently add one clause to the formula.
    fn add_clause(&self, clause: ClauseRef);

    /// Deterministically derange this engine's knobs from its ids so no two
    /// engines of a run search identically.
    fn diversify(&self, global_id: u32, type_id: u32);

    /// Run the search under the given cube (passed verbatim).
    fn solve(&self, cube: &[i32]) -> SatResult;

    /// The satisfying assignment after a `Sat` result: one nonzero literal
    /// per variable, sign giving the assignment.
    fn get_model(&self) -> Vec<i32>;

    /// Request interruption of the current solve.
    fn set_solver_interrupt(&self);

    /// Allow solving again after an interrupt.
    fn unset_solver_interrupt(&self);

    /// Engine statistics, if it keeps any.
    fn print_statistics(&self) {}

    /// Logged by the coordinator when this engine wins the race.
    fn print_winning_log(&self) {
        log::info!(
            "the winner is solver {} ({})",
            self.solver_id(),
            self.name()
        );
    }

    /// Upcast helper for wiring the engine into the sharing graph.
    fn as_sharing_entity(self: Arc<Self>) -> Arc<dyn SharingEntity>;
}
