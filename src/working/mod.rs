//! Working strategies: the coordinator tree that owns engines and sharers.
//!
//! A working strategy forms a tree whose leaves are [`SequentialWorker`]s
//! (one engine on one OS thread each). `solve` fans out; the first
//! conclusive `join` races back up to the root, which runs the termination
//! protocol and interrupts everyone else.

pub mod portfolio;
pub mod prs;
pub mod worker;

pub use portfolio::PortfolioSimple;
pub use prs::PortfolioPrs;
pub use worker::SequentialWorker;

use crate::solvers::SatResult;

/// A node of the coordinator tree.
pub trait WorkingStrategy: Send + Sync {
    /// Start solving under the given cube (passed verbatim to every
    /// engine). Returns when the work is launched, not when it concludes.
    fn solve(&self, cube: &[i32]);

    /// A slave (or this node itself) reports a result. `winner` names the
    /// leaf worker that concluded, when one did.
    fn join(&self, winner: Option<&SequentialWorker>, result: SatResult, model: Vec<i32>);

    /// Interrupt every engine below this node.
    fn set_solver_interrupt(&self);

    /// Re-allow solving below this node.
    fn unset_solver_interrupt(&self);

    /// Block until no engine below this node is inside `solve`.
    fn wait_interrupt(&self);

    /// Tear down after the solve concluded: join sharers, run the
    /// distributed model funnel, restore the model through the preprocessor
    /// stack, emit statistics.
    fn finalize(&self) {}
}
