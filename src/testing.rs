//! Testing utilities: deterministic stand-ins for solver engines and small
//! DIMACS fixtures.
//!
//! The coordination layer is exercised far more easily with scripted
//! entities than with real engines: a [`ScriptedProducer`] exports exactly
//! the clauses a test asks for, a [`RecordingConsumer`] remembers everything
//! offered to it, and a [`FixedResultSolver`] concludes with a preset result
//! after an interruptible delay.

use crate::clause::{Clause, ClauseRef};
use crate::sharing::entity::{EntityCore, SharingEntity};
use crate::solvers::{SatResult, SolverAlgorithmType, SolverInterface};
use anyhow::Result;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A sharing entity that produces scripted clauses.
pub struct ScriptedProducer {
    entity: EntityCore,
}

impl ScriptedProducer {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedProducer {
            entity: EntityCore::new(),
        })
    }

    /// Export one clause (tagged with this producer's id) to every client.
    pub fn emit(&self, lits: &[i32], lbd: u32) -> ClauseRef {
        let clause =
            Clause::from_lits(lits, lbd, self.sharing_id()).expect("scripted clause is non-empty");
        self.entity.export_clause(&clause);
        clause
    }
}

impl SharingEntity for ScriptedProducer {
    fn entity_core(&self) -> &EntityCore {
        &self.entity
    }

    fn import_clause(&self, _clause: &ClauseRef) -> bool {
        false
    }
}

/// A sharing entity that records every clause offered to it.
pub struct RecordingConsumer {
    entity: EntityCore,
    seen: Mutex<Vec<ClauseRef>>,
}

impl RecordingConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingConsumer {
            entity: EntityCore::new(),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Copy of everything imported so far.
    pub fn seen(&self) -> Vec<ClauseRef> {
        self.seen.lock().clone()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }
}

impl SharingEntity for RecordingConsumer {
    fn entity_core(&self) -> &EntityCore {
        &self.entity
    }

    fn import_clause(&self, clause: &ClauseRef) -> bool {
        self.seen.lock().push(clause.clone());
        true
    }
}

/// An engine that concludes with a fixed result after an interruptible
/// delay.
pub struct FixedResultSolver {
    entity: EntityCore,
    solver_id: u32,
    result: SatResult,
    model: Vec<i32>,
    delay: Duration,
    interrupted: AtomicBool,
}

impl FixedResultSolver {
    pub fn new(solver_id: u32, result: SatResult, model: Vec<i32>) -> Arc<Self> {
        Self::with_delay(solver_id, result, model, Duration::ZERO)
    }

    pub fn with_delay(
        solver_id: u32,
        result: SatResult,
        model: Vec<i32>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(FixedResultSolver {
            entity: EntityCore::new(),
            solver_id,
            result,
            model,
            delay,
            interrupted: AtomicBool::new(false),
        })
    }
}

impl SharingEntity for FixedResultSolver {
    fn entity_core(&self) -> &EntityCore {
        &self.entity
    }

    fn import_clause(&self, _clause: &ClauseRef) -> bool {
        true
    }
}

impl SolverInterface for FixedResultSolver {
    fn solver_id(&self) -> u32 {
        self.solver_id
    }

    fn solver_type_id(&self) -> u32 {
        0
    }

    fn algo_type(&self) -> SolverAlgorithmType {
        SolverAlgorithmType::Other
    }

    fn name(&self) -> &'static str {
        "fixed-result"
    }

    fn variables_count(&self) -> usize {
        self.model.len()
    }

    fn load_formula(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn add_initial_clauses(&self, _clauses: &[Vec<i32>], _var_count: usize) {}

    fn add_clause(&self, _clause: ClauseRef) {}

    fn diversify(&self, _global_id: u32, _type_id: u32) {}

    fn solve(&self, _cube: &[i32]) -> SatResult {
        let deadline = Instant::now() + self.delay;
        while Instant::now() < deadline {
            if self.interrupted.load(Ordering::Acquire) {
                return SatResult::Unknown;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.result
    }

    fn get_model(&self) -> Vec<i32> {
        self.model.clone()
    }

    fn set_solver_interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    fn unset_solver_interrupt(&self) {
        self.interrupted.store(false, Ordering::Release);
    }

    fn as_sharing_entity(self: Arc<Self>) -> Arc<dyn SharingEntity> {
        self
    }
}

/// Render a DIMACS CNF string.
pub fn dimacs(var_count: usize, clauses: &[&[i32]]) -> String {
    let mut out = format!("p cnf {var_count} {}\n", clauses.len());
    for clause in clauses {
        for lit in *clause {
            out.push_str(&lit.to_string());
            out.push(' ');
        }
        out.push_str("0\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_clauses_reach_recording_consumers() {
        let producer = ScriptedProducer::new();
        let consumer = RecordingConsumer::new();
        producer.add_client(consumer.clone());
        producer.emit(&[1, -2], 2);
        assert_eq!(consumer.seen_count(), 1);
        assert_eq!(consumer.seen()[0].from, producer.sharing_id());
    }

    #[test]
    fn dimacs_rendering() {
        let text = dimacs(3, &[&[1, -2], &[3]]);
        assert_eq!(text, "p cnf 3 2\n1 -2 0\n3 0\n");
    }
}
