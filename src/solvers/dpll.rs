//! Built-in DPLL reference engine.
//!
//! A deliberately small, dependable engine so the framework solves formulas
//! out of the box: iterative DPLL with unit propagation, branch flipping,
//! hash-derived decision phases, and deterministic diversification from the
//! `(global_id, type_id)` pair. It participates fully in clause exchange --
//! conflicts produce decision-negation clauses that are exported to the
//! parent strategy, and shared clauses are drained from the bounded receive
//! buffer at every decision checkpoint.
//!
//! Real CDCL engines are expected to replace it in serious deployments; the
//! coordination layer only ever talks to the [`SolverInterface`] contract.

use crate::buffer::ClauseBuffer;
use crate::clause::{Clause, ClauseRef};
use crate::formula::Formula;
use crate::sharing::entity::{EntityCore, SharingEntity};
use crate::solvers::{SatResult, SolverAlgorithmType, SolverInterface};
use anyhow::Result;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Imported clauses drained per decision checkpoint.
const IMPORTS_PER_CHECKPOINT: usize = 32;

/// Learned clauses longer than this stay engine-local.
const EXPORT_SIZE_LIMIT: usize = 30;

/// Learned clauses up to this size are also kept locally.
const LOCAL_LEARN_SIZE_LIMIT: usize = 2;

struct EngineState {
    var_count: usize,
    clauses: Vec<Vec<i32>>,
}

/// The reference DPLL engine.
pub struct DpllSolver {
    entity: EntityCore,
    solver_id: u32,
    type_id: AtomicU32,
    seed: AtomicU32,
    interrupted: AtomicBool,
    state: Mutex<EngineState>,
    model: Mutex<Vec<i32>>,
    /// Bounded receive buffer for shared clauses.
    import_buffer: ClauseBuffer,
    conflicts: AtomicU64,
    decisions: AtomicU64,
    imported: AtomicU64,
}

impl DpllSolver {
    pub fn new(solver_id: u32, type_id: u32, import_capacity: usize) -> Arc<Self> {
        Arc::new(DpllSolver {
            entity: EntityCore::new(),
            solver_id,
            type_id: AtomicU32::new(type_id),
            seed: AtomicU32::new(solver_id),
            interrupted: AtomicBool::new(false),
            state: Mutex::new(EngineState {
                var_count: 0,
                clauses: Vec::new(),
            }),
            model: Mutex::new(Vec::new()),
            import_buffer: ClauseBuffer::new(import_capacity),
            conflicts: AtomicU64::new(0),
            decisions: AtomicU64::new(0),
            imported: AtomicU64::new(0),
        })
    }

    fn value(assignment: &[i8], lit: i32) -> i8 {
        let var = lit.unsigned_abs() as usize;
        assignment[var] * lit.signum() as i8
    }

    fn assign(assignment: &mut [i8], lit: i32) {
        assignment[lit.unsigned_abs() as usize] = lit.signum() as i8;
    }

    /// Propagate units to fixpoint; true on conflict.
    fn propagate(
        clauses: &[Vec<i32>],
        assignment: &mut [i8],
        trail: &mut Vec<(i32, bool, bool)>,
    ) -> bool {
        loop {
            let mut changed = false;
            for clause in clauses {
                let mut unassigned = None;
                let mut open = 0;
                let mut satisfied = false;
                for &lit in clause {
                    match Self::value(assignment, lit) {
                        1 => {
                            satisfied = true;
                            break;
                        }
                        0 => {
                            open += 1;
                            unassigned = Some(lit);
                        }
                        _ => {}
                    }
                }
                if satisfied {
                    continue;
                }
                match open {
                    0 => return true,
                    1 => {
                        let lit = unassigned.expect("one open literal");
                        Self::assign(assignment, lit);
                        trail.push((lit, false, false));
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                return false;
            }
        }
    }

    /// Undo down to the most recent unflipped decision above `base` and
    /// flip it. False when the search space is exhausted.
    fn backtrack(assignment: &mut [i8], trail: &mut Vec<(i32, bool, bool)>, base: usize) -> bool {
        while trail.len() > base {
            let (lit, is_decision, flipped) = trail.pop().expect("trail above base");
            assignment[lit.unsigned_abs() as usize] = 0;
            if is_decision && !flipped {
                let negated = -lit;
                Self::assign(assignment, negated);
                trail.push((negated, true, true));
                return true;
            }
        }
        false
    }

    /// The negation of every current branching assignment; what this engine
    /// learns from a conflict.
    fn conflict_clause(trail: &[(i32, bool, bool)]) -> Vec<i32> {
        trail
            .iter()
            .filter(|(_, is_decision, _)| *is_decision)
            .map(|(lit, _, _)| -lit)
            .collect()
    }

    /// Diversified decision phase: a per-engine hash of the variable.
    fn phase(&self, var: usize) -> bool {
        let h = (var as u32)
            .wrapping_mul(0x9E37_79B9)
            .wrapping_add(self.seed.load(Ordering::Relaxed));
        h & 1 == 0
    }

    /// Drain a batch of shared clauses into the working clause set.
    fn drain_imports(&self, clauses: &mut Vec<Vec<i32>>, var_count: usize) {
        for _ in 0..IMPORTS_PER_CHECKPOINT {
            let Some(clause) = self.import_buffer.get_clause() else {
                break;
            };
            if clause
                .iter()
                .all(|&l| l.unsigned_abs() as usize <= var_count)
            {
                self.imported.fetch_add(1, Ordering::Relaxed);
                clauses.push(clause.lits().to_vec());
            }
        }
    }

    fn export_learned(&self, lits: &[i32]) {
        if lits.is_empty() || lits.len() > EXPORT_SIZE_LIMIT {
            return;
        }
        let lbd = lits.len() as u32;
        if let Ok(clause) = Clause::from_lits(lits, lbd, self.sharing_id()) {
            self.entity.export_clause(&clause);
        }
    }
}

impl SharingEntity for DpllSolver {
    fn entity_core(&self) -> &EntityCore {
        &self.entity
    }

    fn import_clause(&self, clause: &ClauseRef) -> bool {
        // Back-pressure: a full receive buffer silently drops the clause;
        // shared clauses are advisory.
        self.import_buffer.try_add_clause_bounded(clause.clone())
    }
}

impl SolverInterface for DpllSolver {
    fn solver_id(&self) -> u32 {
        self.solver_id
    }

    fn solver_type_id(&self) -> u32 {
        self.type_id.load(Ordering::Relaxed)
    }

    fn algo_type(&self) -> SolverAlgorithmType {
        SolverAlgorithmType::Cdcl
    }

    fn name(&self) -> &'static str {
        "dpll"
    }

    fn variables_count(&self) -> usize {
        self.state.lock().var_count
    }

    fn load_formula(&self, path: &Path) -> Result<()> {
        let formula = Formula::from_dimacs_file(path)?;
        self.add_initial_clauses(&formula.clauses, formula.var_count);
        Ok(())
    }

    fn add_initial_clauses(&self, clauses: &[Vec<i32>], var_count: usize) {
        let mut state = self.state.lock();
        state.var_count = var_count;
        state.clauses = clauses.to_vec();
    }

    fn add_clause(&self, clause: ClauseRef) {
        self.state.lock().clauses.push(clause.lits().to_vec());
    }

    fn diversify(&self, global_id: u32, type_id: u32) {
        self.type_id.store(type_id, Ordering::Relaxed);
        self.seed
            .store(global_id.wrapping_mul(31).wrapping_add(type_id), Ordering::Relaxed);
        log::debug!(
            "solver {}: diversified with global id {global_id}, type id {type_id}",
            self.solver_id
        );
    }

    fn solve(&self, cube: &[i32]) -> SatResult {
        let (var_count, mut clauses) = {
            let state = self.state.lock();
            (state.var_count, state.clauses.clone())
        };

        let mut assignment = vec![0i8; var_count + 1];
        let mut trail: Vec<(i32, bool, bool)> = Vec::new();

        // The cube is asserted below any decision and never undone.
        for &lit in cube {
            if lit == 0 || lit.unsigned_abs() as usize > var_count {
                continue;
            }
            match Self::value(&assignment, lit) {
                -1 => return SatResult::Unsat,
                0 => {
                    Self::assign(&mut assignment, lit);
                    trail.push((lit, false, false));
                }
                _ => {}
            }
        }
        let base = trail.len();

        loop {
            if self.interrupted.load(Ordering::Acquire) {
                return SatResult::Unknown;
            }

            if Self::propagate(&clauses, &mut assignment, &mut trail) {
                // Conflict.
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                let learned = Self::conflict_clause(&trail[base..]);
                self.export_learned(&learned);
                if !learned.is_empty() && learned.len() <= LOCAL_LEARN_SIZE_LIMIT {
                    clauses.push(learned);
                }
                if !Self::backtrack(&mut assignment, &mut trail, base) {
                    return SatResult::Unsat;
                }
                continue;
            }

            // Decision checkpoint: pick up shared clauses, then branch.
            self.drain_imports(&mut clauses, var_count);

            let seed = self.seed.load(Ordering::Relaxed) as usize;
            let decision = (0..var_count)
                .map(|offset| 1 + (offset + seed) % var_count)
                .find(|&var| assignment[var] == 0);
            let Some(var) = decision else {
                // Full consistent assignment.
                let mut model = Vec::with_capacity(var_count);
                for var in 1..=var_count {
                    let value = if assignment[var] >= 0 { 1 } else { -1 };
                    model.push(value * var as i32);
                }
                *self.model.lock() = model;
                return SatResult::Sat;
            };

            self.decisions.fetch_add(1, Ordering::Relaxed);
            let lit = if self.phase(var) {
                var as i32
            } else {
                -(var as i32)
            };
            Self::assign(&mut assignment, lit);
            trail.push((lit, true, false));
        }
    }

    fn get_model(&self) -> Vec<i32> {
        self.model.lock().clone()
    }

    fn set_solver_interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    fn unset_solver_interrupt(&self) {
        self.interrupted.store(false, Ordering::Release);
    }

    fn print_statistics(&self) {
        log::info!(
            "solver {}: {} conflicts, {} decisions, {} imported clauses",
            self.solver_id,
            self.conflicts.load(Ordering::Relaxed),
            self.decisions.load(Ordering::Relaxed),
            self.imported.load(Ordering::Relaxed)
        );
    }

    fn as_sharing_entity(self: Arc<Self>) -> Arc<dyn SharingEntity> {
        self
    }
}
