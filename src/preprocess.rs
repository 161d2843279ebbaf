//! Formula preprocessing.
//!
//! Preprocessors simplify the formula before the engines see it; each pass
//! that ran is pushed onto a restore stack, and after a SAT verdict the
//! stack is unwound in reverse so every layer un-rewrites its own
//! transformation of the model. A pass may also conclude the whole solve
//! (trivially SAT or UNSAT), which short-circuits the run before any worker
//! spawns.
//!
//! Two equisatisfiable passes are provided: unit propagation (with
//! assignment remembering) and pure-literal elimination. Heavier algorithms
//! plug in through the same [`Preprocessor`] contract.

use crate::formula::Formula;
use crate::solvers::SatResult;

/// A formula simplification pass with model restoration.
pub trait Preprocessor: Send {
    /// Short pass name for logs.
    fn name(&self) -> &'static str;

    /// Simplify `formula` in place. Returns `Unknown` to continue solving,
    /// or a conclusive verdict that short-circuits the run.
    fn simplify(&mut self, formula: &mut Formula) -> SatResult;

    /// Rewrite a model of the simplified formula into a model of the input
    /// formula this pass saw. `model[v - 1]` is the signed assignment of
    /// variable `v`.
    fn restore_model(&self, model: &mut Vec<i32>);

    /// A complete model when [`simplify`](Self::simplify) concluded SAT:
    /// every forced variable at its forced value, free variables positive.
    fn model(&self, var_count: usize) -> Vec<i32>;
}

/// Run `passes` in order over `formula`, gated on the clause limit. Returns
/// the first conclusive verdict, if any.
pub fn run_passes(
    passes: &mut [Box<dyn Preprocessor>],
    formula: &mut Formula,
    clause_limit: usize,
) -> SatResult {
    for pass in passes.iter_mut() {
        if formula.clause_count() > clause_limit {
            log::info!(
                "preprocessing: skipping {} ({} clauses over the {clause_limit} limit)",
                pass.name(),
                formula.clause_count()
            );
            continue;
        }
        let before = formula.clause_count();
        let verdict = pass.simplify(formula);
        log::info!(
            "preprocessing: {} took the formula from {before} to {} clauses ({verdict})",
            pass.name(),
            formula.clause_count()
        );
        if verdict != SatResult::Unknown {
            return verdict;
        }
    }
    SatResult::Unknown
}

/// Restore a model through a pass stack, last pass first.
pub fn restore_model_stack(passes: &[Box<dyn Preprocessor>], model: &mut Vec<i32>) {
    for pass in passes.iter().rev() {
        pass.restore_model(model);
    }
}

fn fill_free_variables(fixed: &[i32], var_count: usize) -> Vec<i32> {
    let mut model: Vec<i32> = (1..=var_count as i32).collect();
    for &lit in fixed {
        model[(lit.unsigned_abs() - 1) as usize] = lit;
    }
    model
}

/// Unit propagation to fixpoint. Forced assignments are remembered and
/// written back over the model at restoration.
#[derive(Default)]
pub struct UnitPropagationPass {
    fixed: Vec<i32>,
}

impl UnitPropagationPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literals this pass forced.
    pub fn fixed(&self) -> &[i32] {
        &self.fixed
    }
}

impl Preprocessor for UnitPropagationPass {
    fn name(&self) -> &'static str {
        "unit-propagation"
    }

    fn simplify(&mut self, formula: &mut Formula) -> SatResult {
        let mut assignment = vec![0i8; formula.var_count + 1];

        loop {
            // Collect current units; a conflicting pair concludes UNSAT.
            let mut changed = false;
            for clause in &formula.clauses {
                if clause.is_empty() {
                    return SatResult::Unsat;
                }
                if clause.len() == 1 {
                    let lit = clause[0];
                    let var = lit.unsigned_abs() as usize;
                    let sign = lit.signum() as i8;
                    match assignment[var] {
                        0 => {
                            assignment[var] = sign;
                            self.fixed.push(lit);
                            changed = true;
                        }
                        current if current == sign => {}
                        _ => return SatResult::Unsat,
                    }
                }
            }
            if !changed {
                break;
            }

            // Rewrite under the current assignment: drop satisfied clauses,
            // strip false literals.
            let mut empty_clause = false;
            formula.clauses.retain_mut(|clause| {
                if clause
                    .iter()
                    .any(|&l| assignment[l.unsigned_abs() as usize] == l.signum() as i8)
                {
                    return false;
                }
                clause.retain(|&l| assignment[l.unsigned_abs() as usize] == 0);
                if clause.is_empty() {
                    empty_clause = true;
                }
                true
            });
            if empty_clause {
                return SatResult::Unsat;
            }
        }

        if formula.clauses.is_empty() {
            SatResult::Sat
        } else {
            SatResult::Unknown
        }
    }

    fn restore_model(&self, model: &mut Vec<i32>) {
        for &lit in &self.fixed {
            let index = (lit.unsigned_abs() - 1) as usize;
            if index >= model.len() {
                model.resize(index + 1, 0);
            }
            model[index] = lit;
        }
        // Fill any hole with a positive default.
        for (index, value) in model.iter_mut().enumerate() {
            if *value == 0 {
                *value = index as i32 + 1;
            }
        }
    }

    fn model(&self, var_count: usize) -> Vec<i32> {
        fill_free_variables(&self.fixed, var_count)
    }
}

/// Pure-literal elimination to fixpoint: a variable occurring with a single
/// polarity is fixed to it and its clauses are dropped.
#[derive(Default)]
pub struct PureLiteralPass {
    fixed: Vec<i32>,
}

impl PureLiteralPass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preprocessor for PureLiteralPass {
    fn name(&self) -> &'static str {
        "pure-literals"
    }

    fn simplify(&mut self, formula: &mut Formula) -> SatResult {
        loop {
            let mut positive = vec![false; formula.var_count + 1];
            let mut negative = vec![false; formula.var_count + 1];
            for clause in &formula.clauses {
                for &lit in clause {
                    if lit > 0 {
                        positive[lit as usize] = true;
                    } else {
                        negative[-lit as usize] = true;
                    }
                }
            }

            let mut pure = Vec::new();
            for var in 1..=formula.var_count {
                if positive[var] != negative[var] {
                    pure.push(if positive[var] {
                        var as i32
                    } else {
                        -(var as i32)
                    });
                }
            }
            if pure.is_empty() {
                break;
            }

            let pure_set: std::collections::HashSet<i32> = pure.iter().copied().collect();
            formula
                .clauses
                .retain(|clause| !clause.iter().any(|l| pure_set.contains(l)));
            self.fixed.extend(pure);
        }

        if formula.clauses.is_empty() {
            SatResult::Sat
        } else {
            SatResult::Unknown
        }
    }

    fn restore_model(&self, model: &mut Vec<i32>) {
        for &lit in &self.fixed {
            let index = (lit.unsigned_abs() - 1) as usize;
            if index >= model.len() {
                model.resize(index + 1, 0);
            }
            model[index] = lit;
        }
        for (index, value) in model.iter_mut().enumerate() {
            if *value == 0 {
                *value = index as i32 + 1;
            }
        }
    }

    fn model(&self, var_count: usize) -> Vec<i32> {
        fill_free_variables(&self.fixed, var_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_propagation_detects_contradictions() {
        let mut pass = UnitPropagationPass::new();
        let mut formula = Formula::new(1, vec![vec![1], vec![-1]]);
        assert_eq!(pass.simplify(&mut formula), SatResult::Unsat);
    }

    #[test]
    fn unit_propagation_simplifies_and_restores() {
        let mut pass = UnitPropagationPass::new();
        // 1 is forced, which satisfies (1 2) and shortens (-1 3) to (3),
        // forcing 3 and satisfying everything.
        let mut formula = Formula::new(3, vec![vec![1], vec![1, 2], vec![-1, 3]]);
        assert_eq!(pass.simplify(&mut formula), SatResult::Sat);
        assert!(formula.clauses.is_empty());

        let mut model = vec![0, -2, 0];
        pass.restore_model(&mut model);
        assert_eq!(model, vec![1, -2, 3]);
    }

    #[test]
    fn pure_literals_are_fixed() {
        let mut pass = PureLiteralPass::new();
        // 2 only occurs positively; fixing it satisfies both clauses.
        let mut formula = Formula::new(2, vec![vec![1, 2], vec![-1, 2]]);
        assert_eq!(pass.simplify(&mut formula), SatResult::Sat);
        let model = pass.model(2);
        assert_eq!(model[1], 2);
    }

    #[test]
    fn stack_restores_in_reverse() {
        // 2 is forced, then -3; the equivalence between 1 and 4 stays.
        let mut formula = Formula::new(4, vec![vec![2], vec![-2, -3], vec![1, 4], vec![-1, -4]]);
        let mut passes: Vec<Box<dyn Preprocessor>> = vec![Box::new(UnitPropagationPass::new())];
        let verdict = run_passes(&mut passes, &mut formula, usize::MAX);
        assert_eq!(verdict, SatResult::Unknown);
        assert_eq!(formula.clauses, vec![vec![1, 4], vec![-1, -4]]);

        // An engine model of the remainder; restoration overwrites the
        // forced variables and fills holes.
        let mut model = vec![1, 0, 0, -4];
        restore_model_stack(&passes, &mut model);
        assert_eq!(model, vec![1, 2, -3, -4]);
    }
}
