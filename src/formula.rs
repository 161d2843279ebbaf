//! CNF formula container, DIMACS parsing, and the wire form used to ship a
//! formula to the other ranks.

use crate::global::Comm;
use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A CNF formula: a variable count and a clause list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formula {
    pub var_count: usize,
    pub clauses: Vec<Vec<i32>>,
}

impl Formula {
    pub fn new(var_count: usize, clauses: Vec<Vec<i32>>) -> Self {
        Formula { var_count, clauses }
    }

    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }

    /// Parse a DIMACS CNF file.
    pub fn from_dimacs_file(path: &Path) -> Result<Formula> {
        let file =
            File::open(path).with_context(|| format!("cannot open CNF file {}", path.display()))?;
        Self::from_dimacs(BufReader::new(file))
    }

    /// Parse DIMACS CNF from any reader. Comment lines (`c ...`) and the
    /// `%` trailer some benchmark files carry are skipped; clauses are
    /// zero-terminated and may span lines.
    pub fn from_dimacs(reader: impl BufRead) -> Result<Formula> {
        let mut var_count: Option<usize> = None;
        let mut declared_clauses = 0usize;
        let mut clauses = Vec::new();
        let mut current = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("read error at line {}", lineno + 1))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('c') || line.starts_with('%') {
                continue;
            }
            if let Some(header) = line.strip_prefix('p') {
                if var_count.is_some() {
                    bail!("duplicate problem line at line {}", lineno + 1);
                }
                let mut fields = header.split_whitespace();
                if fields.next() != Some("cnf") {
                    bail!("unsupported problem type at line {}", lineno + 1);
                }
                var_count = Some(
                    fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .with_context(|| format!("bad variable count at line {}", lineno + 1))?,
                );
                declared_clauses = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .with_context(|| format!("bad clause count at line {}", lineno + 1))?;
                clauses.reserve(declared_clauses);
                continue;
            }
            if var_count.is_none() {
                bail!("clause before the problem line at line {}", lineno + 1);
            }
            for field in line.split_whitespace() {
                let lit: i32 = field
                    .parse()
                    .with_context(|| format!("bad literal '{field}' at line {}", lineno + 1))?;
                if lit == 0 {
                    clauses.push(std::mem::take(&mut current));
                } else {
                    if lit.unsigned_abs() as usize > var_count.unwrap_or(0) {
                        bail!(
                            "literal {lit} exceeds the declared variable count at line {}",
                            lineno + 1
                        );
                    }
                    current.push(lit);
                }
            }
        }

        let Some(var_count) = var_count else {
            bail!("missing problem line");
        };
        if !current.is_empty() {
            bail!("unterminated final clause");
        }
        if clauses.len() != declared_clauses {
            log::warn!(
                "problem line declared {declared_clauses} clauses, found {}",
                clauses.len()
            );
        }
        Ok(Formula { var_count, clauses })
    }

    /// Flatten into the `[size, lit...]*` integer form used for the rank-0
    /// formula broadcast.
    pub fn to_ints(&self) -> Vec<i32> {
        let total: usize = self.clauses.iter().map(|c| c.len() + 1).sum();
        let mut out = Vec::with_capacity(total);
        for clause in &self.clauses {
            out.push(clause.len() as i32);
            out.extend_from_slice(clause);
        }
        out
    }

    /// Rebuild from the flattened form.
    pub fn from_ints(var_count: usize, ints: &[i32]) -> Result<Formula> {
        let mut clauses = Vec::new();
        let mut index = 0;
        while index < ints.len() {
            let size = ints[index];
            if size < 0 || index + 1 + size as usize > ints.len() {
                bail!("corrupt serialised formula at offset {index}");
            }
            index += 1;
            clauses.push(ints[index..index + size as usize].to_vec());
            index += size as usize;
        }
        Ok(Formula { var_count, clauses })
    }
}

/// Broadcast a formula from `root` to every rank: the variable count first,
/// then the flattened clause buffer.
pub fn broadcast_formula(
    comm: &dyn Comm,
    root: i32,
    formula: Option<Formula>,
) -> Result<Formula> {
    let (var_count, ints) = match &formula {
        Some(f) => (f.var_count as i32, f.to_ints()),
        None => (0, Vec::new()),
    };
    let var_count = comm.broadcast_i32(root, var_count);
    let ints = comm.broadcast_i32s(root, ints);
    if comm.rank() == root {
        Ok(formula.expect("root broadcasts its own formula"))
    } else {
        Formula::from_ints(var_count as usize, &ints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_a_plain_dimacs_file() {
        let text = "c example\np cnf 3 2\n1 -2 0\n2 3 -1 0\n";
        let formula = Formula::from_dimacs(Cursor::new(text)).unwrap();
        assert_eq!(formula.var_count, 3);
        assert_eq!(formula.clauses, vec![vec![1, -2], vec![2, 3, -1]]);
    }

    #[test]
    fn clauses_may_span_lines() {
        let text = "p cnf 4 1\n1 2\n3 4 0\n";
        let formula = Formula::from_dimacs(Cursor::new(text)).unwrap();
        assert_eq!(formula.clauses, vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Formula::from_dimacs(Cursor::new("1 2 0\n")).is_err());
        assert!(Formula::from_dimacs(Cursor::new("p cnf 2 1\n1 x 0\n")).is_err());
        assert!(Formula::from_dimacs(Cursor::new("p cnf 1 1\n5 0\n")).is_err());
        assert!(Formula::from_dimacs(Cursor::new("p cnf 2 1\n1 2\n")).is_err());
    }

    #[test]
    fn int_round_trip() {
        let formula = Formula::new(4, vec![vec![1, -2], vec![3], vec![-4, 2, 1]]);
        let ints = formula.to_ints();
        assert_eq!(ints, vec![2, 1, -2, 1, 3, 3, -4, 2, 1]);
        assert_eq!(Formula::from_ints(4, &ints).unwrap(), formula);
    }
}
