//! Serialisation of clause buffers.
//!
//! The wire format of every global strategy is a flat `i32` buffer of
//! `[size, lbd, lit_1, ..., lit_size]` records. The all-gather variant packs
//! records into fixed-size per-rank slots where a 0 at a record start
//! terminates the slot; the tree variant appends one trailing integer (the
//! aggregated-buffers count) on child-to-parent messages.

use crate::clause::{Clause, ClauseRef};
use anyhow::{Result, bail};

/// Append one clause record to `out`.
pub fn serialize_clause(out: &mut Vec<i32>, clause: &Clause) {
    out.push(clause.len() as i32);
    out.push(clause.lbd as i32);
    out.extend_from_slice(clause.lits());
}

/// Append every clause of `clauses` to `out`.
pub fn serialize_clauses(out: &mut Vec<i32>, clauses: &[ClauseRef]) {
    for clause in clauses {
        serialize_clause(out, clause);
    }
}

/// Decode a whole buffer of clause records. Decoded clauses carry
/// `from = -1`: the producer is not part of the wire format.
pub fn deserialize_clauses(buffer: &[i32]) -> Result<Vec<ClauseRef>> {
    let mut clauses = Vec::new();
    let mut index = 0;
    while index < buffer.len() {
        index = deserialize_one(buffer, index, &mut clauses)?;
    }
    Ok(clauses)
}

/// Decode one fixed-size all-gather slot: records until a 0 size marker or
/// the end of the slot.
pub fn deserialize_slot(slot: &[i32]) -> Result<Vec<ClauseRef>> {
    let mut clauses = Vec::new();
    let mut index = 0;
    while index < slot.len() && slot[index] != 0 {
        index = deserialize_one(slot, index, &mut clauses)?;
    }
    Ok(clauses)
}

fn deserialize_one(buffer: &[i32], index: usize, out: &mut Vec<ClauseRef>) -> Result<usize> {
    let size = buffer[index];
    if size <= 0 {
        bail!("corrupt clause buffer: record size {size} at offset {index}");
    }
    let size = size as usize;
    if index + 2 + size > buffer.len() {
        bail!("corrupt clause buffer: truncated record at offset {index}");
    }
    let lbd = buffer[index + 1];
    if lbd < 0 {
        bail!("corrupt clause buffer: negative lbd at offset {index}");
    }
    let lits = &buffer[index + 2..index + 2 + size];
    out.push(Clause::from_lits(lits, lbd as u32, -1)?);
    Ok(index + 2 + size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_records() {
        // [[1,-2,3], [4], [-5,6]] with unit lbd preserved.
        let clauses = vec![
            Clause::from_lits(&[1, -2, 3], 2, 0).unwrap(),
            Clause::from_lits(&[4], 0, 1).unwrap(),
            Clause::from_lits(&[-5, 6], 2, 2).unwrap(),
        ];
        let mut buffer = Vec::new();
        serialize_clauses(&mut buffer, &clauses);
        assert_eq!(buffer, vec![3, 2, 1, -2, 3, 1, 0, 4, 2, 2, -5, 6]);

        let decoded = deserialize_clauses(&buffer).unwrap();
        assert_eq!(decoded.len(), 3);
        for (original, copy) in clauses.iter().zip(&decoded) {
            assert_eq!(**original, **copy);
            assert_eq!(original.lbd, copy.lbd);
            assert_eq!(copy.from, -1);
        }
    }

    #[test]
    fn slot_decoding_stops_at_the_terminator() {
        let slot = [1, 0, 7, 0, 99, 99, 99];
        let decoded = deserialize_slot(&slot).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].lits(), &[7]);
    }

    #[test]
    fn corrupt_buffers_are_rejected() {
        assert!(deserialize_clauses(&[3, 2, 1]).is_err());
        assert!(deserialize_clauses(&[-1, 2, 1]).is_err());
    }
}
