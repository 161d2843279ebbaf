//! Shared learned-clause handle.
//!
//! A [`Clause`] is an immutable record of `{lbd, from, lits}` exchanged
//! between solvers and sharing strategies. Handles are reference counted
//! ([`ClauseRef`] is an `Arc`): a clause lives exactly as long as at least one
//! database, queue or strategy still holds a handle to it, and the storage is
//! released once when the last handle drops.
//!
//! Two clauses are equal when their literal *multisets* are equal, regardless
//! of order, and the hash is the XOR of a Jenkins lookup3 hash of each
//! literal, so hashing is order-independent as well. This is what lets the
//! exact filter recognise the same clause arriving from different producers
//! in different literal orders.

use anyhow::{Result, bail};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;
use std::sync::Arc;

/// Reference-counted clause handle. Cloning bumps the refcount; dropping the
/// last handle frees the literals exactly once.
pub type ClauseRef = Arc<Clause>;

/// An exchangeable learned clause.
///
/// The invariant `len > 1 => lbd >= 2` is enforced at construction: some
/// engines emit non-unit clauses tagged `lbd == 1`, which the constructor
/// silently lifts to 2. Unit clauses may carry `lbd` 0 or 1.
#[derive(Debug)]
pub struct Clause {
    /// Literal block distance reported by the producing engine.
    pub lbd: u32,
    /// Sharing id of the producing entity, `-1` when unknown (e.g. decoded
    /// from a wire buffer).
    pub from: i32,
    lits: Box<[i32]>,
}

impl Clause {
    /// Build a clause from an owned literal vector.
    ///
    /// Fails on an empty literal list; a clause without literals denotes
    /// falsity and must never enter the exchange.
    pub fn new(lits: Vec<i32>, lbd: u32, from: i32) -> Result<ClauseRef> {
        if lits.is_empty() {
            bail!("cannot build a clause with no literals");
        }
        debug_assert!(lits.iter().all(|&l| l != 0), "0 is not a literal");
        let lbd = if lits.len() > 1 && lbd < 2 { 2 } else { lbd };
        Ok(Arc::new(Clause {
            lbd,
            from,
            lits: lits.into_boxed_slice(),
        }))
    }

    /// Build a clause by copying a literal slice.
    pub fn from_lits(lits: &[i32], lbd: u32, from: i32) -> Result<ClauseRef> {
        Self::new(lits.to_vec(), lbd, from)
    }

    /// Convenience factory for a unit clause.
    pub fn unit(lit: i32, from: i32) -> ClauseRef {
        Self::new(vec![lit], 0, from).expect("unit clause is never empty")
    }

    /// Number of literals.
    pub fn len(&self) -> usize {
        self.lits.len()
    }

    /// True for the (unreachable by construction) empty clause.
    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }

    /// True for unit clauses.
    pub fn is_unit(&self) -> bool {
        self.lits.len() == 1
    }

    /// The literals of this clause.
    pub fn lits(&self) -> &[i32] {
        &self.lits
    }

    /// Iterate over the literals.
    pub fn iter(&self) -> std::slice::Iter<'_, i32> {
        self.lits.iter()
    }

    /// Order-independent content hash (XOR of per-literal lookup3 hashes).
    pub fn commutative_hash(&self) -> u64 {
        lookup3_hash_clause(&self.lits)
    }
}

impl Index<usize> for Clause {
    type Output = i32;

    fn index(&self, index: usize) -> &i32 {
        debug_assert!(index < self.lits.len(), "literal index out of bounds");
        &self.lits[index]
    }
}

impl PartialEq for Clause {
    fn eq(&self, other: &Self) -> bool {
        lits_multiset_eq(&self.lits, &other.lits)
    }
}

impl Eq for Clause {}

impl Hash for Clause {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.commutative_hash());
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[lbd {} from {}:", self.lbd, self.from)?;
        for lit in self.lits.iter() {
            write!(f, " {lit}")?;
        }
        write!(f, "]")
    }
}

/// Commutative multiset comparison of two literal slices.
///
/// Linear when both sides share a common order (the frequent case for wire
/// round-trips), falling back to a scan for permuted duplicates.
fn lits_multiset_eq(left: &[i32], right: &[i32]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut ri = 0;
    for &l in left {
        if ri < right.len() && right[ri] == l {
            ri += 1;
            continue;
        }
        let rest = &right[(ri + 1).min(right.len())..];
        if !rest.contains(&l) {
            return false;
        }
    }
    true
}

/// Jenkins lookup3-style mix of a single key.
///
/// Port of the reference mixing rounds; the shift distances assume the
/// 32-bit rotation form applied to a 64-bit lane, kept verbatim so hashes
/// agree with the historical filter behaviour.
fn lookup3_hash(mut key: u64) -> u64 {
    #[inline]
    fn rot(x: u64, k: u32) -> u64 {
        (x << k) | (x >> (32 - k))
    }

    let mut s1: u64 = 0xdeadbeef;
    let mut s2: u64 = 0xdeadbeef;
    s2 ^= s1;
    s2 = s2.wrapping_sub(rot(s1, 14));
    key ^= s2;
    key = key.wrapping_sub(rot(s2, 11));
    s1 ^= key;
    s1 = s1.wrapping_sub(rot(key, 25));
    s2 ^= s1;
    s2 = s2.wrapping_sub(rot(s1, 16));
    key ^= s2;
    key = key.wrapping_sub(rot(s2, 4));
    s1 ^= key;
    s1 = s1.wrapping_sub(rot(key, 14));
    s2 ^= s1;
    s2 = s2.wrapping_sub(rot(s1, 24));
    s2
}

/// Hash a whole literal slice: XOR of the per-literal hashes, hence invariant
/// under any permutation of the literals.
pub fn lookup3_hash_clause(lits: &[i32]) -> u64 {
    let mut it = lits.iter();
    let Some(&first) = it.next() else { return 0 };
    let mut hash = lookup3_hash(first as i64 as u64);
    for &lit in it {
        hash ^= lookup3_hash(lit as i64 as u64);
    }
    hash
}

/// Total number of literals across a clause list.
pub fn literals_count(clauses: &[ClauseRef]) -> usize {
    clauses.iter().map(|c| c.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clause_is_rejected() {
        assert!(Clause::new(vec![], 0, 0).is_err());
    }

    #[test]
    fn non_unit_lbd_is_lifted_to_two() {
        let c = Clause::new(vec![1, -2, 3], 1, 0).unwrap();
        assert_eq!(c.lbd, 2);
        let c = Clause::new(vec![1, -2], 0, 0).unwrap();
        assert_eq!(c.lbd, 2);
        // Units keep their lbd.
        let u = Clause::new(vec![4], 1, 0).unwrap();
        assert_eq!(u.lbd, 1);
        let u = Clause::new(vec![4], 0, 0).unwrap();
        assert_eq!(u.lbd, 0);
    }

    #[test]
    fn equality_is_commutative_and_order_free() {
        let a = Clause::new(vec![1, -2, 3], 2, 0).unwrap();
        let b = Clause::new(vec![3, 1, -2], 5, 7).unwrap();
        let c = Clause::new(vec![1, -2, -3], 2, 0).unwrap();
        assert_eq!(*a, *b);
        assert_eq!(*b, *a);
        assert_ne!(*a, *c);
        assert_ne!(*a, *Clause::new(vec![1, -2], 2, 0).unwrap());
    }

    #[test]
    fn hash_is_permutation_invariant() {
        let h1 = lookup3_hash_clause(&[10, -20, 30]);
        let h2 = lookup3_hash_clause(&[30, -20, 10]);
        assert_eq!(h1, h2);
        assert_ne!(h1, lookup3_hash_clause(&[10, 20, 30]));
    }

    #[test]
    fn refcount_follows_handles() {
        let c = Clause::new(vec![1, 2], 2, 0).unwrap();
        assert_eq!(Arc::strong_count(&c), 1);
        let c2 = Arc::clone(&c);
        assert_eq!(Arc::strong_count(&c), 2);
        drop(c2);
        assert_eq!(Arc::strong_count(&c), 1);
    }
}
