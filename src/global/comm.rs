//! Transport seam of the global sharing layer.
//!
//! Every inter-process operation the global strategies need is captured by
//! the [`Comm`] trait: rank/size introspection, broadcasts, tagged
//! point-to-point transfers with probe-like unknown-size receives, a
//! fixed-slot all-gather, and the non-blocking poll the root uses for end
//! messages. Strategies are written against this trait only, so the whole
//! layer runs over the in-process [`LoopbackComm`](crate::global::LoopbackComm)
//! in tests and over real MPI (`mpi` cargo feature) in production.
//!
//! A transport failure is fatal to the distributed run: implementations
//! abort the process with the MPI error exit code rather than surface
//! recoverable errors, because the sharing tree assumes message integrity.

/// Message tags of the distributed protocol.
pub mod tags {
    /// Serialised clause buffers.
    pub const CLAUSES: i32 = 1;
    /// Positive acknowledgement.
    pub const OK: i32 = 2;
    /// Negative acknowledgement.
    pub const NOTOK: i32 = 3;
    /// Winner model transfer.
    pub const MODEL: i32 = 4;
    /// Feedback bit-vectors of the tree strategy (kept distinct from
    /// `CLAUSES` so message matching never depends on phase ordering).
    pub const BITSET: i32 = 5;
    /// End-of-solve signalling.
    pub const END: i32 = 2012;
}

/// Rank of the root process in every collective of this layer.
pub const ROOT_RANK: i32 = 0;

/// Process-group communication used by the global sharing strategies.
///
/// All calls are issued from sharer threads only (the MPI backend is
/// initialised with serialized threading); collectives must be invoked by
/// every rank in the same order.
pub trait Comm: Send + Sync {
    /// This process's rank in `0..world_size`.
    fn rank(&self) -> i32;

    /// Number of participating processes.
    fn world_size(&self) -> i32;

    /// Broadcast a single integer from `root`; returns the root's value on
    /// every rank.
    fn broadcast_i32(&self, root: i32, value: i32) -> i32;

    /// Broadcast a single float from `root`.
    fn broadcast_f32(&self, root: i32, value: f32) -> f32;

    /// Broadcast an integer buffer of a priori unknown length from `root`.
    /// Non-root ranks pass any placeholder (conventionally empty).
    fn broadcast_i32s(&self, root: i32, data: Vec<i32>) -> Vec<i32>;

    /// Broadcast a block buffer from `root` (bit-vector funnel).
    fn broadcast_u64s(&self, root: i32, data: Vec<u64>) -> Vec<u64>;

    /// Send an integer buffer to `to` under `tag`.
    fn send_i32s(&self, to: i32, tag: i32, data: &[i32]);

    /// Blockingly receive an integer buffer from `from` under `tag`,
    /// whatever its length (probe + receive).
    fn recv_i32s(&self, from: i32, tag: i32) -> Vec<i32>;

    /// Send a block buffer to `to` under `tag`.
    fn send_u64s(&self, to: i32, tag: i32, data: &[u64]);

    /// Blockingly receive a block buffer from `from` under `tag`.
    fn recv_u64s(&self, from: i32, tag: i32) -> Vec<u64>;

    /// Non-blocking poll for a single-integer message under `tag` from any
    /// rank; returns `(source, value)` when one is pending.
    fn try_recv_i32(&self, tag: i32) -> Option<(i32, i32)>;

    /// Blockingly receive a single integer under `tag` from any rank;
    /// returns `(source, value)`.
    fn recv_i32_any(&self, tag: i32) -> (i32, i32);

    /// Fixed-slot all-gather: every rank contributes `send` (identical
    /// length everywhere) and receives the concatenation in rank order.
    fn all_gather_i32s(&self, send: &[i32]) -> Vec<i32>;
}

/// Binary-heap tree coordinates of a rank: `parent = (r - 1) / 2`,
/// children `2r + 1` and `2r + 2`. Used by the Mallob aggregation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreePosition {
    pub parent: Option<i32>,
    pub first_child: Option<i32>,
    pub second_child: Option<i32>,
}

impl TreePosition {
    pub fn for_rank(rank: i32, world_size: i32) -> Self {
        let child = |c: i32| if c < world_size { Some(c) } else { None };
        TreePosition {
            parent: if rank == ROOT_RANK {
                None
            } else {
                Some((rank - 1) / 2)
            },
            first_child: child(2 * rank + 1),
            second_child: child(2 * rank + 2),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = i32> + '_ {
        self.first_child.into_iter().chain(self.second_child)
    }

    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_positions_follow_the_binary_heap() {
        let root = TreePosition::for_rank(0, 7);
        assert!(root.is_root());
        assert_eq!(root.first_child, Some(1));
        assert_eq!(root.second_child, Some(2));

        let mid = TreePosition::for_rank(2, 7);
        assert_eq!(mid.parent, Some(0));
        assert_eq!(mid.first_child, Some(5));
        assert_eq!(mid.second_child, Some(6));

        let leaf = TreePosition::for_rank(3, 7);
        assert_eq!(leaf.parent, Some(1));
        assert!(leaf.is_leaf());

        // One child only: it is the first one.
        let half = TreePosition::for_rank(1, 4);
        assert_eq!(half.first_child, Some(3));
        assert_eq!(half.second_child, None);
    }
}
