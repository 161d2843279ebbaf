//! Shared machinery of the global strategies: the end-signal exchange and
//! the winner funnel.
//!
//! Every global sharing round starts with the same preamble, regardless of
//! how clauses travel afterwards:
//!
//! 1. A non-root rank whose process has concluded sends its result to the
//!    root (once).
//! 2. The root folds its own conclusion or any received one into a single
//!    32-bit integer `(winner_rank << 16) | result` and broadcasts it; zero
//!    means the race is still on. A `TIMEOUT` result names no winner.
//! 3. On a nonzero broadcast, every rank decodes winner and result, sends a
//!    final acknowledgement to the root if it had not signalled yet, and the
//!    round reports termination.
//!
//! The root's acknowledgement drain in [`GlobalBase::join_process`] is what
//! guarantees no rank is still blocked in the protocol when the process
//! tears the strategies down. The winner rank must fit 16 bits.

use crate::database::ClauseDatabase;
use crate::global::comm::{Comm, ROOT_RANK, tags};
use crate::runtime::Runtime;
use crate::sharing::stats::GlobalSharingStats;
use crate::sharing::strategy::StrategyCore;
use crate::solvers::SatResult;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Encode the winner broadcast value.
pub fn encode_winner(winner_rank: i32, result: SatResult) -> i32 {
    debug_assert!((0..1 << 16).contains(&winner_rank), "winner rank must fit 16 bits");
    (winner_rank << 16) | (result as i32 & 0xFFFF)
}

/// Decode the winner broadcast value into `(winner_rank, result)`.
pub fn decode_winner(value: i32) -> (i32, SatResult) {
    ((value >> 16) & 0xFFFF, SatResult::from_i32(value & 0xFFFF))
}

struct EndProtocol {
    /// Whether this non-root rank already sent its end message to the root.
    request_sent: bool,
    /// End messages the root has consumed so far.
    end_messages_seen: usize,
}

/// Common state embedded in every global sharing strategy.
pub struct GlobalBase {
    pub core: StrategyCore,
    pub comm: Arc<dyn Comm>,
    pub runtime: Arc<Runtime>,
    pub gstats: GlobalSharingStats,
    sleep: Duration,
    end: Mutex<EndProtocol>,
}

impl GlobalBase {
    pub fn new(
        db: Arc<dyn ClauseDatabase>,
        comm: Arc<dyn Comm>,
        runtime: Arc<Runtime>,
        sleep_micros: u64,
    ) -> Self {
        GlobalBase {
            core: StrategyCore::new(db, &[], &[]),
            comm,
            runtime,
            gstats: GlobalSharingStats::default(),
            sleep: Duration::from_micros(sleep_micros),
            end: Mutex::new(EndProtocol {
                request_sent: false,
                end_messages_seen: 0,
            }),
        }
    }

    /// Configured sleep between global rounds.
    pub fn sleeping_time(&self) -> Duration {
        self.sleep
    }

    /// Run the end-signal preamble of a sharing round. Returns true when the
    /// distributed run is over; the caller must then invoke
    /// [`join_process`](Self::join_process) and stop sharing.
    pub fn check_end(&self) -> bool {
        let mut end = self.end.lock();
        let rank = self.comm.rank();

        if self.runtime.is_ending() && !end.request_sent && rank != ROOT_RANK {
            log::debug!(
                "rank {rank}: sending local result {} to root",
                self.runtime.result()
            );
            self.comm
                .send_i32s(ROOT_RANK, tags::END, &[self.runtime.result() as i32]);
            end.request_sent = true;
        }

        let mut to_broadcast = 0;
        if rank == ROOT_RANK {
            let mut winner = ROOT_RANK;
            if self.runtime.is_ending() {
                to_broadcast = self.runtime.result() as i32;
            } else {
                while let Some((source, value)) = self.comm.try_recv_i32(tags::END) {
                    log::debug!("root: end received from rank {source} (value {value})");
                    end.end_messages_seen += 1;
                    to_broadcast = value;
                    if SatResult::from_i32(value) != SatResult::Timeout {
                        winner = source;
                    }
                }
            }
            if to_broadcast != 0 {
                to_broadcast = encode_winner(winner, SatResult::from_i32(to_broadcast));
            }
        }

        let value = self.comm.broadcast_i32(ROOT_RANK, to_broadcast);
        if value == 0 {
            return false;
        }

        let (winner, result) = decode_winner(value);
        self.runtime.set_result(result);
        self.runtime.set_winner_rank(winner);

        // Ranks that had not concluded locally acknowledge the broadcast so
        // the root can account for every process.
        if !end.request_sent && rank != ROOT_RANK {
            self.comm
                .send_i32s(ROOT_RANK, tags::END, &[result as i32]);
            end.request_sent = true;
        }
        true
    }

    /// Final synchronisation after [`check_end`](Self::check_end) reported
    /// termination: the root drains the end message of every other rank,
    /// then the local end state is published and all sleepers are woken.
    pub fn join_process(&self) {
        let rank = self.comm.rank();
        if rank == ROOT_RANK {
            let mut end = self.end.lock();
            let expected = (self.comm.world_size() - 1) as usize;
            while end.end_messages_seen < expected {
                let (source, _) = self.comm.recv_i32_any(tags::END);
                log::debug!("root: final end message from rank {source}");
                end.end_messages_seen += 1;
            }
        }

        let result = self.runtime.result();
        let winner = self.runtime.winner_rank();
        if result != SatResult::Unknown && result != SatResult::Timeout {
            log::info!("the winner is process {winner}");
        }
        self.runtime.finish(result, Vec::new(), winner);
    }

    /// Log the global counters.
    pub fn print_stats(&self, name: &str) {
        let snapshot = self.gstats.snapshot();
        log::info!(
            "{name}: received {}, shared {}, received duplicates {}, duplicates avoided {}, messages sent {}",
            snapshot.base.received,
            snapshot.base.shared,
            snapshot.received_duplicates,
            snapshot.shared_duplicates_avoided,
            snapshot.messages_sent
        );
    }

    /// Bump the sent-message counter.
    pub fn count_message(&self) {
        self.gstats.messages_sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Serialise database clauses into `out` until `budget` integers are used,
/// skipping Bloom-filtered duplicates. Returns the number of clauses
/// serialised. Shared by the all-gather and ring strategies.
pub fn serialize_from_database(
    base: &GlobalBase,
    bloom: &crate::filters::BloomFilter,
    out: &mut Vec<i32>,
    budget: usize,
) -> usize {
    let mut count = 0;
    loop {
        let Some(clause) = base.core.db().get_one_clause() else {
            break;
        };
        if out.len() + 2 + clause.len() > budget {
            // Does not fit this round: put it back for the next one.
            base.core.db().add_clause(clause);
            break;
        }
        if bloom.contains_or_insert(clause.lits()) {
            base.gstats
                .shared_duplicates_avoided
                .fetch_add(1, Ordering::Relaxed);
            continue;
        }
        crate::global::wire::serialize_clause(out, &clause);
        count += 1;
    }
    base.gstats.base.add_shared(count as u64);
    count
}
