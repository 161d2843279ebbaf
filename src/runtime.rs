//! Process-wide solve state: the termination protocol's local half.
//!
//! Instead of mutable globals, one [`Runtime`] value is created per solve and
//! threaded through the working strategy, every sharer and every global
//! strategy. It carries the end flag, the final result and model, the winner
//! rank, and the mutex/condvar pair the main thread and the sharers sleep on.

use crate::solvers::SatResult;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

/// Shared end-of-solve state.
pub struct Runtime {
    ending: AtomicBool,
    final_result: AtomicI32,
    final_model: Mutex<Vec<i32>>,
    winner_rank: AtomicI32,
    end_mutex: Mutex<()>,
    end_cond: Condvar,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            ending: AtomicBool::new(false),
            final_result: AtomicI32::new(SatResult::Unknown as i32),
            final_model: Mutex::new(Vec::new()),
            winner_rank: AtomicI32::new(-1),
            end_mutex: Mutex::new(()),
            end_cond: Condvar::new(),
        }
    }

    /// Has some thread (or process) concluded the solve?
    pub fn is_ending(&self) -> bool {
        self.ending.load(Ordering::Acquire)
    }

    /// Raise the end flag without touching the result.
    pub fn set_ending(&self) {
        self.ending.store(true, Ordering::Release);
    }

    /// The final result as currently known.
    pub fn result(&self) -> SatResult {
        SatResult::from_i32(self.final_result.load(Ordering::Acquire))
    }

    /// Publish the final result.
    pub fn set_result(&self, result: SatResult) {
        self.final_result.store(result as i32, Ordering::Release);
    }

    /// Winning rank (`-1` while undecided; 0 in a solo run).
    pub fn winner_rank(&self) -> i32 {
        self.winner_rank.load(Ordering::Acquire)
    }

    pub fn set_winner_rank(&self, rank: i32) {
        self.winner_rank.store(rank, Ordering::Release);
    }

    /// Copy of the final model (empty unless SAT).
    pub fn model(&self) -> Vec<i32> {
        self.final_model.lock().clone()
    }

    pub fn set_model(&self, model: Vec<i32>) {
        *self.final_model.lock() = model;
    }

    /// Rewrite the model in place (used by preprocessor restoration).
    pub fn with_model_mut<R>(&self, f: impl FnOnce(&mut Vec<i32>) -> R) -> R {
        f(&mut self.final_model.lock())
    }

    /// Publish a conclusive local result and wake every sleeper: the main
    /// thread, the sharers, and anyone in [`wait_end_timeout`](Self::wait_end_timeout).
    pub fn finish(&self, result: SatResult, model: Vec<i32>, winner_rank: i32) {
        let _guard = self.end_mutex.lock();
        self.set_result(result);
        if result == SatResult::Sat && !model.is_empty() {
            self.set_model(model);
        }
        self.set_winner_rank(winner_rank);
        self.set_ending();
        self.end_cond.notify_all();
    }

    /// Wake all end-condvar sleepers without changing any state.
    pub fn notify_end(&self) {
        let _guard = self.end_mutex.lock();
        self.end_cond.notify_all();
    }

    /// Sleep until the end flag rises or `timeout` elapses. Returns the
    /// value of the end flag on wake-up.
    pub fn wait_end_timeout(&self, timeout: Duration) -> bool {
        if self.is_ending() {
            return true;
        }
        let mut guard = self.end_mutex.lock();
        if self.is_ending() {
            return true;
        }
        self.end_cond.wait_for(&mut guard, timeout);
        self.is_ending()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
