//! The sharer: one OS thread periodically driving sharing strategies.
//!
//! A sharer cycles round-robin over its strategies (usually just one). Each
//! iteration times the strategy's `do_sharing`, then sleeps the remainder of
//! the strategy's declared cadence on the runtime's end condvar, so the end
//! broadcast cuts the sleep short. Before the first round it sleeps a small
//! desynchronising interval so multiple sharers do not fire in lockstep.
//!
//! Once any strategy reports termination, the remaining strategies are
//! drained -- `do_sharing` until each one signals done -- which is what lets
//! the distributed strategies finish their end-protocol handshakes.

use crate::runtime::Runtime;
use crate::sharing::strategy::SharingStrategy;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Handle on a sharer thread.
pub struct Sharer {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Sharer {
    /// Spawn a sharer over the given strategies.
    pub fn new(
        id: usize,
        strategies: Vec<Arc<dyn SharingStrategy>>,
        runtime: Arc<Runtime>,
        init_sleep: Duration,
    ) -> Self {
        let handle = std::thread::Builder::new()
            .name(format!("sharer-{id}"))
            .spawn(move || sharer_main(id, &strategies, &runtime, init_sleep))
            .expect("failed to spawn sharer thread");
        Sharer {
            id,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Wait for the sharer thread to finish.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("sharer {} panicked", self.id);
            }
            log::debug!("sharer {} joined", self.id);
        }
    }
}

impl Drop for Sharer {
    fn drop(&mut self) {
        self.join();
    }
}

fn sharer_main(
    id: usize,
    strategies: &[Arc<dyn SharingStrategy>],
    runtime: &Runtime,
    init_sleep: Duration,
) {
    // Desynchronise sharers started together.
    std::thread::sleep(init_sleep);
    log::debug!("sharer {id} starting with {} strategies", strategies.len());

    let mut round = 0usize;
    let mut total_sharing_time = Duration::ZERO;

    let last_strategy = loop {
        let current = round % strategies.len();
        let strategy = &strategies[current];

        let start = Instant::now();
        let done = strategy.do_sharing();
        let elapsed = start.elapsed();
        total_sharing_time += elapsed;
        round += 1;

        if done {
            break current;
        }

        let sleep = strategy.sleeping_time().saturating_sub(elapsed);
        log::trace!("sharer {id}: round {round} took {elapsed:?}, sleeping {sleep:?}");
        if !runtime.is_ending() {
            runtime.wait_end_timeout(sleep);
        }
    };

    // Drain the other strategies so each observes the end.
    for (i, strategy) in strategies.iter().enumerate() {
        if i == last_strategy {
            continue;
        }
        log::debug!("sharer {id}: draining strategy {i}");
        while !strategy.do_sharing() {
            log::warn!("sharer {id}: strategy {i} did not detect the end yet");
        }
    }

    log::info!(
        "sharer {id}: {round} rounds, total sharing time {:.3}s",
        total_sharing_time.as_secs_f64()
    );
    for strategy in strategies {
        strategy.print_stats();
        log::debug!("sharer {id}: stats {}", strategy.stats_json());
    }
}
