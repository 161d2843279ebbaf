//! The thread shell around one engine.
//!
//! A [`SequentialWorker`] owns one engine on one OS thread and cycles
//! through `Waiting -> Solving -> Reporting -> Waiting`. `solve` latches the
//! cube, clears the interrupt and signals the per-worker condvar; the thread
//! wakes, runs the engine (which may block for hours), asks for the model on
//! SAT, and reports `join(result, model)` to its parent coordinator.

use crate::runtime::Runtime;
use crate::solvers::{SatResult, SolverInterface};
use crate::working::WorkingStrategy;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;

struct Job {
    waiting: bool,
    cube: Vec<i32>,
}

/// One engine on one OS thread.
pub struct SequentialWorker {
    solver: Arc<dyn SolverInterface>,
    runtime: Arc<Runtime>,
    parent: OnceLock<Weak<dyn WorkingStrategy>>,
    /// Set when this worker must not start another solve.
    force: AtomicBool,
    job: Mutex<Job>,
    job_signal: Condvar,
    /// Held by the thread for the whole duration of `engine.solve`.
    solving: Mutex<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SequentialWorker {
    /// Spawn the worker thread; the engine stays idle until
    /// [`solve`](WorkingStrategy::solve) is called.
    pub fn new(solver: Arc<dyn SolverInterface>, runtime: Arc<Runtime>) -> Arc<Self> {
        let worker = Arc::new(SequentialWorker {
            solver,
            runtime,
            parent: OnceLock::new(),
            force: AtomicBool::new(false),
            job: Mutex::new(Job {
                waiting: true,
                cube: Vec::new(),
            }),
            job_signal: Condvar::new(),
            solving: Mutex::new(()),
            handle: Mutex::new(None),
        });
        let thread_worker = Arc::clone(&worker);
        let handle = std::thread::Builder::new()
            .name(format!("worker-{}", worker.solver.solver_id()))
            .spawn(move || worker_main(&thread_worker))
            .expect("failed to spawn worker thread");
        *worker.handle.lock() = Some(handle);
        worker
    }

    /// Attach this worker to its parent coordinator. Must happen before
    /// `solve`.
    pub fn set_parent(&self, parent: Weak<dyn WorkingStrategy>) {
        let _ = self.parent.set(parent);
    }

    /// The engine this worker owns.
    pub fn solver(&self) -> &Arc<dyn SolverInterface> {
        &self.solver
    }

    fn report(&self, result: SatResult, model: Vec<i32>) {
        self.force.store(true, Ordering::Release);
        log::debug!(
            "worker {}: reporting {result}",
            self.solver.solver_id()
        );
        if self.runtime.is_ending() {
            return;
        }
        match self.parent.get().and_then(Weak::upgrade) {
            Some(parent) => parent.join(Some(self), result, model),
            None => {
                // Detached worker: it is its own top coordinator.
                if result != SatResult::Unknown {
                    self.runtime.finish(result, model, 0);
                }
            }
        }
    }
}

fn worker_main(worker: &Arc<SequentialWorker>) {
    loop {
        // Wait for work.
        let cube = {
            let mut job = worker.job.lock();
            while job.waiting
                && !worker.force.load(Ordering::Acquire)
                && !worker.runtime.is_ending()
            {
                worker.job_signal.wait(&mut job);
            }
            if worker.runtime.is_ending() || worker.force.load(Ordering::Acquire) {
                return;
            }
            job.waiting = true;
            job.cube.clone()
        };
        let result = {
            let _solving = worker.solving.lock();
            worker.solver.solve(&cube)
        };
        let model = if result == SatResult::Sat {
            worker.solver.get_model()
        } else {
            Vec::new()
        };
        worker.report(result, model);

        if worker.runtime.is_ending() || worker.force.load(Ordering::Acquire) {
            return;
        }
    }
}

impl WorkingStrategy for SequentialWorker {
    fn solve(&self, cube: &[i32]) {
        self.unset_solver_interrupt();
        let mut job = self.job.lock();
        job.cube = cube.to_vec();
        job.waiting = false;
        self.job_signal.notify_one();
    }

    fn join(&self, _winner: Option<&SequentialWorker>, result: SatResult, model: Vec<i32>) {
        self.report(result, model);
    }

    fn set_solver_interrupt(&self) {
        self.force.store(true, Ordering::Release);
        self.solver.set_solver_interrupt();
        // Wake an idle worker so it can observe the flag and exit. The lock
        // pairs the notify with the wait predicate.
        let _job = self.job.lock();
        self.job_signal.notify_all();
    }

    fn unset_solver_interrupt(&self) {
        self.force.store(false, Ordering::Release);
        self.solver.unset_solver_interrupt();
    }

    fn wait_interrupt(&self) {
        // The solving lock is held for the whole engine run.
        drop(self.solving.lock());
    }
}

impl Drop for SequentialWorker {
    fn drop(&mut self) {
        self.set_solver_interrupt();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("worker {} panicked", self.solver.solver_id());
            }
        }
    }
}
