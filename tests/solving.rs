//! End-to-end solves through the working strategies.

use satswarm::config::Config;
use satswarm::global::{Comm, LoopbackComm};
use satswarm::runtime::Runtime;
use satswarm::solvers::SatResult;
use satswarm::testing::{FixedResultSolver, dimacs};
use satswarm::working::{PortfolioSimple, SequentialWorker, WorkingStrategy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn write_cnf(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn quick_config(input: PathBuf, cpus: usize) -> Config {
    let mut cfg = Config::default();
    cfg.input = Some(input);
    cfg.cpus = cpus;
    cfg.sharing_sleep = 5_000;
    cfg.global_sharing_sleep = 5_000;
    cfg.init_sleep = 200;
    cfg
}

fn check_model(model: &[i32], clauses: &[&[i32]]) {
    for clause in clauses {
        assert!(
            clause
                .iter()
                .any(|&l| model[(l.unsigned_abs() - 1) as usize] == l),
            "model {model:?} does not satisfy {clause:?}"
        );
    }
}

#[test]
fn unsat_unit_pair_concludes_within_one_round() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cnf(&dir, "unsat.cnf", &dimacs(1, &[&[1], &[-1]]));

    let runtime = Arc::new(Runtime::new());
    let portfolio = PortfolioSimple::new(quick_config(path, 2), Arc::clone(&runtime), None);
    portfolio.solve(&[]);

    assert!(runtime.wait_end_timeout(Duration::from_secs(30)));
    assert_eq!(runtime.result(), SatResult::Unsat);
    portfolio.finalize();
}

#[test]
fn sat_chain_produces_a_full_model() {
    let clauses: &[&[i32]] = &[&[1, 2], &[-1, 3], &[-2, -3]];
    let dir = tempfile::tempdir().unwrap();
    let path = write_cnf(&dir, "chain.cnf", &dimacs(3, clauses));

    let runtime = Arc::new(Runtime::new());
    let portfolio = PortfolioSimple::new(quick_config(path, 2), Arc::clone(&runtime), None);
    portfolio.solve(&[]);

    assert!(runtime.wait_end_timeout(Duration::from_secs(30)));
    assert_eq!(runtime.result(), SatResult::Sat);
    portfolio.finalize();

    let model = runtime.model();
    assert_eq!(model.len(), 3);
    let mut vars: Vec<u32> = model.iter().map(|l| l.unsigned_abs()).collect();
    vars.sort_unstable();
    assert_eq!(vars, vec![1, 2, 3]);
    check_model(&model, clauses);
}

#[test]
fn preprocessing_fixes_are_restored_into_the_final_model() {
    // 1 and 2 are forced by unit propagation; the engines only ever see the
    // 3/4 equivalence, and restoration must put 1 and 2 back.
    let clauses: &[&[i32]] = &[&[1], &[-1, 2], &[3, 4], &[-3, -4]];
    let dir = tempfile::tempdir().unwrap();
    let path = write_cnf(&dir, "mixed.cnf", &dimacs(4, clauses));

    let runtime = Arc::new(Runtime::new());
    let portfolio = PortfolioSimple::new(quick_config(path, 2), Arc::clone(&runtime), None);
    portfolio.solve(&[]);

    assert!(runtime.wait_end_timeout(Duration::from_secs(30)));
    assert_eq!(runtime.result(), SatResult::Sat);
    portfolio.finalize();

    let model = runtime.model();
    assert!(model.len() >= 4);
    assert_eq!(model[0], 1);
    assert_eq!(model[1], 2);
    check_model(&model, clauses);
}

#[test]
fn a_worker_reports_its_engine_result_upward() {
    let runtime = Arc::new(Runtime::new());
    let solver = FixedResultSolver::new(0, SatResult::Sat, vec![1, -2]);
    let worker = SequentialWorker::new(solver, Arc::clone(&runtime));
    WorkingStrategy::solve(worker.as_ref(), &[]);

    assert!(runtime.wait_end_timeout(Duration::from_secs(10)));
    assert_eq!(runtime.result(), SatResult::Sat);
    assert_eq!(runtime.model(), vec![1, -2]);
}

#[test]
fn timeout_interrupts_a_long_running_engine() {
    let runtime = Arc::new(Runtime::new());
    let solver = FixedResultSolver::with_delay(
        0,
        SatResult::Sat,
        vec![1],
        Duration::from_secs(60),
    );
    let worker = SequentialWorker::new(solver, Arc::clone(&runtime));
    WorkingStrategy::solve(worker.as_ref(), &[]);

    // Nothing concludes by itself; the application timeout fires.
    assert!(!runtime.wait_end_timeout(Duration::from_millis(50)));
    runtime.set_result(SatResult::Timeout);
    runtime.set_ending();
    runtime.notify_end();
    worker.set_solver_interrupt();

    drop(worker); // joins the thread; the interrupted engine yields UNKNOWN
    assert_eq!(runtime.result(), SatResult::Timeout);
}

#[test]
fn two_rank_portfolio_agrees_over_loopback() {
    let clauses: &[&[i32]] = &[&[1, 2], &[-1, 3], &[-2, -3]];
    let dir = tempfile::tempdir().unwrap();
    let path = write_cnf(&dir, "dist.cnf", &dimacs(3, clauses));

    let world = LoopbackComm::create_world(2);
    let handles: Vec<_> = world
        .into_iter()
        .map(|comm| {
            let path = path.clone();
            std::thread::spawn(move || {
                let comm: Arc<dyn Comm> = Arc::new(comm);
                let mut cfg = quick_config(path, 1);
                cfg.global_sharing_strategy = 1; // all-gather
                let runtime = Arc::new(Runtime::new());
                let portfolio =
                    PortfolioSimple::new(cfg, Arc::clone(&runtime), Some(Arc::clone(&comm)));
                portfolio.solve(&[]);
                assert!(
                    runtime.wait_end_timeout(Duration::from_secs(60)),
                    "rank {} never saw the end",
                    comm.rank()
                );
                portfolio.finalize();
                (comm.rank(), runtime.result(), runtime.model())
            })
        })
        .collect();

    let mut outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("rank thread panicked"))
        .collect();
    outcomes.sort_by_key(|(rank, _, _)| *rank);

    for (_, result, _) in &outcomes {
        assert_eq!(*result, SatResult::Sat);
    }
    // Rank 0 holds the final (possibly funnelled) model.
    let (_, _, model) = &outcomes[0];
    assert_eq!(model.len(), 3);
    check_model(model, clauses);
}
