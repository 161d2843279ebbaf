//! The `satswarm` binary: parse flags, build the working strategy, wait for
//! the race, print the verdict DIMACS-style, and exit with the result code.

use clap::Parser;
use log::{error, info};
use satswarm::config::Config;
use satswarm::global::Comm;
use satswarm::runtime::Runtime;
use satswarm::solvers::SatResult;
use satswarm::working::{PortfolioPrs, PortfolioSimple, WorkingStrategy};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_logging(verbosity: u32) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

#[cfg(feature = "mpi")]
fn make_comm() -> Arc<dyn satswarm::global::Comm> {
    match satswarm::global::MpiComm::init() {
        Ok(comm) => Arc::new(comm),
        Err(err) => {
            error!("MPI initialisation failed: {err:#}");
            std::process::exit(satswarm::errors::MPI);
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn make_comm() -> Arc<dyn satswarm::global::Comm> {
    error!("distributed mode requires building with the `mpi` feature");
    std::process::exit(satswarm::errors::DIST_COMPILE);
}

fn main() {
    let cfg = Config::parse();
    init_logging(cfg.verbosity);

    if cfg.input.is_none() {
        error!("no input CNF file given");
        std::process::exit(satswarm::errors::ARGS);
    }

    let comm = if cfg.dist { Some(make_comm()) } else { None };
    let rank = comm.as_ref().map_or(0, |c| c.rank());

    let runtime = Arc::new(Runtime::new());
    let working: Arc<dyn WorkingStrategy> = if cfg.prs {
        let Some(comm) = comm.clone() else {
            error!("the PRS working strategy requires --dist");
            std::process::exit(satswarm::errors::NOT_SUPPORTED);
        };
        PortfolioPrs::new(cfg.clone(), Arc::clone(&runtime), comm)
    } else {
        PortfolioSimple::new(cfg.clone(), Arc::clone(&runtime), comm.clone())
    };

    // Launch the solve from a dedicated thread; the main thread owns the
    // timeout.
    let launcher = {
        let working = Arc::clone(&working);
        std::thread::spawn(move || working.solve(&[]))
    };

    let started = Instant::now();
    if cfg.timeout > 0 {
        let deadline = Duration::from_secs(cfg.timeout as u64);
        while !runtime.is_ending() && started.elapsed() < deadline {
            runtime.wait_end_timeout(deadline - started.elapsed());
        }
        if !runtime.is_ending() {
            info!("timeout after {}s", cfg.timeout);
            runtime.set_result(SatResult::Timeout);
            runtime.set_ending();
            runtime.notify_end();
            working.set_solver_interrupt();
        }
    } else {
        while !runtime.wait_end_timeout(Duration::from_secs(3600)) {}
    }

    launcher.join().expect("solve launcher panicked");
    working.finalize();

    let result = runtime.result();
    let winner = runtime.winner_rank();
    let mut exit_result = result;

    // Only the winning rank speaks (rank 0 in a solo run).
    if rank == winner.max(0) {
        match result {
            SatResult::Sat => {
                println!("s SATISFIABLE");
                if !cfg.no_model {
                    let model = runtime.model();
                    let mut line = String::from("v");
                    for lit in &model {
                        line.push(' ');
                        line.push_str(&lit.to_string());
                    }
                    line.push_str(" 0");
                    println!("{line}");
                }
            }
            SatResult::Unsat => println!("s UNSATISFIABLE"),
            _ => {
                println!("s UNKNOWN");
                exit_result = SatResult::Unknown;
            }
        }
        info!("resolution time: {:.3}s", started.elapsed().as_secs_f64());
    } else {
        exit_result = SatResult::Unknown;
    }

    std::process::exit(exit_result as i32);
}
