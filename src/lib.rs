//! # Satswarm
//!
//! A **parallel and distributed SAT-solving framework**: many independent
//! solver engines race on the same formula, in one process and across many,
//! and accelerate each other by exchanging the clauses they learn.
//!
//! The hard part is not the engines (they are opaque collaborators behind a
//! small contract) but the coordination around them, and that is what this
//! crate provides:
//!
//! - **Clause exchange substrate** -- the refcounted [`Clause`] handle, the
//!   lock-free [`ClauseBuffer`], and four interchangeable clause databases.
//! - **Sharing topology** -- the bipartite [`SharingEntity`] graph (engines
//!   and strategies are nodes, clauses flow along weak client edges) with
//!   safe add/remove under concurrent traffic.
//! - **Sharing strategies** -- budgeted periodic diffusion between the
//!   engines of one process (Horde-style adaptive LBD throttling, simple
//!   size cut-off) and across processes (all-gather, neighbour rings, and a
//!   Mallob-style aggregation tree with volume compensation and bit-vector
//!   feedback).
//! - **Working strategies** -- the coordinator tree owning engines and
//!   sharer threads, the deterministic termination and winner-election
//!   protocol, and ordered model restoration after preprocessing.
//!
//! ## Quick start
//!
//! ```no_run
//! use satswarm::config::Config;
//! use satswarm::runtime::Runtime;
//! use satswarm::working::{PortfolioSimple, WorkingStrategy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut cfg = Config::default();
//! cfg.input = Some("problem.cnf".into());
//! cfg.cpus = 4;
//!
//! let runtime = Arc::new(Runtime::new());
//! let portfolio = PortfolioSimple::new(cfg, Arc::clone(&runtime), None);
//! portfolio.solve(&[]);
//! while !runtime.wait_end_timeout(Duration::from_secs(1)) {}
//! portfolio.finalize();
//! println!("s {}", runtime.result());
//! ```
//!
//! ## Architecture
//!
//! An engine that learns an exportable clause hands it to its parent local
//! strategy, which parks it in a clause database. A [`Sharer`] thread
//! periodically pulls a budgeted *selection* and offers it to every client
//! -- the other engines and, when distributed, the global strategy, which
//! merges selections up a process tree and redistributes the result. Engines
//! consume imported clauses from a bounded receive buffer at their own
//! checkpoints; everything is advisory and may be dropped under pressure.
//!
//! Distributed runs speak MPI (cargo feature `mpi`); the same code runs over
//! the in-process [`LoopbackComm`](global::LoopbackComm) transport, which is
//! how the integration tests drive multi-rank protocols without an MPI
//! installation.
//!
//! ## Module overview
//!
//! - [`clause`], [`buffer`], [`database`], [`filters`], [`bitset`] -- the
//!   clause exchange substrate.
//! - [`sharing`] -- the entity graph, local strategies and sharer threads.
//! - [`global`] -- inter-process strategies over the [`Comm`](global::Comm)
//!   transport seam.
//! - [`solvers`] -- the engine contract, the built-in DPLL reference engine
//!   and the portfolio factory.
//! - [`working`] -- coordinator tree, worker shells, simple and
//!   PRS-distributed portfolios.
//! - [`preprocess`], [`formula`] -- simplification passes with model
//!   restoration, DIMACS parsing.
//! - [`runtime`], [`config`], [`errors`] -- solve-wide state, CLI surface,
//!   exit codes.
//! - [`testing`] -- scripted producers/consumers and fixture helpers.

pub mod bitset;
pub mod buffer;
pub mod clause;
pub mod config;
pub mod database;
pub mod errors;
pub mod filters;
pub mod formula;
pub mod global;
pub mod preprocess;
pub mod runtime;
pub mod sharing;
pub mod solvers;
pub mod testing;
pub mod working;

// Core re-exports
pub use bitset::Bitset;
pub use buffer::ClauseBuffer;
pub use clause::{Clause, ClauseRef};
pub use config::Config;
pub use database::{ClauseDatabase, DatabaseOptions, create_database};
pub use filters::{BloomFilter, ExactFilter};
pub use formula::Formula;
pub use runtime::Runtime;
pub use sharing::{Sharer, SharingEntity, SharingStrategy};
pub use solvers::{SatResult, SolverInterface};
pub use working::{PortfolioPrs, PortfolioSimple, SequentialWorker, WorkingStrategy};
