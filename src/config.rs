//! Command-line configuration of the coordination layer.
//!
//! Flag names and defaults follow the historical parameter set, so run
//! scripts keep working: `-c` solver threads, `-t` timeout, `--shr-strat` /
//! `--gshr-strat` strategy selection, and the Horde/Mallob tuning knobs.

use clap::Parser;
use std::path::PathBuf;

/// Parallel and distributed SAT solving with learned-clause exchange.
#[derive(Parser, Debug, Clone)]
#[command(name = "satswarm", version, about)]
pub struct Config {
    /// Input CNF file (DIMACS).
    pub input: Option<PathBuf>,

    /// Number of solver threads to launch.
    #[arg(short = 'c', long, default_value_t = num_cpus::get())]
    pub cpus: usize,

    /// Timeout in seconds (no timeout when <= 0).
    #[arg(short = 't', long, default_value_t = -1)]
    pub timeout: i64,

    /// Portfolio of solvers, one character per engine, cycled over `cpus`.
    #[arg(long, default_value = "d")]
    pub solver: String,

    /// Disable model output.
    #[arg(long = "no-model")]
    pub no_model: bool,

    /// Enable distributed solving (initialises the MPI transport).
    #[arg(long)]
    pub dist: bool,

    /// Use the PRS-style distributed working strategy.
    #[arg(long)]
    pub prs: bool,

    /// Engine import database type: (s)ingle, per-size (d), per-(e)ntity or
    /// (m)allob.
    #[arg(long = "import-db", default_value_t = 'd')]
    pub import_db: char,

    /// Engine import database capacity.
    #[arg(long = "import-db-cap", default_value_t = 10_000)]
    pub import_db_cap: usize,

    /// Maximum size of clauses admitted into clause databases.
    #[arg(long = "max-cls-size", default_value_t = 60)]
    pub max_clause_size: usize,

    /// Local sharing strategy: 1 Horde, 2 Horde with two producer groups,
    /// 3 Simple, 0 random.
    #[arg(long = "shr-strat", default_value_t = 1)]
    pub sharing_strategy: u32,

    /// Global sharing strategy: 1 all-gather, 2 Mallob tree, 3 ring.
    #[arg(long = "gshr-strat", default_value_t = 1)]
    pub global_sharing_strategy: u32,

    /// Sleep time in microseconds after each local sharing round.
    #[arg(long = "shr-sleep", default_value_t = 500_000)]
    pub sharing_sleep: u64,

    /// Sleep time in microseconds after each global sharing round.
    #[arg(long = "gshr-sleep", default_value_t = 600_000)]
    pub global_sharing_sleep: u64,

    /// Initial desynchronising sleep of each sharer, microseconds.
    #[arg(long = "init-sleep", default_value_t = 10_000)]
    pub init_sleep: u64,

    /// Drive all sharing strategies from a single sharer thread.
    #[arg(long = "one-sharer")]
    pub one_sharer: bool,

    /// Clause size limit of the Simple local strategy.
    #[arg(long = "simple-limit", default_value_t = 10)]
    pub simple_share_limit: usize,

    /// Literals each producer may contribute per local sharing round.
    #[arg(long = "shr-lit-per-prod", default_value_t = 1500)]
    pub shared_literals_per_producer: usize,

    /// Literal budget of a global sharing round.
    #[arg(long = "gshr-lit", default_value_t = 2000)]
    pub global_shared_literals: usize,

    /// Initial per-producer LBD cap of the Horde strategy.
    #[arg(long = "horde-initial-lbd", default_value_t = 2)]
    pub horde_initial_lbd_limit: u32,

    /// Round from which the Horde LBD caps start adapting.
    #[arg(long = "horde-init-round", default_value_t = 1)]
    pub horde_init_round: u32,

    /// Mallob tree sharing cadence, rounds per second.
    #[arg(long = "mallob-shr-per-sec", default_value_t = 2)]
    pub mallob_sharings_per_second: u32,

    /// Asymptotic maximum of the Mallob aggregate buffer, in literals.
    #[arg(long = "mallob-gshr-max-lit", default_value_t = 250_000)]
    pub mallob_max_buffer_size: usize,

    /// Reshare period of the Mallob exact filter, microseconds.
    #[arg(long = "mallob-reshare-period-us", default_value_t = 15_000_000)]
    pub mallob_reshare_period: u64,

    /// LBD limit of clauses admitted by the Mallob strategy.
    #[arg(long = "mallob-lbd-limit", default_value_t = 60)]
    pub mallob_lbd_limit: u32,

    /// Size limit of clauses admitted by the Mallob strategy.
    #[arg(long = "mallob-size-limit", default_value_t = 60)]
    pub mallob_size_limit: usize,

    /// Upper clamp of the Mallob compensation factor.
    #[arg(long = "max-mallob-comp", default_value_t = 5.0)]
    pub mallob_max_compensation: f32,

    /// Default clause buffer capacity.
    #[arg(long = "default-clsbuff-size", default_value_t = 1000)]
    pub default_clause_buffer_size: usize,

    /// Skip preprocessing passes on formulas with more clauses than this.
    #[arg(long = "preproc-cls-limit", default_value_t = 10_000_000)]
    pub preprocess_clause_limit: usize,

    /// Verbosity level (maps onto the log filter when RUST_LOG is unset).
    #[arg(short = 'v', long, default_value_t = 0)]
    pub verbosity: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["satswarm"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_historical_parameters() {
        let cfg = Config::default();
        assert_eq!(cfg.sharing_sleep, 500_000);
        assert_eq!(cfg.global_sharing_sleep, 600_000);
        assert_eq!(cfg.shared_literals_per_producer, 1500);
        assert_eq!(cfg.global_shared_literals, 2000);
        assert_eq!(cfg.mallob_sharings_per_second, 2);
        assert_eq!(cfg.mallob_max_buffer_size, 250_000);
        assert_eq!(cfg.max_clause_size, 60);
        assert_eq!(cfg.import_db, 'd');
        assert!(!cfg.dist);
    }

    #[test]
    fn flags_parse() {
        let cfg = Config::parse_from([
            "satswarm",
            "problem.cnf",
            "-c",
            "4",
            "-t",
            "100",
            "--shr-strat",
            "3",
            "--one-sharer",
            "--import-db",
            "m",
        ]);
        assert_eq!(cfg.cpus, 4);
        assert_eq!(cfg.timeout, 100);
        assert_eq!(cfg.sharing_strategy, 3);
        assert!(cfg.one_sharer);
        assert_eq!(cfg.import_db, 'm');
        assert_eq!(cfg.input.unwrap().to_str().unwrap(), "problem.cnf");
    }
}
