//! Process exit codes.
//!
//! On success the process exits with the numeric value of the final
//! [`SatResult`](crate::solvers::SatResult); failures use the negative codes
//! below.

/// DIMACS parsing failed.
pub const PARSING: i32 = -1;

/// An MPI primitive failed; fatal to the distributed run.
pub const MPI: i32 = -2;

/// Distributed mode requested but not compiled in.
pub const DIST_COMPILE: i32 = -3;

/// Unsupported operation or configuration.
pub const NOT_SUPPORTED: i32 = -4;

/// Unknown engine kind in the portfolio string.
pub const UNKNOWN_SOLVER: i32 = -5;

/// Command-line argument error.
pub const ARGS: i32 = -6;
