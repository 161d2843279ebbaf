//! Inter-process clause sharing.
//!
//! Three strategies over one transport seam ([`Comm`]): a flat all-gather, a
//! neighbour-set (ring) exchange, and the Mallob aggregation tree. The
//! [`LoopbackComm`] transport runs any number of ranks inside one process;
//! the real MPI transport lives behind the `mpi` cargo feature.

pub mod allgather;
pub mod base;
pub mod comm;
pub mod generic;
pub mod loopback;
pub mod mallob;
pub mod wire;

#[cfg(feature = "mpi")]
pub mod mpi_comm;

pub use allgather::AllGatherSharing;
pub use comm::{Comm, ROOT_RANK, TreePosition, tags};
pub use generic::GenericGlobalSharing;
pub use loopback::LoopbackComm;
pub use mallob::{MallobConfig, MallobSharing};

#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
