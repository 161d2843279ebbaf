//! Real MPI transport (cargo feature `mpi`).
//!
//! Initialised with `MPI_THREAD_SERIALIZED`; the framework upholds the
//! matching contract by issuing every call from sharer threads only. Any MPI
//! failure is fatal to the distributed run, which the rsmpi bindings enforce
//! by construction (they abort on errors).

use crate::global::comm::Comm;
use anyhow::{Result, bail};
use mpi::Threading;
use mpi::environment::Universe;
use mpi::point_to_point::Source;
use mpi::topology::{Communicator, SimpleCommunicator};
use mpi::traits::*;

/// MPI-backed process group.
pub struct MpiComm {
    // Owns MPI_Finalize on drop; must outlive the communicator.
    _universe: Universe,
    world: SimpleCommunicator,
}

impl MpiComm {
    /// Initialise MPI with serialized threading. Fails when the library
    /// cannot provide that level (or was already initialised).
    pub fn init() -> Result<MpiComm> {
        let Some((universe, threading)) = mpi::initialize_with_threading(Threading::Serialized)
        else {
            bail!("MPI initialisation failed (already initialised?)");
        };
        if threading < Threading::Serialized {
            bail!("MPI cannot provide serialized threading (got {threading:?})");
        }
        let world = universe.world();
        log::debug!(
            "MPI initialised: rank {} of {}",
            world.rank(),
            world.size()
        );
        Ok(MpiComm {
            _universe: universe,
            world,
        })
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> i32 {
        self.world.rank()
    }

    fn world_size(&self) -> i32 {
        self.world.size()
    }

    fn broadcast_i32(&self, root: i32, value: i32) -> i32 {
        let mut value = value;
        self.world.process_at_rank(root).broadcast_into(&mut value);
        value
    }

    fn broadcast_f32(&self, root: i32, value: f32) -> f32 {
        let mut value = value;
        self.world.process_at_rank(root).broadcast_into(&mut value);
        value
    }

    fn broadcast_i32s(&self, root: i32, data: Vec<i32>) -> Vec<i32> {
        let mut data = data;
        let mut len = data.len() as i32;
        let process = self.world.process_at_rank(root);
        process.broadcast_into(&mut len);
        data.resize(len as usize, 0);
        if len > 0 {
            process.broadcast_into(&mut data[..]);
        }
        data
    }

    fn broadcast_u64s(&self, root: i32, data: Vec<u64>) -> Vec<u64> {
        let mut data = data;
        let mut len = data.len() as i32;
        let process = self.world.process_at_rank(root);
        process.broadcast_into(&mut len);
        data.resize(len as usize, 0);
        if len > 0 {
            process.broadcast_into(&mut data[..]);
        }
        data
    }

    fn send_i32s(&self, to: i32, tag: i32, data: &[i32]) {
        self.world.process_at_rank(to).send_with_tag(data, tag);
    }

    fn recv_i32s(&self, from: i32, tag: i32) -> Vec<i32> {
        let (message, _status) = self.world.process_at_rank(from).matched_probe_with_tag(tag);
        let (data, _status) = message.matched_receive_vec::<i32>();
        data
    }

    fn send_u64s(&self, to: i32, tag: i32, data: &[u64]) {
        self.world.process_at_rank(to).send_with_tag(data, tag);
    }

    fn recv_u64s(&self, from: i32, tag: i32) -> Vec<u64> {
        let (message, _status) = self.world.process_at_rank(from).matched_probe_with_tag(tag);
        let (data, _status) = message.matched_receive_vec::<u64>();
        data
    }

    fn try_recv_i32(&self, tag: i32) -> Option<(i32, i32)> {
        let (message, _status) = self
            .world
            .any_process()
            .immediate_matched_probe_with_tag(tag)?;
        let (value, status) = message.matched_receive::<i32>();
        Some((status.source_rank(), value))
    }

    fn recv_i32_any(&self, tag: i32) -> (i32, i32) {
        let (message, _status) = self.world.any_process().matched_probe_with_tag(tag);
        let (value, status) = message.matched_receive::<i32>();
        (status.source_rank(), value)
    }

    fn all_gather_i32s(&self, send: &[i32]) -> Vec<i32> {
        let mut gathered = vec![0i32; send.len() * self.world.size() as usize];
        self.world.all_gather_into(send, &mut gathered[..]);
        gathered
    }
}
