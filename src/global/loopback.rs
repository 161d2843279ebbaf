//! In-process transport: N ranks bridged by tagged mailboxes.
//!
//! [`LoopbackComm`] implements the [`Comm`] contract over shared memory.
//! Point-to-point messages land in per-`(to, from, tag)` FIFO queues under a
//! single mutex + condvar; collectives are built from point-to-point
//! transfers with reserved negative tags, relying on the Comm contract that
//! all ranks issue collectives in the same order.
//!
//! This is what the integration tests run the full distributed protocol on,
//! one thread per rank, with no MPI installation anywhere.

use crate::global::comm::Comm;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Reserved tags for collective plumbing; user tags are non-negative.
const TAG_BCAST: i32 = -1;
const TAG_ALLGATHER: i32 = -2;

#[derive(Debug, Clone)]
enum Payload {
    I32s(Vec<i32>),
    U64s(Vec<u64>),
}

type MailboxKey = (i32, i32, i32); // (to, from, tag)

struct Network {
    mailboxes: Mutex<HashMap<MailboxKey, VecDeque<Payload>>>,
    delivered: Condvar,
    world_size: i32,
}

/// One rank's endpoint of an in-process process group.
#[derive(Clone)]
pub struct LoopbackComm {
    rank: i32,
    network: Arc<Network>,
}

impl LoopbackComm {
    /// Create a process group of `world_size` ranks; endpoint `i` of the
    /// returned vector belongs to rank `i`.
    pub fn create_world(world_size: usize) -> Vec<LoopbackComm> {
        assert!(world_size > 0);
        let network = Arc::new(Network {
            mailboxes: Mutex::new(HashMap::new()),
            delivered: Condvar::new(),
            world_size: world_size as i32,
        });
        (0..world_size as i32)
            .map(|rank| LoopbackComm {
                rank,
                network: Arc::clone(&network),
            })
            .collect()
    }

    fn post(&self, to: i32, tag: i32, payload: Payload) {
        debug_assert!(to >= 0 && to < self.network.world_size);
        let mut mailboxes = self.network.mailboxes.lock();
        mailboxes
            .entry((to, self.rank, tag))
            .or_default()
            .push_back(payload);
        self.network.delivered.notify_all();
    }

    fn take(&self, from: i32, tag: i32) -> Payload {
        let key = (self.rank, from, tag);
        let mut mailboxes = self.network.mailboxes.lock();
        loop {
            if let Some(queue) = mailboxes.get_mut(&key) {
                if let Some(payload) = queue.pop_front() {
                    return payload;
                }
            }
            self.network.delivered.wait(&mut mailboxes);
        }
    }

    fn try_take_from_any(&self, tag: i32) -> Option<(i32, Payload)> {
        let mut mailboxes = self.network.mailboxes.lock();
        for from in 0..self.network.world_size {
            if let Some(queue) = mailboxes.get_mut(&(self.rank, from, tag)) {
                if let Some(payload) = queue.pop_front() {
                    return Some((from, payload));
                }
            }
        }
        None
    }

    fn take_from_any(&self, tag: i32) -> (i32, Payload) {
        let mut mailboxes = self.network.mailboxes.lock();
        loop {
            for from in 0..self.network.world_size {
                if let Some(queue) = mailboxes.get_mut(&(self.rank, from, tag)) {
                    if let Some(payload) = queue.pop_front() {
                        return (from, payload);
                    }
                }
            }
            self.network.delivered.wait(&mut mailboxes);
        }
    }

    fn expect_i32s(payload: Payload) -> Vec<i32> {
        match payload {
            Payload::I32s(data) => data,
            Payload::U64s(_) => unreachable!("tag carried an unexpected block payload"),
        }
    }

    fn expect_u64s(payload: Payload) -> Vec<u64> {
        match payload {
            Payload::U64s(data) => data,
            Payload::I32s(_) => unreachable!("tag carried an unexpected integer payload"),
        }
    }
}

impl Comm for LoopbackComm {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn world_size(&self) -> i32 {
        self.network.world_size
    }

    fn broadcast_i32(&self, root: i32, value: i32) -> i32 {
        self.broadcast_i32s(root, vec![value])[0]
    }

    fn broadcast_f32(&self, root: i32, value: f32) -> f32 {
        f32::from_bits(self.broadcast_i32s(root, vec![value.to_bits() as i32])[0] as u32)
    }

    fn broadcast_i32s(&self, root: i32, data: Vec<i32>) -> Vec<i32> {
        if self.rank == root {
            for to in 0..self.network.world_size {
                if to != root {
                    self.post(to, TAG_BCAST, Payload::I32s(data.clone()));
                }
            }
            data
        } else {
            Self::expect_i32s(self.take(root, TAG_BCAST))
        }
    }

    fn broadcast_u64s(&self, root: i32, data: Vec<u64>) -> Vec<u64> {
        if self.rank == root {
            for to in 0..self.network.world_size {
                if to != root {
                    self.post(to, TAG_BCAST, Payload::U64s(data.clone()));
                }
            }
            data
        } else {
            Self::expect_u64s(self.take(root, TAG_BCAST))
        }
    }

    fn send_i32s(&self, to: i32, tag: i32, data: &[i32]) {
        self.post(to, tag, Payload::I32s(data.to_vec()));
    }

    fn recv_i32s(&self, from: i32, tag: i32) -> Vec<i32> {
        Self::expect_i32s(self.take(from, tag))
    }

    fn send_u64s(&self, to: i32, tag: i32, data: &[u64]) {
        self.post(to, tag, Payload::U64s(data.to_vec()));
    }

    fn recv_u64s(&self, from: i32, tag: i32) -> Vec<u64> {
        Self::expect_u64s(self.take(from, tag))
    }

    fn try_recv_i32(&self, tag: i32) -> Option<(i32, i32)> {
        self.try_take_from_any(tag)
            .map(|(from, payload)| (from, Self::expect_i32s(payload)[0]))
    }

    fn recv_i32_any(&self, tag: i32) -> (i32, i32) {
        let (from, payload) = self.take_from_any(tag);
        (from, Self::expect_i32s(payload)[0])
    }

    fn all_gather_i32s(&self, send: &[i32]) -> Vec<i32> {
        let world = self.network.world_size;
        for to in 0..world {
            if to != self.rank {
                self.post(to, TAG_ALLGATHER, Payload::I32s(send.to_vec()));
            }
        }
        let mut gathered = Vec::with_capacity(send.len() * world as usize);
        for from in 0..world {
            if from == self.rank {
                gathered.extend_from_slice(send);
            } else {
                gathered.extend(Self::expect_i32s(self.take(from, TAG_ALLGATHER)));
            }
        }
        gathered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn point_to_point_is_fifo_per_key() {
        let world = LoopbackComm::create_world(2);
        world[0].send_i32s(1, 7, &[1, 2]);
        world[0].send_i32s(1, 7, &[3]);
        assert_eq!(world[1].recv_i32s(0, 7), vec![1, 2]);
        assert_eq!(world[1].recv_i32s(0, 7), vec![3]);
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let world = LoopbackComm::create_world(3);
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let data = if comm.rank() == 0 {
                        vec![5, 6, 7]
                    } else {
                        Vec::new()
                    };
                    comm.broadcast_i32s(0, data)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), vec![5, 6, 7]);
        }
    }

    #[test]
    fn all_gather_concatenates_in_rank_order() {
        let world = LoopbackComm::create_world(3);
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mine = [comm.rank() * 10, comm.rank() * 10 + 1];
                    comm.all_gather_i32s(&mine)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), vec![0, 1, 10, 11, 20, 21]);
        }
    }

    #[test]
    fn try_recv_polls_without_blocking() {
        let world = LoopbackComm::create_world(2);
        assert!(world[0].try_recv_i32(9).is_none());
        world[1].send_i32s(0, 9, &[42]);
        assert_eq!(world[0].try_recv_i32(9), Some((1, 42)));
    }
}
