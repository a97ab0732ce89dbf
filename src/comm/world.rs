//! Rank endpoints and collectives.
//!
//! A [`World`] of `size` ranks is a set of [`Endpoint`]s, one per partition
//! thread. Each endpoint owns an inbox; point-to-point messages are tagged
//! envelopes and may arrive in any order across sources. Messages that do
//! not match the current receive are stashed per `(source, tag)` in FIFO
//! order.
//!
//! Collectives gather to rank 0, combine in rank order and broadcast, so
//! every rank sees bit-identical results.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::CommError;

/// Reserved tags for collectives.
const TAG_REDUCE: u32 = 0xF000;
const TAG_BROADCAST: u32 = 0xF001;
const TAG_GATHER: u32 = 0xF002;
const TAG_SCATTER: u32 = 0xF003;

/// A tagged point-to-point message.
#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: u32,
    payload: Vec<f64>,
}

/// Element-wise combination for reductions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    fn combine(self, acc: &mut [f64], other: &[f64]) {
        for (a, b) in acc.iter_mut().zip(other) {
            *a = match self {
                ReduceOp::Sum => *a + b,
                ReduceOp::Max => a.max(*b),
                ReduceOp::Min => a.min(*b),
            };
        }
    }
}

/// Factory for connected endpoints.
pub struct World;

impl World {
    /// Create `size` connected endpoints, indexed by rank.
    pub fn create(size: usize) -> Vec<Endpoint> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        let barrier = Arc::new(Barrier::new(size.max(1)));
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Endpoint {
                rank,
                size,
                outboxes: senders.clone(),
                inbox,
                stash: HashMap::new(),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

/// One rank's view of the world.
pub struct Endpoint {
    rank: usize,
    size: usize,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: HashMap<(usize, u32), VecDeque<Vec<f64>>>,
    barrier: Arc<Barrier>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("stashed", &self.stash.values().map(VecDeque::len).sum::<usize>())
            .finish()
    }
}

impl Endpoint {
    /// A world of one rank.
    pub fn solo() -> Self {
        World::create(1).remove(0)
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Non-blocking send.
    pub fn send(&self, dest: usize, tag: u32, payload: Vec<f64>) -> Result<(), CommError> {
        let outbox = self.outboxes.get(dest).ok_or(CommError::InvalidRank {
            rank: dest,
            size: self.size,
        })?;
        outbox
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| CommError::Disconnected(dest))
    }

    /// Blocking receive of the next message from `source` with `tag`.
    pub fn recv(&mut self, source: usize, tag: u32) -> Result<Vec<f64>, CommError> {
        if let Some(queue) = self.stash.get_mut(&(source, tag)) {
            if let Some(payload) = queue.pop_front() {
                return Ok(payload);
            }
        }
        loop {
            let env = self
                .inbox
                .recv()
                .map_err(|_| CommError::Disconnected(source))?;
            if env.source == source && env.tag == tag {
                return Ok(env.payload);
            }
            self.stash
                .entry((env.source, env.tag))
                .or_default()
                .push_back(env.payload);
        }
    }

    /// Receive and check the payload length.
    pub fn recv_exact(&mut self, source: usize, tag: u32, expected: usize) -> Result<Vec<f64>, CommError> {
        let payload = self.recv(source, tag)?;
        debug_assert_eq!(
            payload.len(),
            expected,
            "rank {} received a mismatched buffer from {} (tag {:#x})",
            self.rank,
            source,
            tag
        );
        if payload.len() != expected {
            return Err(CommError::BufferSizeMismatch {
                source_rank: source,
                tag,
                expected,
                actual: payload.len(),
            });
        }
        Ok(payload)
    }

    /// Block until every rank arrives.
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    /// Element-wise all-reduce.
    pub fn all_reduce(&mut self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>, CommError> {
        if self.size == 1 {
            return Ok(values.to_vec());
        }
        if self.is_root() {
            let mut acc = values.to_vec();
            for source in 1..self.size {
                let part = self.recv_exact(source, TAG_REDUCE, values.len())?;
                op.combine(&mut acc, &part);
            }
            for dest in 1..self.size {
                self.send(dest, TAG_BROADCAST, acc.clone())?;
            }
            Ok(acc)
        } else {
            self.send(0, TAG_REDUCE, values.to_vec())?;
            self.recv_exact(0, TAG_BROADCAST, values.len())
        }
    }

    /// Element-wise sum over all ranks.
    pub fn all_reduce_sum(&mut self, values: &[f64]) -> Result<Vec<f64>, CommError> {
        self.all_reduce(values, ReduceOp::Sum)
    }

    /// Scalar sum over all ranks.
    pub fn sum(&mut self, value: f64) -> Result<f64, CommError> {
        Ok(self.all_reduce_sum(&[value])?[0])
    }

    /// Scalar maximum over all ranks.
    pub fn max(&mut self, value: f64) -> Result<f64, CommError> {
        Ok(self.all_reduce(&[value], ReduceOp::Max)?[0])
    }

    /// Scalar minimum over all ranks.
    pub fn min(&mut self, value: f64) -> Result<f64, CommError> {
        Ok(self.all_reduce(&[value], ReduceOp::Min)?[0])
    }

    /// Collect every rank's values on rank 0 in rank order; other ranks
    /// get `None`. Lengths may differ between ranks.
    pub fn gather(&mut self, values: &[f64]) -> Result<Option<Vec<Vec<f64>>>, CommError> {
        if !self.is_root() {
            self.send(0, TAG_GATHER, values.to_vec())?;
            return Ok(None);
        }
        let mut parts = Vec::with_capacity(self.size);
        parts.push(values.to_vec());
        for source in 1..self.size {
            parts.push(self.recv(source, TAG_GATHER)?);
        }
        Ok(Some(parts))
    }

    /// Hand rank `r` the `r`-th of rank 0's `parts`. Only rank 0's `parts`
    /// are read; a missing entry arrives empty.
    pub fn scatter(&mut self, mut parts: Vec<Vec<f64>>) -> Result<Vec<f64>, CommError> {
        if !self.is_root() {
            return self.recv(0, TAG_SCATTER);
        }
        parts.resize_with(self.size, Vec::new);
        for dest in 1..self.size {
            self.send(dest, TAG_SCATTER, std::mem::take(&mut parts[dest]))?;
        }
        Ok(parts.swap_remove(0))
    }

    /// Broadcast rank 0's values to every rank.
    pub fn broadcast(&mut self, values: &[f64]) -> Result<Vec<f64>, CommError> {
        if self.size == 1 {
            return Ok(values.to_vec());
        }
        if self.is_root() {
            for dest in 1..self.size {
                self.send(dest, TAG_BROADCAST, values.to_vec())?;
            }
            Ok(values.to_vec())
        } else {
            self.recv_exact(0, TAG_BROADCAST, values.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solo_reduce_is_identity() {
        let mut ep = Endpoint::solo();
        assert_eq!(ep.all_reduce_sum(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
        assert_eq!(ep.max(3.0).unwrap(), 3.0);
    }

    #[test]
    fn test_gather_then_scatter_across_ranks() {
        let endpoints = World::create(3);
        let out: Vec<Vec<f64>> = std::thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|mut ep| {
                    scope.spawn(move || {
                        let mine = vec![ep.rank() as f64; ep.rank() + 1];
                        let parts = ep.gather(&mine).unwrap();
                        let replies = match parts {
                            Some(parts) => {
                                assert_eq!(parts.iter().map(Vec::len).collect::<Vec<_>>(), [1, 2, 3]);
                                parts.into_iter().map(|p| vec![p.iter().sum::<f64>()]).collect()
                            }
                            None => Vec::new(),
                        };
                        ep.scatter(replies).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(out, vec![vec![0.0], vec![2.0], vec![6.0]]);
    }

    #[test]
    fn test_out_of_order_stash() {
        let mut ep = Endpoint::solo();
        ep.send(0, 7, vec![1.0]).unwrap();
        ep.send(0, 8, vec![2.0]).unwrap();
        ep.send(0, 7, vec![3.0]).unwrap();
        assert_eq!(ep.recv(0, 8).unwrap(), vec![2.0]);
        assert_eq!(ep.recv(0, 7).unwrap(), vec![1.0]);
        assert_eq!(ep.recv(0, 7).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let mut ep = Endpoint::solo();
        ep.send(0, 1, vec![1.0, 2.0]).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ep.recv_exact(0, 1, 3)));
        match result {
            Ok(Err(CommError::BufferSizeMismatch { expected, actual, .. })) => {
                assert_eq!((expected, actual), (3, 2));
            }
            Ok(other) => panic!("unexpected result {:?}", other),
            Err(_) => assert!(cfg!(debug_assertions)),
        }
    }

    #[test]
    fn test_threaded_all_reduce() {
        let endpoints = World::create(4);
        let results: Vec<Vec<f64>> = std::thread::scope(|s| {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|mut ep| {
                    s.spawn(move || {
                        let r = ep.rank() as f64;
                        let sum = ep.all_reduce_sum(&[r, 1.0]).unwrap();
                        let max = ep.max(r).unwrap();
                        ep.barrier();
                        vec![sum[0], sum[1], max]
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in results {
            assert_eq!(r, vec![6.0, 4.0, 3.0]);
        }
    }
}
