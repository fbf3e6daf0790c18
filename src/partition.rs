//! Vertex partitioning and the collective shuffle.
//!
//! A [`Partitioning`] splits the vertex space `0..vertex_count` into
//! contiguous ranges, one per partition. [`Collective`] moves values between
//! partitions by key; every partition must enter each shuffle in the same
//! order, and a missing participant blocks the others indefinitely.

use std::any::Any;
use std::ops::Range;
use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use crate::error::{CollectiveError, Result, WalkError};
use crate::VertexId;

/// Contiguous 1-D vertex partitioning described by exclusive range ends.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Partitioning {
    range_lasts: Vec<VertexId>,
}

impl Partitioning {
    /// Build from the exclusive upper bound of every partition's range.
    ///
    /// `range_lasts[i]` is one past the last vertex owned by partition `i`;
    /// the table must be non-empty and non-decreasing.
    pub fn new(range_lasts: Vec<VertexId>) -> Result<Self> {
        if range_lasts.is_empty() {
            return Err(WalkError::InvalidPartitioning {
                reason: "at least one partition is required",
            });
        }
        if range_lasts.windows(2).any(|w| w[1] < w[0]) {
            return Err(WalkError::InvalidPartitioning {
                reason: "range lasts must be non-decreasing",
            });
        }
        Ok(Self { range_lasts })
    }

    /// One partition owning every vertex.
    pub fn single(vertex_count: usize) -> Self {
        Self {
            range_lasts: vec![vertex_count],
        }
    }

    /// Split `vertex_count` vertices into `parts` ranges whose sizes differ by at most one.
    pub fn even(vertex_count: usize, parts: usize) -> Result<Self> {
        if parts == 0 {
            return Err(WalkError::InvalidPartitioning {
                reason: "at least one partition is required",
            });
        }
        let base = vertex_count / parts;
        let extra = vertex_count % parts;
        let mut last = 0;
        let range_lasts = (0..parts)
            .map(|i| {
                last += base + usize::from(i < extra);
                last
            })
            .collect();
        Ok(Self { range_lasts })
    }

    /// Exclusive range ends, one per partition.
    pub fn vertex_partition_range_lasts(&self) -> &[VertexId] {
        &self.range_lasts
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.range_lasts.len()
    }

    /// Always false; a partitioning has at least one partition.
    pub fn is_empty(&self) -> bool {
        self.range_lasts.is_empty()
    }

    /// Size of the whole vertex space.
    pub fn vertex_count(&self) -> usize {
        self.range_lasts.last().copied().unwrap_or(0)
    }

    /// Vertices owned by `rank`; empty for ranks outside the table.
    pub fn local_range(&self, rank: usize) -> Range<VertexId> {
        let Some(&last) = self.range_lasts.get(rank) else {
            return 0..0;
        };
        let first = if rank == 0 { 0 } else { self.range_lasts[rank - 1] };
        first..last
    }

    /// Partition that owns `vertex`, or `None` outside the vertex space.
    pub fn owner_of(&self, vertex: VertexId) -> Option<usize> {
        let rank = self.range_lasts.partition_point(|&last| last <= vertex);
        (rank < self.range_lasts.len()).then_some(rank)
    }

    /// Check that `vertex` lies inside the vertex space.
    pub fn check_vertex(&self, vertex: VertexId) -> Result<()> {
        if vertex < self.vertex_count() {
            Ok(())
        } else {
            Err(WalkError::VertexOutOfRange {
                vertex,
                vertex_count: self.vertex_count(),
            })
        }
    }
}

/// Key-based redistribution of values across all partitions.
///
/// `shuffle` sends every value to the partition named by `key_fn` and
/// returns what this partition received, ordered by sending rank and then by
/// the sender's original order.
pub trait Collective {
    /// This partition's id.
    fn rank(&self) -> usize;

    /// Number of participating partitions.
    fn size(&self) -> usize;

    /// Redistribute `values` by destination partition.
    fn shuffle<T, F>(&self, values: Vec<T>, key_fn: F) -> core::result::Result<Vec<T>, CollectiveError>
    where
        T: Send + 'static,
        F: Fn(&T) -> usize;
}

/// Share a local pass/fail verdict with every partition.
///
/// Returns the lowest failing rank, this one included. Every partition must
/// call it, including those that already know they failed.
pub(crate) fn first_failed_rank<C: Collective + ?Sized>(
    comm: &C,
    failed: bool,
) -> core::result::Result<Option<usize>, CollectiveError> {
    if comm.size() == 1 {
        return Ok(failed.then_some(0));
    }
    let verdicts: Vec<(usize, bool)> = (0..comm.size()).map(|to| (to, failed)).collect();
    let received = comm.shuffle(verdicts, |&(to, _)| to)?;
    // One verdict per sender, in rank order.
    Ok(received.iter().position(|&(_, failed)| failed))
}

/// The trivial collective for a single partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloCollective;

impl Collective for SoloCollective {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn shuffle<T, F>(&self, values: Vec<T>, key_fn: F) -> core::result::Result<Vec<T>, CollectiveError>
    where
        T: Send + 'static,
        F: Fn(&T) -> usize,
    {
        if let Some(destination) = values.iter().map(&key_fn).find(|&d| d != 0) {
            return Err(CollectiveError::InvalidDestination {
                destination,
                size: 1,
            });
        }
        Ok(values)
    }
}

type Mailbox = Option<Box<dyn Any + Send>>;

#[derive(Debug)]
struct Round {
    // slots[from * size + to]
    slots: Vec<Mailbox>,
    // failed[rank] is written by `rank` before the first barrier of a round.
    failed: Vec<bool>,
}

#[derive(Debug)]
struct Exchange {
    size: usize,
    barrier: Barrier,
    round: Mutex<Round>,
}

impl Exchange {
    /// Lock the round state. Poisoning is recorded in `error`; the caller
    /// still has to reach the next barrier.
    fn lock_round(&self, error: &mut Option<CollectiveError>) -> MutexGuard<'_, Round> {
        self.round.lock().unwrap_or_else(|poisoned| {
            error.get_or_insert(CollectiveError::LockPoisoned);
            poisoned.into_inner()
        })
    }
}

/// One partition's handle into an in-process collective group.
///
/// Each handle is meant to be driven by its own thread; `shuffle` is a
/// barrier rendezvous across all handles of the group. A shuffle always
/// runs both rendezvous steps, even when this rank fails to route a value,
/// and then fails on every rank of the group: the failing rank gets its own
/// error and the others get [`CollectiveError::PeerFailed`].
#[derive(Debug, Clone)]
pub struct ThreadCollective {
    rank: usize,
    exchange: Arc<Exchange>,
}

impl ThreadCollective {
    /// Create `size` connected handles, one per partition, ordered by rank.
    pub fn group(size: usize) -> Vec<Self> {
        let exchange = Arc::new(Exchange {
            size,
            barrier: Barrier::new(size),
            round: Mutex::new(Round {
                slots: (0..size * size).map(|_| None).collect(),
                failed: vec![false; size],
            }),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                exchange: Arc::clone(&exchange),
            })
            .collect()
    }
}

impl Collective for ThreadCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.exchange.size
    }

    fn shuffle<T, F>(&self, values: Vec<T>, key_fn: F) -> core::result::Result<Vec<T>, CollectiveError>
    where
        T: Send + 'static,
        F: Fn(&T) -> usize,
    {
        let size = self.exchange.size;
        let mut error = None;
        let mut buckets: Vec<Vec<T>> = (0..size).map(|_| Vec::new()).collect();
        for value in values {
            let destination = key_fn(&value);
            match buckets.get_mut(destination) {
                Some(bucket) => bucket.push(value),
                None => {
                    error.get_or_insert(CollectiveError::InvalidDestination { destination, size });
                }
            }
        }

        {
            let mut round = self.exchange.lock_round(&mut error);
            for (to, bucket) in buckets.into_iter().enumerate() {
                round.slots[self.rank * size + to] = Some(Box::new(bucket));
            }
            round.failed[self.rank] = error.is_some();
        }
        self.exchange.barrier.wait();

        let mut received = Vec::new();
        {
            let mut round = self.exchange.lock_round(&mut error);
            for from in 0..size {
                let mailbox = round.slots[from * size + self.rank].take();
                match mailbox.and_then(|boxed| boxed.downcast::<Vec<T>>().ok()) {
                    Some(bucket) => received.extend(*bucket),
                    None => {
                        error.get_or_insert(CollectiveError::TypeMismatch { rank: self.rank });
                    }
                }
            }
            if error.is_none() {
                if let Some(rank) = round.failed.iter().position(|&failed| failed) {
                    error = Some(CollectiveError::PeerFailed { rank });
                }
            }
        }
        // Nobody refills a slot or a flag before every rank has drained its column.
        self.exchange.barrier.wait();

        match error {
            Some(error) => Err(error),
            None => Ok(received),
        }
    }
}
