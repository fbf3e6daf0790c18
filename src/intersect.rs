//! Neighbor intersection over `(a, b)` vertex pairs.

use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{instrument, trace};

use crate::error::{CollectiveError, Result, WalkError};
use crate::graph::PartitionView;
use crate::partition::{first_failed_rank, Collective};
use crate::VertexId;

/// Per-pair intersections of out-neighbor sets in CSR form.
///
/// `indices[offsets[i]..offsets[i + 1]]` is the sorted, deduplicated set
/// `N(a) ∩ N(b)` for the `i`-th input pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intersection {
    pub offsets: Vec<usize>,
    pub indices: Vec<VertexId>,
}

impl Intersection {
    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Intersection for pair `i`.
    pub fn get(&self, i: usize) -> &[VertexId] {
        &self.indices[self.offsets[i]..self.offsets[i + 1]]
    }
}

/// Intersect the out-neighbors of both endpoints of every pair.
///
/// `pairs` must be sorted. Adjacency of vertices owned elsewhere is fetched
/// from their owners, so this is a collective: every partition must call it
/// once per round, even with no pairs. Invalid input on any partition fails
/// the call on all of them.
#[instrument(skip_all, fields(rank = comm.rank(), pairs = pairs.len()))]
pub fn intersect_neighbors<G, C>(graph: &G, comm: &C, pairs: &[(VertexId, VertexId)]) -> Result<Intersection>
where
    G: PartitionView + ?Sized,
    C: Collective,
{
    let local = match (1..pairs.len()).find(|&i| pairs[i] < pairs[i - 1]) {
        Some(index) => Err(WalkError::UnsortedPairs { index }),
        None => pairs.iter().try_for_each(|&(a, b)| {
            graph.partitioning().check_vertex(a)?;
            graph.partitioning().check_vertex(b)
        }),
    };
    let failed = first_failed_rank(comm, local.is_err())?;
    local?;
    if let Some(rank) = failed {
        return Err(CollectiveError::PeerFailed { rank }.into());
    }

    let remote = fetch_remote_adjacency(graph, comm, pairs)?;
    let lists: Vec<(&[VertexId], &[VertexId])> = pairs
        .iter()
        .map(|&(a, b)| (neighbors(graph, &remote, a), neighbors(graph, &remote, b)))
        .collect();

    #[cfg(feature = "parallel")]
    let per_pair: Vec<Vec<VertexId>> = lists.par_iter().map(|&(a, b)| intersect_sorted(a, b)).collect();
    #[cfg(not(feature = "parallel"))]
    let per_pair: Vec<Vec<VertexId>> = lists.iter().map(|&(a, b)| intersect_sorted(a, b)).collect();

    let mut out = Intersection {
        offsets: Vec::with_capacity(pairs.len() + 1),
        indices: Vec::new(),
    };
    out.offsets.push(0);
    for set in per_pair {
        out.indices.extend(set);
        out.offsets.push(out.indices.len());
    }
    Ok(out)
}

/// Ask owners for the adjacency of every non-local endpoint.
fn fetch_remote_adjacency<G, C>(
    graph: &G,
    comm: &C,
    pairs: &[(VertexId, VertexId)],
) -> Result<HashMap<VertexId, Vec<VertexId>>>
where
    G: PartitionView + ?Sized,
    C: Collective,
{
    let me = comm.rank();
    let mut wanted: Vec<VertexId> = pairs
        .iter()
        .flat_map(|&(a, b)| [a, b])
        .filter(|&v| !graph.is_local(v))
        .collect();
    wanted.sort_unstable();
    wanted.dedup();

    let owner = |v: VertexId| graph.owner_of(v).unwrap_or(usize::MAX);
    let requests: Vec<(VertexId, usize)> = wanted.into_iter().map(|v| (v, me)).collect();
    let incoming = comm.shuffle(requests, |&(v, _)| owner(v))?;

    let replies: Vec<(VertexId, usize, Vec<VertexId>)> = incoming
        .into_iter()
        .map(|(v, requester)| (v, requester, graph.out_edges(v).0.to_vec()))
        .collect();
    let answered = comm.shuffle(replies, |&(_, requester, _)| requester)?;
    trace!(fetched = answered.len(), "fetched remote adjacency");

    Ok(answered.into_iter().map(|(v, _, nbrs)| (v, nbrs)).collect())
}

fn neighbors<'a, G: PartitionView + ?Sized>(
    graph: &'a G,
    remote: &'a HashMap<VertexId, Vec<VertexId>>,
    v: VertexId,
) -> &'a [VertexId] {
    if graph.is_local(v) {
        graph.out_edges(v).0
    } else {
        remote.get(&v).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn intersect_sorted(a: &[VertexId], b: &[VertexId]) -> Vec<VertexId> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                if out.last() != Some(&a[i]) {
                    out.push(a[i]);
                }
                i += 1;
                j += 1;
            }
        }
    }
    out
}
