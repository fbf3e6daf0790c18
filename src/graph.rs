//! Partitioned graph view and a partition-local CSR store.

use std::ops::Range;

use crate::edgelist::EdgeSegment;
use crate::error::Result;
use crate::partition::Partitioning;
use crate::{EdgeWeight, VertexId};

/// One partition's view of a graph whose vertices are range-partitioned.
///
/// Out-edges are stored with their source's owner, so `out_edges` is only
/// meaningful for local vertices; other vertices report no edges.
pub trait PartitionView {
    fn partitioning(&self) -> &Partitioning;

    /// Partition this view belongs to.
    fn rank(&self) -> usize;

    fn is_weighted(&self) -> bool;

    /// Return `(destinations, weights)` for a vertex.
    ///
    /// Requirements:
    /// - destinations are sorted ascending
    /// - `weights`, when present, has the same length as `destinations`
    fn out_edges(&self, vertex: VertexId) -> (&[VertexId], Option<&[EdgeWeight]>);

    fn out_degree(&self, vertex: VertexId) -> usize {
        self.out_edges(vertex).0.len()
    }

    fn vertex_partition_range_lasts(&self) -> &[VertexId] {
        self.partitioning().vertex_partition_range_lasts()
    }

    fn owner_of(&self, vertex: VertexId) -> Option<usize> {
        self.partitioning().owner_of(vertex)
    }

    fn local_range(&self) -> Range<VertexId> {
        self.partitioning().local_range(self.rank())
    }

    fn is_local(&self, vertex: VertexId) -> bool {
        self.local_range().contains(&vertex)
    }
}

/// Compressed sparse row adjacency for the vertices one partition owns.
///
/// Each adjacency is a contiguous destination list, with a matching weight
/// list when the graph is weighted.
#[derive(Debug, Clone)]
pub struct CsrGraph {
    partitioning: Partitioning,
    rank: usize,
    offsets: Vec<usize>,
    destinations: Vec<VertexId>,
    weights: Option<Vec<EdgeWeight>>,
}

impl CsrGraph {
    /// Build the local partition from consolidated edges.
    ///
    /// Edges whose source is not owned by `rank` are dropped, so a
    /// consolidated partition-local segment is stored whole. Every endpoint
    /// must lie in the vertex space.
    pub fn from_segment(partitioning: Partitioning, rank: usize, edges: &EdgeSegment) -> Result<Self> {
        let weights = edges.weight.as_deref();
        let triples = edges
            .src
            .iter()
            .zip(&edges.dst)
            .enumerate()
            .map(|(i, (&s, &d))| (s, d, weights.map(|w| w[i])));
        Self::from_triples(partitioning, rank, triples, weights.is_some())
    }

    /// Build a single-partition unweighted graph from adjacency lists.
    pub fn from_adjacency(adj: &[Vec<VertexId>]) -> Result<Self> {
        let triples = adj
            .iter()
            .enumerate()
            .flat_map(|(u, nbrs)| nbrs.iter().map(move |&v| (u, v, None)));
        Self::from_triples(Partitioning::single(adj.len()), 0, triples, false)
    }

    /// Build a single-partition weighted graph from `(src, dst, weight)` triples.
    pub fn from_weighted_edges(vertex_count: usize, edges: &[(VertexId, VertexId, EdgeWeight)]) -> Result<Self> {
        let triples = edges.iter().map(|&(s, d, w)| (s, d, Some(w)));
        Self::from_triples(Partitioning::single(vertex_count), 0, triples, true)
    }

    fn from_triples<I>(partitioning: Partitioning, rank: usize, triples: I, weighted: bool) -> Result<Self>
    where
        I: Iterator<Item = (VertexId, VertexId, Option<EdgeWeight>)>,
    {
        let local = partitioning.local_range(rank);
        let mut kept: Vec<(VertexId, VertexId, EdgeWeight)> = Vec::new();
        for (s, d, w) in triples {
            partitioning.check_vertex(s)?;
            partitioning.check_vertex(d)?;
            if local.contains(&s) {
                kept.push((s, d, w.unwrap_or(1.0)));
            }
        }
        // Keep destination/weight pairs aligned while sorting by (src, dst).
        kept.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut offsets = vec![0usize; local.len() + 1];
        for &(s, _, _) in &kept {
            offsets[s - local.start + 1] += 1;
        }
        for i in 0..local.len() {
            offsets[i + 1] += offsets[i];
        }

        let destinations = kept.iter().map(|&(_, d, _)| d).collect();
        let weights = weighted.then(|| kept.iter().map(|&(_, _, w)| w).collect());

        Ok(Self {
            partitioning,
            rank,
            offsets,
            destinations,
            weights,
        })
    }

    /// Number of locally stored edges.
    pub fn edge_count(&self) -> usize {
        self.destinations.len()
    }

    /// Iterate stored `(src, dst, weight)` triples in CSR order.
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId, Option<EdgeWeight>)> + '_ {
        let first = self.local_range().start;
        self.offsets.windows(2).enumerate().flat_map(move |(i, w)| {
            (w[0]..w[1]).map(move |e| {
                (
                    first + i,
                    self.destinations[e],
                    self.weights.as_ref().map(|ws| ws[e]),
                )
            })
        })
    }
}

impl PartitionView for CsrGraph {
    fn partitioning(&self) -> &Partitioning {
        &self.partitioning
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn is_weighted(&self) -> bool {
        self.weights.is_some()
    }

    fn out_edges(&self, vertex: VertexId) -> (&[VertexId], Option<&[EdgeWeight]>) {
        let local = self.local_range();
        if !local.contains(&vertex) {
            return (&[], self.weights.as_ref().map(|_| &[][..]));
        }
        let i = vertex - local.start;
        let span = self.offsets[i]..self.offsets[i + 1];
        (
            &self.destinations[span.clone()],
            self.weights.as_ref().map(|ws| &ws[span]),
        )
    }
}
