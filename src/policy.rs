//! Edge-selection policies for one walk step.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rand::Rng;

use crate::error::{Result, WalkError};
use crate::frontier::Frontier;
use crate::graph::PartitionView;
use crate::intersect::intersect_neighbors;
use crate::partition::Collective;
use crate::sampling::{select_random_edges, BiasFn, EdgeRef};
use crate::{EdgeWeight, VertexId, INVALID_VERTEX};

/// How the next edge of a walk is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WalkPolicy {
    /// Uniform over out-edges.
    #[default]
    Uniform,
    /// Proportional to edge weight, normalized by the source's out-weight.
    Biased,
    /// Second-order node2vec bias with return parameter `p` and in-out parameter `q`.
    Node2Vec { p: f32, q: f32 },
}

/// Successor vertices, and their edge weights when the graph is weighted.
pub type Step = (Vec<VertexId>, Option<Vec<EdgeWeight>>);

impl WalkPolicy {
    pub fn validate(&self) -> Result<()> {
        if let Self::Node2Vec { p, q } = *self {
            for (name, value) in [("p", p), ("q", q)] {
                if !(value.is_finite() && value > 0.0) {
                    return Err(WalkError::InvalidParameter { name, value });
                }
            }
        }
        Ok(())
    }

    /// Whether walks must carry their previous vertex.
    pub fn is_second_order(&self) -> bool {
        matches!(self, Self::Node2Vec { .. })
    }

    /// Draw one successor per frontier walk.
    ///
    /// Every current vertex must be local to `graph`. Walks without a
    /// selectable edge get [`INVALID_VERTEX`] and weight 0. The node2vec
    /// variant intersects neighborhoods across partitions, so all partitions
    /// must call this in lock-step.
    pub fn follow_random_edge<G, C, R>(&self, graph: &G, comm: &C, frontier: &Frontier, rng: &mut R) -> Result<Step>
    where
        G: PartitionView + ?Sized,
        C: Collective,
        R: Rng + ?Sized,
    {
        let invalid = Some((INVALID_VERTEX, 0.0));

        let (_, picks) = match *self {
            Self::Uniform => select_random_edges(graph, frontier.current(), None, successor, rng, 1, false, invalid),
            Self::Biased => {
                if !graph.is_weighted() {
                    return Err(WalkError::MissingWeights);
                }
                let first = graph.local_range().start;
                let sums = out_weight_sums(graph);
                let normalized = |_: &VertexId, e: &EdgeRef| {
                    let sum = sums[e.src - first];
                    if sum > 0.0 {
                        e.weight.unwrap_or(0.0) / sum
                    } else {
                        0.0
                    }
                };
                let bias: BiasFn<'_, VertexId> = &normalized;
                select_random_edges(graph, frontier.current(), Some(bias), successor, rng, 1, false, invalid)
            }
            Self::Node2Vec { p, q } => {
                self.validate()?;
                let keys = frontier.pairs();
                let mut pairs = keys.clone();
                pairs.sort_unstable();
                pairs.dedup();
                let common = intersect_neighbors(graph, comm, &pairs)?;

                let second_order = |key: &(VertexId, VertexId), e: &EdgeRef| {
                    let w = e.weight.unwrap_or(1.0);
                    if e.dst == key.1 {
                        return w / p;
                    }
                    let shared = match pairs.binary_search(key) {
                        Ok(i) => common.get(i).binary_search(&e.dst).is_ok(),
                        Err(_) => false,
                    };
                    if shared {
                        w
                    } else {
                        w / q
                    }
                };
                let bias: BiasFn<'_, (VertexId, VertexId)> = &second_order;
                select_random_edges(graph, &keys, Some(bias), successor, rng, 1, false, invalid)
            }
        };

        let (next, weights): (Vec<VertexId>, Vec<EdgeWeight>) = picks.into_iter().unzip();
        Ok((next, graph.is_weighted().then_some(weights)))
    }
}

fn successor<K>(_: &K, e: &EdgeRef) -> (VertexId, EdgeWeight) {
    (e.dst, e.weight.unwrap_or(0.0))
}

/// Sum of outgoing edge weights for every local vertex, indexed from the local range start.
pub fn out_weight_sums<G: PartitionView + ?Sized>(graph: &G) -> Vec<EdgeWeight> {
    let columns: Vec<&[EdgeWeight]> = graph
        .local_range()
        .map(|v| graph.out_edges(v).1.unwrap_or(&[]))
        .collect();

    #[cfg(feature = "parallel")]
    let sums: Vec<EdgeWeight> = columns.par_iter().map(|w| w.iter().sum::<EdgeWeight>()).collect();
    #[cfg(not(feature = "parallel"))]
    let sums: Vec<EdgeWeight> = columns.iter().map(|w| w.iter().sum::<EdgeWeight>()).collect();

    sums
}
