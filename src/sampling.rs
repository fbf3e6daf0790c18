//! Per-vertex random selection of outgoing edges.

use rand::seq::index;
use rand::Rng;

use crate::graph::PartitionView;
use crate::{EdgeWeight, VertexId};

/// A frontier entry that names the vertex whose out-edges are sampled.
///
/// Keys may carry extra tags (e.g. a previous vertex) that bias functions read.
pub trait FrontierKey: Copy {
    fn vertex(&self) -> VertexId;
}

impl FrontierKey for VertexId {
    fn vertex(&self) -> VertexId {
        *self
    }
}

/// `(current, previous)`; the current vertex is sampled.
impl FrontierKey for (VertexId, VertexId) {
    fn vertex(&self) -> VertexId {
        self.0
    }
}

/// One outgoing edge as seen by bias and transform functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeRef {
    pub src: VertexId,
    pub dst: VertexId,
    pub weight: Option<EdgeWeight>,
}

/// Bias for an edge given the frontier key it is sampled for.
///
/// Non-finite or non-positive biases remove the edge from consideration.
pub type BiasFn<'a, K> = &'a dyn Fn(&K, &EdgeRef) -> EdgeWeight;

/// Sample up to `k` outgoing edges for every frontier entry.
///
/// With `bias == None` edges are drawn uniformly; otherwise proportionally
/// to the bias. Each selected edge is mapped through `transform`.
///
/// When `invalid` is given, exactly `k` results are produced per entry
/// (padded with `invalid`) and no offsets are returned. Otherwise the
/// returned offsets delimit each entry's results.
#[allow(clippy::too_many_arguments)]
pub fn select_random_edges<G, K, O, T, R>(
    graph: &G,
    frontier: &[K],
    bias: Option<BiasFn<'_, K>>,
    transform: T,
    rng: &mut R,
    k: usize,
    with_replacement: bool,
    invalid: Option<O>,
) -> (Option<Vec<usize>>, Vec<O>)
where
    G: PartitionView + ?Sized,
    K: FrontierKey,
    O: Clone,
    T: Fn(&K, &EdgeRef) -> O,
    R: Rng + ?Sized,
{
    let mut offsets = invalid.is_none().then(|| {
        let mut offsets = Vec::with_capacity(frontier.len() + 1);
        offsets.push(0);
        offsets
    });
    let mut results = Vec::with_capacity(frontier.len() * k);
    let mut picks: Vec<usize> = Vec::with_capacity(k);
    let mut biases: Vec<EdgeWeight> = Vec::new();

    for key in frontier {
        let src = key.vertex();
        let (dsts, wts) = graph.out_edges(src);
        let edge = |i: usize| EdgeRef {
            src,
            dst: dsts[i],
            weight: wts.map(|w| w[i]),
        };

        picks.clear();
        match bias {
            None => pick_uniform(rng, dsts.len(), k, with_replacement, &mut picks),
            Some(bias) => {
                biases.clear();
                biases.extend((0..dsts.len()).map(|i| sanitize(bias(key, &edge(i)))));
                pick_biased(rng, &mut biases, k, with_replacement, &mut picks);
            }
        }

        results.extend(picks.iter().map(|&i| transform(key, &edge(i))));
        match (&mut offsets, &invalid) {
            (Some(offsets), _) => offsets.push(results.len()),
            (None, Some(invalid)) => {
                results.extend(std::iter::repeat(invalid.clone()).take(k - picks.len()));
            }
            (None, None) => {}
        }
    }

    (offsets, results)
}

fn sanitize(bias: EdgeWeight) -> EdgeWeight {
    if bias.is_finite() && bias > 0.0 {
        bias
    } else {
        0.0
    }
}

fn pick_uniform<R: Rng + ?Sized>(rng: &mut R, degree: usize, k: usize, with_replacement: bool, out: &mut Vec<usize>) {
    if degree == 0 || k == 0 {
        return;
    }
    if with_replacement {
        out.extend((0..k).map(|_| rng.random_range(0..degree)));
    } else if degree <= k {
        out.extend(0..degree);
    } else {
        out.extend(index::sample(rng, degree, k).into_iter());
    }
}

fn pick_biased<R: Rng + ?Sized>(
    rng: &mut R,
    biases: &mut [EdgeWeight],
    k: usize,
    with_replacement: bool,
    out: &mut Vec<usize>,
) {
    let mut total: EdgeWeight = biases.iter().sum();
    for _ in 0..k {
        if !(total > 0.0) {
            break;
        }
        let i = sample_cdf(rng, biases, total);
        out.push(i);
        if !with_replacement {
            biases[i] = 0.0;
            total = biases.iter().sum();
        }
    }
}

/// Draw an index with probability `weights[i] / total`.
///
/// `total` must be positive; zero-weight entries are never returned.
pub(crate) fn sample_cdf<R: Rng + ?Sized>(rng: &mut R, weights: &[EdgeWeight], total: EdgeWeight) -> usize {
    let mut r = rng.random::<EdgeWeight>() * total;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        if r < w {
            return i;
        }
        r -= w;
        last_positive = i;
    }
    // Rounding can leave `r` just past the final bucket.
    last_positive
}
