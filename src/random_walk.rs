//! Random walk generation over a partitioned graph.
//!
//! Every partition runs the same engine over its own start vertices. Each
//! step moves walks to the partition that owns their current vertex, draws
//! one successor through the configured [`WalkPolicy`], drops terminated
//! walks, and sends survivors back so their owner can record the step.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::error::{CollectiveError, Result, WalkError};
use crate::frontier::{Channels, Frontier, WalkRow, MAX_ACTIVE_WALKS};
use crate::graph::PartitionView;
use crate::partition::{first_failed_rank, Collective};
use crate::policy::WalkPolicy;
use crate::{EdgeWeight, VertexId, INVALID_VERTEX};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WalkConfig {
    /// Steps per walk; each output row holds `max_length + 1` vertices.
    pub max_length: usize,
    pub policy: WalkPolicy,
    pub seed: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_length: 80,
            policy: WalkPolicy::Uniform,
            seed: 42,
        }
    }
}

/// Row-major walk output.
///
/// `vertices` is `rows x (max_length + 1)` with the start vertex in column
/// 0. `weights`, present for weighted graphs, is `rows x max_length` and
/// holds the weight of the edge taken at each step. Cells after a walk
/// terminates keep [`INVALID_VERTEX`] and `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkMatrix {
    rows: usize,
    max_length: usize,
    vertices: Vec<VertexId>,
    weights: Option<Vec<EdgeWeight>>,
}

impl WalkMatrix {
    fn new(starts: &[VertexId], max_length: usize, weighted: bool) -> Self {
        let rows = starts.len();
        let mut vertices = vec![INVALID_VERTEX; rows * (max_length + 1)];
        for (row, &v) in starts.iter().enumerate() {
            vertices[row * (max_length + 1)] = v;
        }
        Self {
            rows,
            max_length,
            vertices,
            weights: weighted.then(|| vec![0.0; rows * max_length]),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn weights(&self) -> Option<&[EdgeWeight]> {
        self.weights.as_deref()
    }

    /// All `max_length + 1` cells of one walk.
    pub fn walk(&self, row: usize) -> &[VertexId] {
        let width = self.max_length + 1;
        &self.vertices[row * width..(row + 1) * width]
    }

    pub fn walk_weights(&self, row: usize) -> Option<&[EdgeWeight]> {
        let width = self.max_length;
        self.weights.as_deref().map(|w| &w[row * width..(row + 1) * width])
    }

    pub fn vertex(&self, row: usize, col: usize) -> VertexId {
        self.vertices[row * (self.max_length + 1) + col]
    }

    /// The visited prefix of a walk, without sentinel padding.
    pub fn trimmed(&self, row: usize) -> &[VertexId] {
        let walk = self.walk(row);
        let end = walk.iter().position(|&v| v == INVALID_VERTEX).unwrap_or(walk.len());
        &walk[..end]
    }

    pub fn into_parts(self) -> (Vec<VertexId>, Option<Vec<EdgeWeight>>) {
        (self.vertices, self.weights)
    }

    /// Record the vertex reached at step `level` for every walk in `frontier`.
    fn scatter(&mut self, frontier: &Frontier, level: usize) {
        let width = self.max_length + 1;
        for (i, (&v, &row)) in frontier.current().iter().zip(frontier.position()).enumerate() {
            self.vertices[row * width + level + 1] = v;
            if let (Some(out), Some(w)) = (self.weights.as_mut(), frontier.weight()) {
                out[row * self.max_length + level] = w[i];
            }
        }
    }
}

/// Walk driver for one partition.
///
/// All partitions of a run must call [`run`](Self::run) together with the
/// same configuration; each step performs collective shuffles.
#[derive(Debug)]
pub struct RandomWalkEngine<'g, G: ?Sized, C> {
    graph: &'g G,
    comm: &'g C,
    config: WalkConfig,
}

impl<'g, G, C> RandomWalkEngine<'g, G, C>
where
    G: PartitionView + ?Sized,
    C: Collective,
{
    pub fn new(graph: &'g G, comm: &'g C, config: WalkConfig) -> Result<Self> {
        config.policy.validate()?;
        if graph.partitioning().len() != comm.size() {
            return Err(WalkError::InvalidPartitioning {
                reason: "partition count differs from collective size",
            });
        }
        if graph.rank() != comm.rank() {
            return Err(WalkError::InvalidPartitioning {
                reason: "graph partition differs from collective rank",
            });
        }
        if config.policy == WalkPolicy::Biased && !graph.is_weighted() {
            return Err(WalkError::MissingWeights);
        }
        Ok(Self { graph, comm, config })
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// Walk from every start vertex, seeding the RNG from the config and this partition's rank.
    #[instrument(skip_all, fields(rank = self.comm.rank(), starts = starts.len(), max_length = self.config.max_length))]
    pub fn run(&self, starts: &[VertexId]) -> Result<WalkMatrix> {
        let seed = mix64(self.config.seed ^ mix64(self.comm.rank() as u64));
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.run_with_rng(starts, &mut rng)
    }

    /// Walk from every start vertex, drawing from `rng` at every step.
    pub fn run_with_rng<R: Rng + ?Sized>(&self, starts: &[VertexId], rng: &mut R) -> Result<WalkMatrix> {
        self.agree_on_starts(starts)?;

        let channels = Channels {
            previous: self.config.policy.is_second_order(),
            owner: self.comm.size() > 1,
            weight: self.graph.is_weighted(),
        };
        let mut matrix = WalkMatrix::new(starts, self.config.max_length, channels.weight);
        let mut frontier = Frontier::start(starts, channels, self.comm.rank());

        // Rows keep sentinels once their walk ends; the loop still runs every level.
        for level in 0..self.config.max_length {
            frontier = self.step(frontier, level, &mut matrix, rng)?;
        }
        Ok(matrix)
    }

    fn step<R: Rng + ?Sized>(
        &self,
        frontier: Frontier,
        level: usize,
        matrix: &mut WalkMatrix,
        rng: &mut R,
    ) -> Result<Frontier> {
        let distributed = self.comm.size() > 1;
        let mut frontier = if distributed {
            let graph = self.graph;
            self.shuffle(frontier, |row| graph.owner_of(row.current).unwrap_or(usize::MAX))?
        } else {
            frontier
        };
        if self.config.policy.is_second_order() {
            frontier.sort_by_pair();
        }

        let (next, weights) = self
            .config
            .policy
            .follow_random_edge(self.graph, self.comm, &frontier, rng)?;
        frontier.advance(next, weights);
        let terminated = frontier.retain_live()?;

        if distributed {
            frontier = self.shuffle(frontier, |row| row.owner.unwrap_or(usize::MAX))?;
        }
        matrix.scatter(&frontier, level);

        debug!(level, active = frontier.len(), terminated, "walk step");
        Ok(frontier)
    }

    /// Validate `starts` and share the verdict: a bad start on any partition
    /// fails the run on all of them before the first step.
    fn agree_on_starts(&self, starts: &[VertexId]) -> Result<()> {
        let local = if starts.len() > MAX_ACTIVE_WALKS {
            Err(WalkError::ActiveWalkOverflow { count: starts.len() })
        } else {
            starts
                .iter()
                .try_for_each(|&v| self.graph.partitioning().check_vertex(v))
        };
        let failed = first_failed_rank(self.comm, local.is_err())?;
        local?;
        match failed {
            Some(rank) => Err(CollectiveError::PeerFailed { rank }.into()),
            None => Ok(()),
        }
    }

    fn shuffle<F>(&self, frontier: Frontier, key_fn: F) -> Result<Frontier>
    where
        F: Fn(&WalkRow) -> usize,
    {
        let channels = frontier.channels();
        let rows = self.comm.shuffle(frontier.into_rows(), key_fn)?;
        Ok(Frontier::from_rows(rows, channels))
    }
}

/// Uniform walks of `max_length` steps from each start vertex.
pub fn uniform_random_walks<G, C>(
    graph: &G,
    comm: &C,
    starts: &[VertexId],
    max_length: usize,
    seed: u64,
) -> Result<WalkMatrix>
where
    G: PartitionView + ?Sized,
    C: Collective,
{
    let config = WalkConfig {
        max_length,
        policy: WalkPolicy::Uniform,
        seed,
    };
    RandomWalkEngine::new(graph, comm, config)?.run(starts)
}

/// Weight-proportional walks; the graph must be weighted.
pub fn biased_random_walks<G, C>(
    graph: &G,
    comm: &C,
    starts: &[VertexId],
    max_length: usize,
    seed: u64,
) -> Result<WalkMatrix>
where
    G: PartitionView + ?Sized,
    C: Collective,
{
    let config = WalkConfig {
        max_length,
        policy: WalkPolicy::Biased,
        seed,
    };
    RandomWalkEngine::new(graph, comm, config)?.run(starts)
}

/// Node2vec walks with return parameter `p` and in-out parameter `q`.
pub fn node2vec_random_walks<G, C>(
    graph: &G,
    comm: &C,
    starts: &[VertexId],
    max_length: usize,
    p: f32,
    q: f32,
    seed: u64,
) -> Result<WalkMatrix>
where
    G: PartitionView + ?Sized,
    C: Collective,
{
    let config = WalkConfig {
        max_length,
        policy: WalkPolicy::Node2Vec { p, q },
        seed,
    };
    RandomWalkEngine::new(graph, comm, config)?.run(starts)
}

fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    x
}
