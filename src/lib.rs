//! # walkshard
//!
//! Concurrent edge ingestion and partitioned random walks.
//!
//! The crate has two halves that meet at graph construction:
//!
//! - **Ingestion**: [`EdgeBuffer`] accepts edge batches from many threads,
//!   is frozen with [`EdgeBuffer::finalize`], and is collapsed into one
//!   partition-local [`EdgeSegment`] by [`EdgeBuffer::consolidate_and_shuffle`].
//! - **Walks**: [`RandomWalkEngine`] walks a [`PartitionView`] for a fixed
//!   number of steps under a [`WalkPolicy`] (uniform, weight-biased, or
//!   node2vec), producing a sentinel-padded [`WalkMatrix`].
//!
//! Partitions cooperate through a [`Collective`]. [`SoloCollective`] serves a
//! single partition; [`ThreadCollective`] runs one partition per thread.
//!
//! ```
//! use walkshard::{uniform_random_walks, CsrGraph, SoloCollective, INVALID_VERTEX};
//!
//! let g = CsrGraph::from_adjacency(&[vec![1], vec![2], vec![]]).unwrap();
//! let walks = uniform_random_walks(&g, &SoloCollective, &[0], 4, 42).unwrap();
//! assert_eq!(walks.walk(0), &[0, 1, 2, INVALID_VERTEX, INVALID_VERTEX]);
//! ```

pub mod consolidate;
pub mod edgelist;
pub mod error;
pub mod frontier;
pub mod graph;
pub mod intersect;
pub mod partition;
pub mod policy;
pub mod random_walk;
pub mod sampling;

/// Global vertex id.
pub type VertexId = usize;
pub type EdgeWeight = f32;
pub type EdgeId = u64;
pub type EdgeTypeId = u32;

/// Marks a walk that has no further vertex.
pub const INVALID_VERTEX: VertexId = VertexId::MAX;

pub use edgelist::{EdgeBatch, EdgeBuffer, EdgeProperties, EdgeSegment, Phase};
pub use error::{
    CollectiveError, CollectiveErrorCode, IngestError, IngestErrorCode, Result, WalkError, WalkErrorCode,
};
pub use frontier::{Channels, Frontier, WalkRow};
pub use graph::{CsrGraph, PartitionView};
pub use intersect::{intersect_neighbors, Intersection};
pub use partition::{Collective, Partitioning, SoloCollective, ThreadCollective};
pub use policy::{out_weight_sums, WalkPolicy};
pub use random_walk::{
    biased_random_walks, node2vec_random_walks, uniform_random_walks, RandomWalkEngine, WalkConfig, WalkMatrix,
};
pub use sampling::{select_random_edges, BiasFn, EdgeRef, FrontierKey};
