//! Error types for edge ingestion, collectives, and walk sampling.
//!
//! Every variant is a hard failure: callers get it back immediately and no
//! operation in this crate retries. Each enum carries a stable code for
//! logging surfaces.

use std::fmt;

use thiserror::Error;

use crate::edgelist::Phase;

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? $( ( $($tuple:tt)* ) )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? $( ( $($tuple)* ) )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

/// Failure of a collective operation across partitions.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CollectiveError {
    /// A key function routed a value to a partition that does not exist.
    #[error("value routed to partition {destination}, but the group has {size} partitions")]
    InvalidDestination {
        /// Partition id returned by the key function.
        destination: usize,
        /// Number of partitions participating in the collective.
        size: usize,
    },
    /// Partitions entered the same collective with different payload types.
    #[error("partition {rank} received a payload of an unexpected type")]
    TypeMismatch {
        /// Rank that observed the mismatch.
        rank: usize,
    },
    /// The shared exchange state was poisoned by a panicking participant.
    #[error("collective exchange state is poisoned")]
    LockPoisoned,
    /// Another participant failed this round; the values it held were not exchanged.
    #[error("partition {rank} failed during the exchange")]
    PeerFailed {
        /// Lowest rank that reported a failure.
        rank: usize,
    },
}

define_error_codes! {
    /// Stable codes describing [`CollectiveError`] variants.
    enum CollectiveErrorCode for CollectiveError {
        /// A value was routed outside the group.
        InvalidDestination => InvalidDestination { .. } => "COLLECTIVE_INVALID_DESTINATION",
        /// Participants disagreed on the payload type.
        TypeMismatch => TypeMismatch { .. } => "COLLECTIVE_TYPE_MISMATCH",
        /// The exchange state was poisoned.
        LockPoisoned => LockPoisoned => "COLLECTIVE_LOCK_POISONED",
        /// A peer failed the same round.
        PeerFailed => PeerFailed { .. } => "COLLECTIVE_PEER_FAILED",
    }
}

/// Errors produced while filling or consolidating an [`crate::EdgeBuffer`].
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum IngestError {
    /// Segments must hold at least one edge.
    #[error("segment capacity must be at least 1")]
    InvalidSegmentCapacity,
    /// An appended column did not match the length of the source column.
    #[error("column `{column}` has length {got}, expected {expected}")]
    LengthMismatch {
        /// Name of the offending column.
        column: &'static str,
        /// Length of the source column.
        expected: usize,
        /// Length that was supplied.
        got: usize,
    },
    /// An optional column was supplied to a buffer without it, or omitted
    /// from a buffer that requires it.
    #[error("column `{column}` presence mismatch (buffer has column: {expected})")]
    PropertyMismatch {
        /// Name of the offending column.
        column: &'static str,
        /// Whether the buffer was constructed with this column.
        expected: bool,
    },
    /// An operation was called outside the lifecycle phase it belongs to.
    #[error("`{operation}` is not allowed while the buffer is {phase}")]
    WrongPhase {
        /// Operation that was attempted.
        operation: &'static str,
        /// Phase the buffer was in.
        phase: Phase,
    },
    /// The buffer mutex was poisoned by a panicking producer.
    #[error("edge buffer lock is poisoned")]
    LockPoisoned,
    /// A fill-phase segment was still referenced when the buffer froze.
    #[error("edge segment is still referenced by an in-flight append")]
    SegmentShared,
    /// An edge endpoint has no owning partition.
    #[error("edge endpoint {vertex} is outside the vertex space of size {vertex_count}")]
    VertexOutOfRange {
        /// First offending vertex id in append order.
        vertex: usize,
        /// Total number of vertices across all partitions.
        vertex_count: usize,
    },
    /// The redistribution collective failed.
    #[error("edge redistribution failed: {0}")]
    Collective(#[from] CollectiveError),
}

define_error_codes! {
    /// Stable codes describing [`IngestError`] variants.
    enum IngestErrorCode for IngestError {
        /// Segment capacity was zero.
        InvalidSegmentCapacity => InvalidSegmentCapacity => "INGEST_INVALID_SEGMENT_CAPACITY",
        /// Column lengths disagreed.
        LengthMismatch => LengthMismatch { .. } => "INGEST_LENGTH_MISMATCH",
        /// Optional column presence disagreed with the buffer.
        PropertyMismatch => PropertyMismatch { .. } => "INGEST_PROPERTY_MISMATCH",
        /// Lifecycle order was violated.
        WrongPhase => WrongPhase { .. } => "INGEST_WRONG_PHASE",
        /// The buffer lock was poisoned.
        LockPoisoned => LockPoisoned => "INGEST_LOCK_POISONED",
        /// A segment outlived its append.
        SegmentShared => SegmentShared => "INGEST_SEGMENT_SHARED",
        /// An edge endpoint was out of range.
        VertexOutOfRange => VertexOutOfRange { .. } => "INGEST_VERTEX_OUT_OF_RANGE",
        /// The redistribution collective failed.
        Collective => Collective(..) => "INGEST_COLLECTIVE_FAILURE",
    }
}

/// Errors produced by the random-walk engine and its sampling primitives.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum WalkError {
    /// The active walk count reached the signed 32-bit limit.
    #[error("{count} active walks exceed the compaction limit of {}", i32::MAX)]
    ActiveWalkOverflow {
        /// Number of active walks observed.
        count: usize,
    },
    /// A vertex id was outside the partitioned vertex space.
    #[error("vertex {vertex} is outside the vertex space of size {vertex_count}")]
    VertexOutOfRange {
        /// Offending vertex id.
        vertex: usize,
        /// Total number of vertices across all partitions.
        vertex_count: usize,
    },
    /// Intersection input pairs were not sorted.
    #[error("vertex pairs must be sorted; order breaks at index {index}")]
    UnsortedPairs {
        /// First index whose pair compares less than its predecessor.
        index: usize,
    },
    /// A weight-biased walk was requested on an unweighted graph.
    #[error("biased walks require edge weights")]
    MissingWeights,
    /// A numeric parameter was outside its valid domain.
    #[error("invalid walk parameter `{name}` = {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Supplied value.
        value: f32,
    },
    /// A partition boundary table was malformed.
    #[error("invalid partitioning: {reason}")]
    InvalidPartitioning {
        /// Why the table was rejected.
        reason: &'static str,
    },
    /// A cross-partition shuffle failed.
    #[error("walk shuffle failed: {0}")]
    Collective(#[from] CollectiveError),
}

define_error_codes! {
    /// Stable codes describing [`WalkError`] variants.
    enum WalkErrorCode for WalkError {
        /// Too many active walks for compaction.
        ActiveWalkOverflow => ActiveWalkOverflow { .. } => "WALK_ACTIVE_OVERFLOW",
        /// A vertex was out of range.
        VertexOutOfRange => VertexOutOfRange { .. } => "WALK_VERTEX_OUT_OF_RANGE",
        /// Intersection pairs were unsorted.
        UnsortedPairs => UnsortedPairs { .. } => "WALK_UNSORTED_PAIRS",
        /// Weights were required but absent.
        MissingWeights => MissingWeights => "WALK_MISSING_WEIGHTS",
        /// A parameter was invalid.
        InvalidParameter => InvalidParameter { .. } => "WALK_INVALID_PARAMETER",
        /// The partition table was invalid.
        InvalidPartitioning => InvalidPartitioning { .. } => "WALK_INVALID_PARTITIONING",
        /// A shuffle failed.
        Collective => Collective(..) => "WALK_COLLECTIVE_FAILURE",
    }
}

impl WalkError {
    /// Retrieve the inner [`CollectiveErrorCode`] when the failure came from a shuffle.
    pub const fn collective_code(&self) -> Option<CollectiveErrorCode> {
        match self {
            Self::Collective(error) => Some(error.code()),
            _ => None,
        }
    }
}

/// Convenient alias for results returned by the walk API.
pub type Result<T, E = WalkError> = core::result::Result<T, E>;
