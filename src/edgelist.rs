//! Growable, concurrently appendable edge buffer.
//!
//! An [`EdgeBuffer`] is used in two phases:
//! 1. any number of threads call [`EdgeBuffer::append`] through `&self`;
//! 2. a single owner calls [`EdgeBuffer::finalize`] and then
//!    [`EdgeBuffer::consolidate_and_shuffle`] through `&mut self`.
//!
//! The phase boundary is the borrow: no `append` can be in flight once
//! `&mut self` is available. Storage is a list of fixed-capacity segments;
//! a new segment is allocated only when the current one is exhausted in the
//! middle of an append.
//!
//! Appends hold the buffer mutex only while reserving destination ranges.
//! The copy into those ranges happens after the lock is released, so copy
//! cost does not serialise producers.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::IngestError;
use crate::{EdgeId, EdgeTypeId, EdgeWeight, VertexId};

type Result<T> = core::result::Result<T, IngestError>;

/// Which optional per-edge columns a buffer carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeProperties {
    pub weight: bool,
    pub edge_id: bool,
    pub edge_type: bool,
}

impl EdgeProperties {
    /// Source and destination only.
    pub const NONE: Self = Self {
        weight: false,
        edge_id: false,
        edge_type: false,
    };

    /// Source, destination and weight.
    pub const WEIGHTED: Self = Self {
        weight: true,
        edge_id: false,
        edge_type: false,
    };

    /// Every optional column.
    pub const ALL: Self = Self {
        weight: true,
        edge_id: true,
        edge_type: true,
    };
}

/// Lifecycle of an [`EdgeBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting appends.
    Filling,
    /// Trimmed to the written length; no further appends.
    Finalized,
    /// Collapsed to one partition-local segment.
    Consolidated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Filling => "filling",
            Self::Finalized => "finalized",
            Self::Consolidated => "consolidated",
        })
    }
}

/// Positionally aligned edge columns.
///
/// Every present optional column has the same length as `src` and `dst`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeSegment {
    pub src: Vec<VertexId>,
    pub dst: Vec<VertexId>,
    pub weight: Option<Vec<EdgeWeight>>,
    pub edge_id: Option<Vec<EdgeId>>,
    pub edge_type: Option<Vec<EdgeTypeId>>,
}

impl EdgeSegment {
    pub(crate) fn with_properties(properties: EdgeProperties) -> Self {
        Self {
            src: Vec::new(),
            dst: Vec::new(),
            weight: properties.weight.then(Vec::new),
            edge_id: properties.edge_id.then(Vec::new),
            edge_type: properties.edge_type.then(Vec::new),
        }
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Which optional columns are present.
    pub fn properties(&self) -> EdgeProperties {
        EdgeProperties {
            weight: self.weight.is_some(),
            edge_id: self.edge_id.is_some(),
            edge_type: self.edge_type.is_some(),
        }
    }
}

/// Borrowed input batch for [`EdgeBuffer::append`].
#[derive(Debug, Clone, Copy)]
pub struct EdgeBatch<'a> {
    pub src: &'a [VertexId],
    pub dst: &'a [VertexId],
    pub weight: Option<&'a [EdgeWeight]>,
    pub edge_id: Option<&'a [EdgeId]>,
    pub edge_type: Option<&'a [EdgeTypeId]>,
}

impl<'a> EdgeBatch<'a> {
    /// A batch of bare `(src, dst)` pairs.
    pub fn new(src: &'a [VertexId], dst: &'a [VertexId]) -> Self {
        Self {
            src,
            dst,
            weight: None,
            edge_id: None,
            edge_type: None,
        }
    }

    pub fn with_weight(mut self, weight: &'a [EdgeWeight]) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_edge_id(mut self, edge_id: &'a [EdgeId]) -> Self {
        self.edge_id = Some(edge_id);
        self
    }

    pub fn with_edge_type(mut self, edge_type: &'a [EdgeTypeId]) -> Self {
        self.edge_type = Some(edge_type);
        self
    }

    fn properties(&self) -> EdgeProperties {
        EdgeProperties {
            weight: self.weight.is_some(),
            edge_id: self.edge_id.is_some(),
            edge_type: self.edge_type.is_some(),
        }
    }

    fn check(&self, expected: EdgeProperties) -> Result<()> {
        let n = self.src.len();
        check_len("dst", n, self.dst.len())?;
        let got = self.properties();
        for (column, want, have, len) in [
            ("weight", expected.weight, got.weight, self.weight.map(<[_]>::len)),
            ("edge_id", expected.edge_id, got.edge_id, self.edge_id.map(<[_]>::len)),
            ("edge_type", expected.edge_type, got.edge_type, self.edge_type.map(<[_]>::len)),
        ] {
            if want != have {
                return Err(IngestError::PropertyMismatch { column, expected: want });
            }
            if let Some(len) = len {
                check_len(column, n, len)?;
            }
        }
        Ok(())
    }
}

fn check_len(column: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(IngestError::LengthMismatch { column, expected, got })
    }
}

/// Plain column value with a lock-free cell to write it through `&self`.
trait AtomicCell: Copy {
    type Cell: Send + Sync;

    fn empty() -> Self::Cell;
    fn store(cell: &Self::Cell, value: Self);
    fn into_value(cell: Self::Cell) -> Self;
}

macro_rules! atomic_cell {
    ($ty:ty, $atomic:ty) => {
        impl AtomicCell for $ty {
            type Cell = $atomic;

            fn empty() -> Self::Cell {
                <$atomic>::new(0)
            }

            fn store(cell: &Self::Cell, value: Self) {
                cell.store(value, Ordering::Relaxed);
            }

            fn into_value(cell: Self::Cell) -> Self {
                cell.into_inner()
            }
        }
    };
}

atomic_cell!(usize, AtomicUsize);
atomic_cell!(u64, AtomicU64);
atomic_cell!(u32, AtomicU32);

impl AtomicCell for f32 {
    type Cell = AtomicU32;

    fn empty() -> Self::Cell {
        AtomicU32::new(0)
    }

    fn store(cell: &Self::Cell, value: Self) {
        cell.store(value.to_bits(), Ordering::Relaxed);
    }

    fn into_value(cell: Self::Cell) -> Self {
        f32::from_bits(cell.into_inner())
    }
}

/// Fixed-length column written through shared references.
///
/// Stores are relaxed: a cell is only read after its segment's last `Arc`
/// is released, which orders every prior store before the read.
struct SharedColumn<T: AtomicCell> {
    cells: Box<[T::Cell]>,
}

impl<T: AtomicCell> SharedColumn<T> {
    fn new(capacity: usize) -> Self {
        Self {
            cells: (0..capacity).map(|_| T::empty()).collect(),
        }
    }

    /// Copy `values` into `start..start + values.len()`.
    fn write(&self, start: usize, values: &[T]) {
        for (cell, &value) in self.cells[start..start + values.len()].iter().zip(values) {
            T::store(cell, value);
        }
    }

    fn into_vec(self, len: usize) -> Vec<T> {
        self.cells.into_vec().into_iter().take(len).map(T::into_value).collect()
    }
}

/// Fill-phase segment: full capacity, partially written.
struct FillSegment {
    src: SharedColumn<VertexId>,
    dst: SharedColumn<VertexId>,
    weight: Option<SharedColumn<EdgeWeight>>,
    edge_id: Option<SharedColumn<EdgeId>>,
    edge_type: Option<SharedColumn<EdgeTypeId>>,
}

impl FillSegment {
    fn new(capacity: usize, properties: EdgeProperties) -> Self {
        Self {
            src: SharedColumn::new(capacity),
            dst: SharedColumn::new(capacity),
            weight: properties.weight.then(|| SharedColumn::new(capacity)),
            edge_id: properties.edge_id.then(|| SharedColumn::new(capacity)),
            edge_type: properties.edge_type.then(|| SharedColumn::new(capacity)),
        }
    }

    /// Copy `range` rows of `batch` to `at..`; the caller owns that reservation.
    fn write(&self, at: usize, batch: &EdgeBatch<'_>, range: Range<usize>) {
        self.src.write(at, &batch.src[range.clone()]);
        self.dst.write(at, &batch.dst[range.clone()]);
        if let (Some(col), Some(vals)) = (&self.weight, batch.weight) {
            col.write(at, &vals[range.clone()]);
        }
        if let (Some(col), Some(vals)) = (&self.edge_id, batch.edge_id) {
            col.write(at, &vals[range.clone()]);
        }
        if let (Some(col), Some(vals)) = (&self.edge_type, batch.edge_type) {
            col.write(at, &vals[range]);
        }
    }

    fn freeze(self, len: usize) -> EdgeSegment {
        EdgeSegment {
            src: self.src.into_vec(len),
            dst: self.dst.into_vec(len),
            weight: self.weight.map(|c| c.into_vec(len)),
            edge_id: self.edge_id.map(|c| c.into_vec(len)),
            edge_type: self.edge_type.map(|c| c.into_vec(len)),
        }
    }
}

/// One reserved copy: `source` rows of the batch go to `segment[at..]`.
struct CopyPlan {
    segment: Arc<FillSegment>,
    at: usize,
    source: Range<usize>,
}

struct FillState {
    /// Full segments in append order.
    sealed: Vec<Arc<FillSegment>>,
    /// Segment receiving appends; `write_cursor` rows of it are reserved.
    current: Arc<FillSegment>,
    write_cursor: usize,
    phase: Phase,
}

/// Per-partition edge list fed by concurrent producers.
pub struct EdgeBuffer {
    segment_capacity: usize,
    properties: EdgeProperties,
    state: Mutex<FillState>,
    // Populated by `finalize`; only touched through `&mut self`.
    frozen: Vec<EdgeSegment>,
}

impl fmt::Debug for EdgeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeBuffer")
            .field("segment_capacity", &self.segment_capacity)
            .field("properties", &self.properties)
            .field("phase", &self.phase())
            .field("len", &self.len())
            .finish()
    }
}

impl EdgeBuffer {
    /// Create a buffer with one empty segment of `segment_capacity` edges.
    pub fn new(segment_capacity: usize, properties: EdgeProperties) -> Result<Self> {
        if segment_capacity == 0 {
            return Err(IngestError::InvalidSegmentCapacity);
        }
        Ok(Self {
            segment_capacity,
            properties,
            state: Mutex::new(FillState {
                sealed: Vec::new(),
                current: Arc::new(FillSegment::new(segment_capacity, properties)),
                write_cursor: 0,
                phase: Phase::Filling,
            }),
            frozen: Vec::new(),
        })
    }

    pub fn has_weight(&self) -> bool {
        self.properties.weight
    }

    pub fn has_edge_id(&self) -> bool {
        self.properties.edge_id
    }

    pub fn has_edge_type(&self) -> bool {
        self.properties.edge_type
    }

    pub fn properties(&self) -> EdgeProperties {
        self.properties
    }

    pub fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }

    /// Current lifecycle phase. A poisoned buffer reports the phase it was in.
    pub fn phase(&self) -> Phase {
        match self.state.lock() {
            Ok(state) => state.phase,
            Err(poisoned) => poisoned.into_inner().phase,
        }
    }

    /// Number of edges reserved so far (filling) or held (afterwards).
    pub fn len(&self) -> usize {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match state.phase {
            Phase::Filling => state.sealed.len() * self.segment_capacity + state.write_cursor,
            Phase::Finalized | Phase::Consolidated => self.frozen.iter().map(EdgeSegment::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of segments currently allocated.
    pub fn segment_count(&self) -> usize {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match state.phase {
            Phase::Filling => state.sealed.len() + 1,
            Phase::Finalized | Phase::Consolidated => self.frozen.len(),
        }
    }

    /// Copy a batch of edges into the buffer. Safe to call from many threads.
    ///
    /// The batch must carry exactly the optional columns the buffer was
    /// built with, each as long as `src`.
    pub fn append(&self, batch: EdgeBatch<'_>) -> Result<()> {
        batch.check(self.properties)?;
        let plans = self.reserve(batch.src.len())?;
        for plan in &plans {
            plan.segment.write(plan.at, &batch, plan.source.clone());
        }
        Ok(())
    }

    /// Reserve `count` rows, splitting across segment boundaries.
    fn reserve(&self, count: usize) -> Result<Vec<CopyPlan>> {
        let mut state = self.state.lock().map_err(|_| IngestError::LockPoisoned)?;
        if state.phase != Phase::Filling {
            return Err(IngestError::WrongPhase {
                operation: "append",
                phase: state.phase,
            });
        }

        let mut plans = Vec::new();
        let mut pos = 0;
        while pos < count {
            if state.write_cursor == self.segment_capacity {
                let fresh = Arc::new(FillSegment::new(self.segment_capacity, self.properties));
                let full = std::mem::replace(&mut state.current, fresh);
                state.sealed.push(full);
                state.write_cursor = 0;
                trace!(segments = state.sealed.len() + 1, "allocated edge segment");
            }
            let take = (count - pos).min(self.segment_capacity - state.write_cursor);
            let segment = Arc::clone(&state.current);
            plans.push(CopyPlan {
                segment,
                at: state.write_cursor,
                source: pos..pos + take,
            });
            pos += take;
            state.write_cursor += take;
        }
        Ok(plans)
    }

    /// Trim the last segment to the write cursor and stop accepting appends.
    pub fn finalize(&mut self) -> Result<()> {
        let state = self.state.get_mut().map_err(|_| IngestError::LockPoisoned)?;
        if state.phase != Phase::Filling {
            return Err(IngestError::WrongPhase {
                operation: "finalize",
                phase: state.phase,
            });
        }
        let capacity = self.segment_capacity;
        let empty = Arc::new(FillSegment::new(0, self.properties));
        let current = std::mem::replace(&mut state.current, empty);
        let lengths = std::iter::repeat(capacity)
            .take(state.sealed.len())
            .chain(std::iter::once(state.write_cursor));
        let mut frozen = Vec::with_capacity(state.sealed.len() + 1);
        for (segment, len) in state.sealed.drain(..).chain(std::iter::once(current)).zip(lengths) {
            let segment = Arc::try_unwrap(segment).map_err(|_| IngestError::SegmentShared)?;
            frozen.push(segment.freeze(len));
        }
        state.write_cursor = 0;
        state.phase = Phase::Finalized;
        self.frozen = frozen;
        Ok(())
    }

    /// Finalized segments in append order.
    pub fn segments(&self) -> Result<&[EdgeSegment]> {
        match self.phase() {
            Phase::Filling => Err(IngestError::WrongPhase {
                operation: "segments",
                phase: Phase::Filling,
            }),
            Phase::Finalized | Phase::Consolidated => Ok(self.frozen.as_slice()),
        }
    }

    /// Hand the consolidated, partition-local edges to graph construction.
    pub fn into_segment(mut self) -> Result<EdgeSegment> {
        let phase = self.phase();
        if phase != Phase::Consolidated {
            return Err(IngestError::WrongPhase {
                operation: "into_segment",
                phase,
            });
        }
        Ok(self
            .frozen
            .pop()
            .unwrap_or_else(|| EdgeSegment::with_properties(self.properties)))
    }

    pub(crate) fn frozen_mut(&mut self) -> &mut Vec<EdgeSegment> {
        &mut self.frozen
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) -> Result<()> {
        let state = self.state.get_mut().map_err(|_| IngestError::LockPoisoned)?;
        state.phase = phase;
        Ok(())
    }
}
