//! Consolidation of a finalized [`EdgeBuffer`] into one partition-local segment.

use tracing::{debug, info, instrument, warn};

use crate::edgelist::{EdgeBuffer, EdgeProperties, EdgeSegment, Phase};
use crate::error::IngestError;
use crate::partition::{Collective, Partitioning};
use crate::{EdgeId, EdgeTypeId, EdgeWeight, VertexId};

/// One edge with its optional columns, moved as a unit during redistribution.
#[derive(Debug, Clone, Copy)]
struct EdgeRow {
    src: VertexId,
    dst: VertexId,
    weight: Option<EdgeWeight>,
    edge_id: Option<EdgeId>,
    edge_type: Option<EdgeTypeId>,
}

impl EdgeSegment {
    fn reserve(&mut self, additional: usize) {
        self.src.reserve(additional);
        self.dst.reserve(additional);
        if let Some(c) = self.weight.as_mut() {
            c.reserve(additional);
        }
        if let Some(c) = self.edge_id.as_mut() {
            c.reserve(additional);
        }
        if let Some(c) = self.edge_type.as_mut() {
            c.reserve(additional);
        }
    }

    /// Append `other`'s rows after this segment's rows, column by column.
    fn concat(&mut self, other: EdgeSegment) {
        self.src.extend(other.src);
        self.dst.extend(other.dst);
        concat_optional(&mut self.weight, other.weight);
        concat_optional(&mut self.edge_id, other.edge_id);
        concat_optional(&mut self.edge_type, other.edge_type);
    }

    fn into_rows(self) -> Vec<EdgeRow> {
        let EdgeSegment {
            src,
            dst,
            weight,
            edge_id,
            edge_type,
        } = self;
        let mut weight = weight.map(Vec::into_iter);
        let mut edge_id = edge_id.map(Vec::into_iter);
        let mut edge_type = edge_type.map(Vec::into_iter);
        src.into_iter()
            .zip(dst)
            .map(|(src, dst)| EdgeRow {
                src,
                dst,
                weight: weight.as_mut().and_then(Iterator::next),
                edge_id: edge_id.as_mut().and_then(Iterator::next),
                edge_type: edge_type.as_mut().and_then(Iterator::next),
            })
            .collect()
    }

    fn from_rows(rows: Vec<EdgeRow>, properties: EdgeProperties) -> Self {
        let mut out = Self::with_properties(properties);
        out.src.reserve(rows.len());
        out.dst.reserve(rows.len());
        for row in rows {
            out.src.push(row.src);
            out.dst.push(row.dst);
            push_optional(&mut out.weight, row.weight);
            push_optional(&mut out.edge_id, row.edge_id);
            push_optional(&mut out.edge_type, row.edge_type);
        }
        out
    }
}

fn concat_optional<T>(column: &mut Option<Vec<T>>, other: Option<Vec<T>>) {
    if let (Some(column), Some(other)) = (column.as_mut(), other) {
        column.extend(other);
    }
}

fn push_optional<T>(column: &mut Option<Vec<T>>, value: Option<T>) {
    if let (Some(column), Some(value)) = (column.as_mut(), value) {
        column.push(value);
    }
}

impl EdgeBuffer {
    /// Collapse all segments into one and move every edge to the partition that owns it.
    ///
    /// Segments are concatenated in append order; no sorting happens. The
    /// owning vertex is the source, or the destination when
    /// `store_transposed` is set. All optional columns travel with their edge.
    ///
    /// This is a collective: every partition must call it. An edge whose
    /// owning vertex lies outside `partitioning` fails the call on every
    /// partition; the partition holding it reports
    /// [`IngestError::VertexOutOfRange`] and the buffer is left empty.
    #[instrument(skip_all, fields(rank = comm.rank(), transposed = store_transposed))]
    pub fn consolidate_and_shuffle<C: Collective>(
        &mut self,
        comm: &C,
        partitioning: &Partitioning,
        store_transposed: bool,
    ) -> Result<(), IngestError> {
        let phase = self.phase();
        if phase == Phase::Filling {
            return Err(IngestError::WrongPhase {
                operation: "consolidate_and_shuffle",
                phase,
            });
        }

        let properties = self.properties();
        let frozen = self.frozen_mut();
        let segment_count = frozen.len();
        let mut merged = if frozen.is_empty() {
            EdgeSegment::with_properties(properties)
        } else {
            frozen.remove(0)
        };
        if segment_count > 1 {
            let total: usize = merged.len() + frozen.iter().map(EdgeSegment::len).sum::<usize>();
            merged.reserve(total - merged.len());
            for segment in frozen.drain(..) {
                merged.concat(segment);
            }
            debug!(segments = segment_count, edges = total, "merged edge segments");
        }
        frozen.clear();

        let major = |row: &EdgeRow| if store_transposed { row.dst } else { row.src };
        let rows = merged.into_rows();
        let before = rows.len();
        let unowned = rows
            .iter()
            .map(major)
            .find(|&v| partitioning.check_vertex(v).is_err());
        if let Some(vertex) = unowned {
            warn!(vertex, "edge endpoint has no owning partition");
        }
        // Peers are already waiting in the shuffle, so a bad row still has to
        // go through it; the collective then fails on every partition.
        let shuffled = comm.shuffle(rows, |row| partitioning.owner_of(major(row)).unwrap_or(usize::MAX));
        if let Some(vertex) = unowned {
            return Err(IngestError::VertexOutOfRange {
                vertex,
                vertex_count: partitioning.vertex_count(),
            });
        }
        let local = EdgeSegment::from_rows(shuffled?, properties);

        info!(sent = before, received = local.len(), "consolidated edge buffer");
        self.frozen_mut().push(local);
        self.set_phase(Phase::Consolidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgelist::EdgeBatch;
    use crate::partition::SoloCollective;

    fn filled(capacity: usize, n: usize) -> EdgeBuffer {
        let mut buf = EdgeBuffer::new(capacity, EdgeProperties::ALL).unwrap();
        let src: Vec<VertexId> = (0..n).map(|i| i % 7).collect();
        let dst: Vec<VertexId> = (0..n).map(|i| (i * 3) % 7).collect();
        let wgt: Vec<EdgeWeight> = (0..n).map(|i| i as f32 * 0.5).collect();
        let ids: Vec<EdgeId> = (0..n as u64).collect();
        let types: Vec<EdgeTypeId> = (0..n as u32).map(|i| i % 2).collect();
        buf.append(
            EdgeBatch::new(&src, &dst)
                .with_weight(&wgt)
                .with_edge_id(&ids)
                .with_edge_type(&types),
        )
        .unwrap();
        buf.finalize().unwrap();
        buf
    }

    #[test]
    fn merges_segments_in_append_order() {
        let mut buf = filled(4, 11);
        assert_eq!(buf.segment_count(), 3);
        buf.consolidate_and_shuffle(&SoloCollective, &Partitioning::single(7), false)
            .unwrap();
        assert_eq!(buf.segment_count(), 1);
        let seg = buf.into_segment().unwrap();
        assert_eq!(seg.edge_id, Some((0..11).collect()));
        assert_eq!(seg.src.len(), 11);
        assert_eq!(seg.weight.as_ref().map(Vec::len), Some(11));
        assert_eq!(seg.edge_type.as_ref().map(Vec::len), Some(11));
    }

    #[test]
    fn single_partition_is_idempotent() {
        let mut buf = filled(5, 13);
        let parts = Partitioning::single(7);
        buf.consolidate_and_shuffle(&SoloCollective, &parts, true).unwrap();
        let once = buf.segments().unwrap().to_vec();
        buf.consolidate_and_shuffle(&SoloCollective, &parts, true).unwrap();
        assert_eq!(buf.segments().unwrap(), once.as_slice());
    }

    #[test]
    fn requires_finalize_first() {
        let mut buf = EdgeBuffer::new(4, EdgeProperties::NONE).unwrap();
        let err = buf
            .consolidate_and_shuffle(&SoloCollective, &Partitioning::single(1), false)
            .unwrap_err();
        assert!(matches!(err, IngestError::WrongPhase { phase: Phase::Filling, .. }));
    }

    #[test]
    fn unowned_vertex_is_named_in_the_error() {
        // Sources run 0..7, so vertex 3 is the first without an owner.
        let mut buf = filled(8, 8);
        let err = buf
            .consolidate_and_shuffle(&SoloCollective, &Partitioning::single(3), false)
            .unwrap_err();
        assert_eq!(err, IngestError::VertexOutOfRange { vertex: 3, vertex_count: 3 });

        // Destinations are (i * 3) % 7: 0, 3, ...
        let mut buf = filled(8, 8);
        let err = buf
            .consolidate_and_shuffle(&SoloCollective, &Partitioning::single(3), true)
            .unwrap_err();
        assert_eq!(err, IngestError::VertexOutOfRange { vertex: 3, vertex_count: 3 });
    }
}
