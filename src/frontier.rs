//! In-flight walk state stored column-wise.
//!
//! Every walk carries its current vertex and output row (`position`). The
//! optional passenger columns are chosen once per run by [`Channels`]:
//! the previous vertex for second-order policies, the owning partition when
//! walks cross partitions, and the weight of the last traversed edge when the
//! graph is weighted. All columns move together; no routine touches one
//! column without the others.

use crate::error::{Result, WalkError};
use crate::{EdgeWeight, VertexId, INVALID_VERTEX};

/// Largest active set compaction accepts.
pub const MAX_ACTIVE_WALKS: usize = i32::MAX as usize;

/// Which optional passenger columns a [`Frontier`] carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Channels {
    pub previous: bool,
    pub owner: bool,
    pub weight: bool,
}

/// One walk detached from the frontier, used to move walks between partitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkRow {
    pub current: VertexId,
    pub position: usize,
    pub previous: Option<VertexId>,
    pub owner: Option<usize>,
    pub weight: Option<EdgeWeight>,
}

/// Active walks in structure-of-arrays form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontier {
    current: Vec<VertexId>,
    position: Vec<usize>,
    previous: Option<Vec<VertexId>>,
    owner: Option<Vec<usize>>,
    weight: Option<Vec<EdgeWeight>>,
}

impl Frontier {
    /// One walk per start vertex; walk `i` writes to output row `i`.
    ///
    /// `previous` starts equal to the start vertex and `owner` to `rank`.
    pub fn start(starts: &[VertexId], channels: Channels, rank: usize) -> Self {
        let n = starts.len();
        Self {
            current: starts.to_vec(),
            position: (0..n).collect(),
            previous: channels.previous.then(|| starts.to_vec()),
            owner: channels.owner.then(|| vec![rank; n]),
            weight: channels.weight.then(|| vec![0.0; n]),
        }
    }

    pub fn channels(&self) -> Channels {
        Channels {
            previous: self.previous.is_some(),
            owner: self.owner.is_some(),
            weight: self.weight.is_some(),
        }
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn current(&self) -> &[VertexId] {
        &self.current
    }

    pub fn position(&self) -> &[usize] {
        &self.position
    }

    pub fn previous(&self) -> Option<&[VertexId]> {
        self.previous.as_deref()
    }

    pub fn owner(&self) -> Option<&[usize]> {
        self.owner.as_deref()
    }

    pub fn weight(&self) -> Option<&[EdgeWeight]> {
        self.weight.as_deref()
    }

    /// `(current, previous)` keys, or `(current, current)` without a previous column.
    pub fn pairs(&self) -> Vec<(VertexId, VertexId)> {
        match &self.previous {
            Some(prev) => self.current.iter().copied().zip(prev.iter().copied()).collect(),
            None => self.current.iter().map(|&v| (v, v)).collect(),
        }
    }

    /// Move every walk one edge forward.
    ///
    /// The outgoing current vertex becomes `previous`; `weights` fills the
    /// weight column when both are present.
    pub fn advance(&mut self, next: Vec<VertexId>, weights: Option<Vec<EdgeWeight>>) {
        debug_assert_eq!(next.len(), self.len());
        let outgoing = std::mem::replace(&mut self.current, next);
        if let Some(prev) = self.previous.as_mut() {
            *prev = outgoing;
        }
        if let (Some(column), Some(weights)) = (self.weight.as_mut(), weights) {
            debug_assert_eq!(weights.len(), column.len());
            *column = weights;
        }
    }

    /// Drop walks whose current vertex is the sentinel, keeping survivors in order.
    ///
    /// Returns how many walks were removed.
    pub fn retain_live(&mut self) -> Result<usize> {
        let n = self.len();
        if n > MAX_ACTIVE_WALKS {
            return Err(WalkError::ActiveWalkOverflow { count: n });
        }
        let mut write = 0;
        for read in 0..n {
            if self.current[read] == INVALID_VERTEX {
                continue;
            }
            if write != read {
                self.move_row(read, write);
            }
            write += 1;
        }
        self.truncate(write);
        Ok(n - write)
    }

    /// Stable sort by `(current, previous)`.
    pub fn sort_by_pair(&mut self) {
        let pairs = self.pairs();
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| pairs[i]);
        self.gather(&order);
    }

    /// Detach all walks as rows.
    pub fn into_rows(self) -> Vec<WalkRow> {
        let Self {
            current,
            position,
            previous,
            owner,
            weight,
        } = self;
        (0..current.len())
            .map(|i| WalkRow {
                current: current[i],
                position: position[i],
                previous: previous.as_ref().map(|c| c[i]),
                owner: owner.as_ref().map(|c| c[i]),
                weight: weight.as_ref().map(|c| c[i]),
            })
            .collect()
    }

    /// Rebuild a frontier with the given channels from rows.
    ///
    /// Missing row fields fall back to the sentinel, zero, or this walk's current vertex.
    pub fn from_rows(rows: Vec<WalkRow>, channels: Channels) -> Self {
        let mut out = Self {
            current: Vec::with_capacity(rows.len()),
            position: Vec::with_capacity(rows.len()),
            previous: channels.previous.then(|| Vec::with_capacity(rows.len())),
            owner: channels.owner.then(|| Vec::with_capacity(rows.len())),
            weight: channels.weight.then(|| Vec::with_capacity(rows.len())),
        };
        for row in rows {
            out.current.push(row.current);
            out.position.push(row.position);
            if let Some(c) = out.previous.as_mut() {
                c.push(row.previous.unwrap_or(row.current));
            }
            if let Some(c) = out.owner.as_mut() {
                c.push(row.owner.unwrap_or(usize::MAX));
            }
            if let Some(c) = out.weight.as_mut() {
                c.push(row.weight.unwrap_or(0.0));
            }
        }
        out
    }

    fn move_row(&mut self, from: usize, to: usize) {
        self.current[to] = self.current[from];
        self.position[to] = self.position[from];
        if let Some(c) = self.previous.as_mut() {
            c[to] = c[from];
        }
        if let Some(c) = self.owner.as_mut() {
            c[to] = c[from];
        }
        if let Some(c) = self.weight.as_mut() {
            c[to] = c[from];
        }
    }

    fn truncate(&mut self, len: usize) {
        self.current.truncate(len);
        self.position.truncate(len);
        if let Some(c) = self.previous.as_mut() {
            c.truncate(len);
        }
        if let Some(c) = self.owner.as_mut() {
            c.truncate(len);
        }
        if let Some(c) = self.weight.as_mut() {
            c.truncate(len);
        }
    }

    fn gather(&mut self, order: &[usize]) {
        fn pick<T: Copy>(column: &[T], order: &[usize]) -> Vec<T> {
            order.iter().map(|&i| column[i]).collect()
        }
        self.current = pick(&self.current, order);
        self.position = pick(&self.position, order);
        if let Some(c) = self.previous.as_mut() {
            *c = pick(c, order);
        }
        if let Some(c) = self.owner.as_mut() {
            *c = pick(c, order);
        }
        if let Some(c) = self.weight.as_mut() {
            *c = pick(c, order);
        }
    }
}
