//! Spatial indexing abstractions for person neighborhood queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from current positions.
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError>;

    /// Visit neighbors of `agent_idx` within the provided squared radius.
    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );

    /// Visit every unordered pair `(i, j)` with `i < j` within the squared radius.
    ///
    /// Pairs are produced in a deterministic order for a given rebuild, so
    /// callers that consume randomness per pair stay reproducible.
    fn pairs_within(&self, radius_sq: f32, visitor: &mut dyn FnMut(usize, usize, OrderedFloat<f32>));
}

/// Uniform grid bucketing positions into square cells keyed by integer coordinates.
///
/// Positions are unbounded (Brownian walkers drift freely), so cells live in a
/// hash map rather than a dense array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing positions.
    pub cell_size: f32,
    #[serde(skip)]
    cells: HashMap<(i32, i32), Vec<usize>>,
    #[serde(skip)]
    positions: Vec<(f32, f32)>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            positions: Vec::new(),
        }
    }

    /// Number of positions currently indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    fn cell_of(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Visit indexed entries in the cells overlapping the query disc, in a
    /// fixed cell scan order (row-major over the covered cell range).
    fn scan_cells(&self, center: (f32, f32), radius: f32, visitor: &mut dyn FnMut(usize)) {
        let (min_cx, min_cy) = self.cell_of(center.0 - radius, center.1 - radius);
        let (max_cx, max_cy) = self.cell_of(center.0 + radius, center.1 + radius);
        for cy in min_cy..=max_cy {
            for cx in min_cx..=max_cx {
                if let Some(bucket) = self.cells.get(&(cx, cy)) {
                    for &idx in bucket {
                        visitor(idx);
                    }
                }
            }
        }
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError> {
        if self.cell_size <= 0.0 || !self.cell_size.is_finite() {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        self.cells.clear();
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        for (idx, &(x, y)) in positions.iter().enumerate() {
            let cell = self.cell_of(x, y);
            self.cells.entry(cell).or_default().push(idx);
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        let Some(&center) = self.positions.get(agent_idx) else {
            return;
        };
        let radius = radius_sq.max(0.0).sqrt();
        self.scan_cells(center, radius, &mut |other| {
            if other == agent_idx {
                return;
            }
            let (ox, oy) = self.positions[other];
            let dx = ox - center.0;
            let dy = oy - center.1;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq <= radius_sq {
                visitor(other, OrderedFloat(dist_sq));
            }
        });
    }

    fn pairs_within(
        &self,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, usize, OrderedFloat<f32>),
    ) {
        for idx in 0..self.positions.len() {
            self.neighbors_within(idx, radius_sq, &mut |other, dist_sq| {
                if other > idx {
                    visitor(idx, other, dist_sq);
                }
            });
        }
    }
}
