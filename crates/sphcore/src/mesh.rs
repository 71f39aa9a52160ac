//! Uniform Cartesian cell mesh shared by the cell linked lists.
//!
//! The mesh always has three integer axes. In 2D the z axis has exactly one
//! cell. Linear cell indices are row-major with x varying fastest:
//! `(k * ny + j) * nx + i`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vector::Vector;

/// Cells added around the domain bounds on every side.
pub const DEFAULT_BUFFER_WIDTH: usize = 2;

/// Integer cell coordinates `[i, j, k]`.
pub type CellIndex = [usize; 3];

/// Axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox<V> {
    pub lower: V,
    pub upper: V,
}

impl<V: Vector> BoundingBox<V> {
    pub fn new(lower: V, upper: V) -> Self {
        Self { lower, upper }
    }

    /// Smallest box containing every point, or `None` for an empty slice.
    pub fn from_points(points: &[V]) -> Option<Self> {
        let first = *points.first()?;
        Some(points.iter().fold(Self::new(first, first), |b, &p| {
            Self::new(b.lower.min(p), b.upper.max(p))
        }))
    }

    pub fn extent(&self) -> V {
        self.upper - self.lower
    }

    pub fn contains(&self, point: V) -> bool {
        (0..V::DIM).all(|a| point.axis(a) >= self.lower.axis(a) && point.axis(a) <= self.upper.axis(a))
    }
}

/// Geometry of a uniform cell grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh<V> {
    /// Lower corner of cell `[0, 0, 0]`, buffer cells included.
    lower_bound: V,
    grid_spacing: f32,
    buffer_width: usize,
    number_of_cells: [usize; 3],
}

impl<V: Vector> Mesh<V> {
    /// Mesh covering `bounds` with `buffer_width` extra cells on each side.
    pub fn new(bounds: BoundingBox<V>, grid_spacing: f32, buffer_width: usize) -> Result<Self> {
        if !(grid_spacing.is_finite() && grid_spacing > 0.0) {
            return Err(Error::InvalidParam(format!(
                "grid spacing must be positive and finite, got {}",
                grid_spacing
            )));
        }
        let extent = bounds.extent();
        for a in 0..V::DIM {
            let e = extent.axis(a);
            if !(e.is_finite() && e >= 0.0) {
                return Err(Error::InvalidParam(format!(
                    "bounding box extent along axis {} must be finite and non-negative, got {}",
                    a, e
                )));
            }
        }

        let buffer = buffer_width as f32 * grid_spacing;
        let lower_bound = bounds.lower - V::splat(buffer);
        let mut number_of_cells = [1usize; 3];
        for (a, n) in number_of_cells.iter_mut().enumerate().take(V::DIM) {
            let inner = ((extent.axis(a) / grid_spacing).ceil() as usize).max(1);
            *n = inner + 2 * buffer_width;
        }

        Ok(Self {
            lower_bound,
            grid_spacing,
            buffer_width,
            number_of_cells,
        })
    }

    /// Mesh with the default two-cell buffer.
    pub fn with_default_buffer(bounds: BoundingBox<V>, grid_spacing: f32) -> Result<Self> {
        Self::new(bounds, grid_spacing, DEFAULT_BUFFER_WIDTH)
    }

    pub fn grid_spacing(&self) -> f32 {
        self.grid_spacing
    }

    pub fn buffer_width(&self) -> usize {
        self.buffer_width
    }

    pub fn lower_bound(&self) -> V {
        self.lower_bound
    }

    /// Cells per axis; the z entry is 1 in 2D.
    pub fn number_of_cells(&self) -> [usize; 3] {
        self.number_of_cells
    }

    pub fn total_cells(&self) -> usize {
        self.number_of_cells.iter().product()
    }

    /// Cell containing `position`. Positions outside the mesh map to the
    /// nearest edge cell.
    #[inline]
    pub fn cell_index_from_position(&self, position: V) -> CellIndex {
        let mut cell = [0usize; 3];
        for (a, c) in cell.iter_mut().enumerate().take(V::DIM) {
            let f = ((position.axis(a) - self.lower_bound.axis(a)) / self.grid_spacing).floor();
            let max = (self.number_of_cells[a] - 1) as f32;
            *c = f.clamp(0.0, max) as usize;
        }
        cell
    }

    #[inline]
    pub fn linear_index(&self, cell: CellIndex) -> usize {
        let [nx, ny, _] = self.number_of_cells;
        (cell[2] * ny + cell[1]) * nx + cell[0]
    }

    #[inline]
    pub fn cell_index_from_linear(&self, linear: usize) -> CellIndex {
        let [nx, ny, _] = self.number_of_cells;
        [linear % nx, (linear / nx) % ny, linear / (nx * ny)]
    }

    /// Center of a cell in world coordinates.
    pub fn cell_position(&self, cell: CellIndex) -> V {
        let offset = [
            (cell[0] as f32 + 0.5) * self.grid_spacing,
            (cell[1] as f32 + 0.5) * self.grid_spacing,
            (cell[2] as f32 + 0.5) * self.grid_spacing,
        ];
        self.lower_bound + V::from_xyz(offset)
    }

    /// Inclusive per-axis index ranges of the cells within `depth` rings of
    /// `cell`, clamped to the mesh. In 2D the z range is always `[0, 0]`.
    #[inline]
    pub fn neighbor_range(&self, cell: CellIndex, depth: usize) -> [(usize, usize); 3] {
        let mut range = [(0, 0); 3];
        for (a, r) in range.iter_mut().enumerate() {
            let hi = cell[a].saturating_add(depth).min(self.number_of_cells[a] - 1);
            *r = (cell[a].saturating_sub(depth), hi);
        }
        range
    }
}

/// Spread the low 21 bits of `x` so consecutive bits land 3 apart.
fn interleave_3(mut x: u64) -> u64 {
    x &= 0x1fffff;
    x = (x | x << 32) & 0x1f00000000ffff;
    x = (x | x << 16) & 0x1f0000ff0000ff;
    x = (x | x << 8) & 0x100f00f00f00f00f;
    x = (x | x << 4) & 0x10c30c30c30c30c3;
    x = (x | x << 2) & 0x1249249249249249;
    x
}

/// Z-order key of a cell; spatially close cells get close keys.
pub fn morton_code(cell: CellIndex) -> u64 {
    interleave_3(cell[0] as u64) | (interleave_3(cell[1] as u64) << 1) | (interleave_3(cell[2] as u64) << 2)
}
