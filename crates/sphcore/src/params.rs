//! Resolution and search configuration of one SPH body.

use serde::{Deserialize, Serialize};

use crate::cell_linked_list::CellLinkedList;
use crate::error::{Error, Result};
use crate::kernel::{Kernel, KernelKind};
use crate::mesh::BoundingBox;
use crate::multilevel::{LevelScope, MultilevelCellLinkedList};
use crate::search::{ExecutionPolicy, NeighborSearch};
use crate::vector::Vector;

/// Upper limit on grid levels; level `l` has spacing `2^l` times the finest.
pub const MAX_LEVELS: usize = 16;

/// Body resolution and neighbor search parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphParams {
    /// Reference particle spacing (m).
    pub particle_spacing: f32,
    /// Smoothing length over particle spacing.
    pub smoothing_length_ratio: f32,
    /// Kernel shape.
    pub kernel: KernelKind,
    /// Rest density (kg/m^3).
    pub rest_density: f32,
    /// Number of grid levels; 1 selects the single-resolution grid.
    pub total_levels: usize,
    /// Levels scanned by multi-level searches.
    pub level_scope: LevelScope,
    /// Sequential or rayon-parallel loops.
    pub execution: ExecutionPolicy,
    /// Buffer slots reserved per real particle (0 disables the buffer).
    pub buffer_size_factor: f32,
}

impl Default for SphParams {
    fn default() -> Self {
        Self {
            particle_spacing: 0.1,
            smoothing_length_ratio: 1.3,
            kernel: KernelKind::WendlandC2,
            rest_density: 1000.0,
            total_levels: 1,
            level_scope: LevelScope::AllLevels,
            execution: ExecutionPolicy::Parallel,
            buffer_size_factor: 0.0,
        }
    }
}

fn positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParam(format!("{} must be positive and finite, got {}", name, value)))
    }
}

impl SphParams {
    pub fn validate(&self) -> Result<()> {
        positive("particle_spacing", self.particle_spacing)?;
        positive("smoothing_length_ratio", self.smoothing_length_ratio)?;
        positive("rest_density", self.rest_density)?;
        if !(1..=MAX_LEVELS).contains(&self.total_levels) {
            return Err(Error::InvalidParam(format!(
                "total_levels must be in 1..={}, got {}",
                MAX_LEVELS, self.total_levels
            )));
        }
        if !(self.buffer_size_factor.is_finite() && self.buffer_size_factor >= 0.0) {
            return Err(Error::InvalidParam(format!(
                "buffer_size_factor must be non-negative, got {}",
                self.buffer_size_factor
            )));
        }
        Ok(())
    }

    pub fn smoothing_length(&self) -> f32 {
        self.particle_spacing * self.smoothing_length_ratio
    }

    /// Particle volume implied by the reference spacing.
    pub fn particle_volume(&self, dimension: usize) -> f32 {
        self.particle_spacing.powi(dimension as i32)
    }

    pub fn kernel(&self, dimension: usize) -> Result<Kernel> {
        Kernel::new(self.kernel, self.smoothing_length(), dimension)
    }

    /// Buffer slots to reserve for `total_real` particles.
    pub fn buffer_size(&self, total_real: usize) -> usize {
        (self.buffer_size_factor * total_real as f32).ceil() as usize
    }

    /// Spatial index for a body inside `bounds`.
    ///
    /// The finest grid spacing equals the reference cutoff radius.
    pub fn create_neighbor_search<V: Vector>(&self, bounds: BoundingBox<V>) -> Result<Box<dyn NeighborSearch<V>>> {
        self.validate()?;
        let kernel = self.kernel(V::DIM)?;
        let spacing = kernel.cutoff_radius();
        if self.total_levels == 1 {
            Ok(Box::new(CellLinkedList::new(bounds, spacing, self.execution)?))
        } else {
            let grid = MultilevelCellLinkedList::new(bounds, spacing, self.total_levels, kernel, self.execution)?
                .with_scope(self.level_scope.clone());
            Ok(Box::new(grid))
        }
    }
}
