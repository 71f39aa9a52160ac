//! Particle storage and cell-linked-list neighbor search for SPH.
//!
//! Each step rebuilds the grid from current positions, then searches every
//! particle's neighborhood in parallel. Physics kernels consume the resulting
//! `ParticleConfiguration` and write back into named particle variables.
//!
//! # Example
//!
//! ```
//! use glam::Vec2;
//! use sphcore::{BoundingBox, InnerNeighbors, NeighborSearch, ParticleStore, SphParams};
//!
//! let params = SphParams::default();
//! let dp = params.particle_spacing;
//! let positions: Vec<Vec2> = (0..10)
//!     .flat_map(|j| (0..10).map(move |i| Vec2::new(i as f32 + 0.5, j as f32 + 0.5) * dp))
//!     .collect();
//! let n = positions.len();
//! let particles = ParticleStore::from_generated(positions, vec![dp * dp; n], params.rest_density).unwrap();
//!
//! let bounds = BoundingBox::new(Vec2::ZERO, Vec2::splat(10.0 * dp));
//! let mut search = params.create_neighbor_search(bounds).unwrap();
//! search.update_cell_lists(&particles);
//!
//! let builder = InnerNeighbors::new(params.kernel(2).unwrap());
//! let mut configuration = Vec::new();
//! search.search_inner(&particles, &mut configuration, &builder);
//! assert_eq!(configuration.len(), n);
//! assert!(configuration.iter().all(|nbh| !nbh.is_empty()));
//! ```

pub mod body_part;
pub mod cell_linked_list;
pub mod error;
pub mod kernel;
pub mod mesh;
pub mod multilevel;
pub mod neighbor_builder;
pub mod neighborhood;
pub mod params;
pub mod particles;
pub mod search;
pub mod vector;

pub use body_part::{BodyPartByCell, BodyPartByParticle};
pub use cell_linked_list::{CellLinkedList, CellList, ListData, SplitCellLists};
pub use error::{Error, Result};
pub use glam::{Mat2, Mat3, Vec2, Vec3};
pub use kernel::{Kernel, KernelKind};
pub use mesh::{morton_code, BoundingBox, Mesh};
pub use multilevel::{LevelScope, MultilevelCellLinkedList};
pub use neighbor_builder::{
    AdaptiveInnerNeighbors, AdaptiveSearchDepth, ContactNeighbors, InnerNeighbors, NeighborBuilder,
};
pub use neighborhood::{NeighborRef, Neighborhood, NeighborhoodStats, ParticleConfiguration};
pub use params::SphParams;
pub use particles::variable::{VariableData, VariableKind, VariableType};
pub use particles::ParticleStore;
pub use search::{ExecutionPolicy, NeighborSearch};
pub use vector::Vector;
