//! Neighbor search strategy shared by the single- and multi-resolution grids.

use serde::{Deserialize, Serialize};

use crate::cell_linked_list::{CellLinkedList, ListData};
use crate::neighbor_builder::{single_resolution_depth, NeighborBuilder};
use crate::neighborhood::ParticleConfiguration;
use crate::particles::ParticleStore;
use crate::vector::Vector;

/// Loop flavour for population, search and sequencing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionPolicy {
    Sequential,
    /// Rayon fork-join over particle indices.
    #[default]
    Parallel,
}

/// Spatial index over one body's particles.
///
/// Implementations are selected once at construction; see
/// `SphParams::create_neighbor_search`.
pub trait NeighborSearch<V: Vector>: Send + Sync {
    /// Rebuild from the real particles of `particles`.
    fn update_cell_lists(&mut self, particles: &ParticleStore<V>);

    /// Inner-relation search for every real particle of `particles`.
    fn search_inner(
        &self,
        particles: &ParticleStore<V>,
        configuration: &mut ParticleConfiguration<V>,
        builder: &dyn NeighborBuilder<V>,
    );

    fn find_nearest(&self, position: V) -> Option<ListData<V>>;

    /// Sort keys for `ParticleStore::sort_particles_by_sequence`.
    fn computing_sequence(&self, particles: &ParticleStore<V>) -> Vec<u64>;

    fn name(&self) -> &'static str;
}

impl<V: Vector> NeighborSearch<V> for CellLinkedList<V> {
    fn update_cell_lists(&mut self, particles: &ParticleStore<V>) {
        CellLinkedList::update_cell_lists(self, particles.positions(), particles.total_real_particles());
    }

    fn search_inner(
        &self,
        particles: &ParticleStore<V>,
        configuration: &mut ParticleConfiguration<V>,
        builder: &dyn NeighborBuilder<V>,
    ) {
        self.search_neighbors_by_particles(
            particles.total_real_particles(),
            particles.positions(),
            configuration,
            |k| k,
            single_resolution_depth,
            builder,
        );
    }

    fn find_nearest(&self, position: V) -> Option<ListData<V>> {
        CellLinkedList::find_nearest(self, position)
    }

    fn computing_sequence(&self, particles: &ParticleStore<V>) -> Vec<u64> {
        CellLinkedList::computing_sequence(self, particles.positions(), particles.total_real_particles())
    }

    fn name(&self) -> &'static str {
        "cell linked list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, KernelKind};
    use crate::mesh::BoundingBox;
    use crate::neighbor_builder::InnerNeighbors;
    use glam::Vec2;

    #[test]
    fn test_policy_default_is_parallel() {
        assert_eq!(ExecutionPolicy::default(), ExecutionPolicy::Parallel);
        let json = serde_json::to_string(&ExecutionPolicy::Sequential).unwrap();
        assert_eq!(json, "\"Sequential\"");
    }

    #[test]
    fn test_trait_object_search() {
        let store = ParticleStore::from_generated(
            vec![Vec2::new(0.0, 0.0), Vec2::new(0.5, 0.0), Vec2::new(3.0, 3.0)],
            vec![0.25; 3],
            1.0,
        )
        .unwrap();
        let grid = CellLinkedList::new(BoundingBox::new(Vec2::ZERO, Vec2::splat(3.0)), 1.0, ExecutionPolicy::Sequential)
            .unwrap();
        let mut search: Box<dyn NeighborSearch<Vec2>> = Box::new(grid);
        search.update_cell_lists(&store);

        let kernel = Kernel::new(KernelKind::WendlandC2, 0.5, 2).unwrap();
        let mut config = Vec::new();
        search.search_inner(&store, &mut config, &InnerNeighbors::new(kernel));
        assert_eq!(config.len(), 3);
        assert_eq!(config[0].j(), &[1]);
        assert_eq!(config[1].j(), &[0]);
        assert!(config[2].is_empty());
        assert_eq!(search.find_nearest(Vec2::new(2.9, 2.9)).map(|e| e.index), Some(2));
        assert_eq!(search.computing_sequence(&store).len(), 3);
    }
}
