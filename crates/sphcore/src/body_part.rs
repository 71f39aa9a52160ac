//! Subsets of a body selected by cell or by particle.

use crate::cell_linked_list::CellLinkedList;
use crate::particles::ParticleStore;
use crate::vector::Vector;

/// Cells of a grid whose centers satisfy a predicate, e.g. an inflow region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BodyPartByCell {
    cells: Vec<usize>,
}

impl BodyPartByCell {
    /// Tag cells whose center satisfies `included(center, grid_spacing)`.
    pub fn new<V: Vector>(cell_linked_list: &CellLinkedList<V>, included: impl Fn(V, f32) -> bool) -> Self {
        Self {
            cells: cell_linked_list.tag_body_part_by_cell(included),
        }
    }

    pub fn from_cells(cells: Vec<usize>) -> Self {
        Self { cells }
    }

    /// Linear indices of the tagged cells.
    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    /// Particles currently binned in the tagged cells.
    pub fn particles<'a, V: Vector>(&'a self, cell_linked_list: &'a CellLinkedList<V>) -> impl Iterator<Item = usize> + 'a {
        self.cells
            .iter()
            .flat_map(move |&c| cell_linked_list.cells()[c].list_data().iter().map(|e| e.index))
    }
}

/// Real particles satisfying a predicate, e.g. a body surface layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BodyPartByParticle {
    indices: Vec<usize>,
}

impl BodyPartByParticle {
    /// Tag real particles for which `included(index, position)` holds.
    pub fn new<V: Vector>(particles: &ParticleStore<V>, included: impl Fn(usize, V) -> bool) -> Self {
        let positions = particles.positions();
        let indices = (0..particles.total_real_particles())
            .filter(|&i| included(i, positions[i]))
            .collect();
        Self { indices }
    }

    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Particle index of part slot `k`; the `get_particle_index` map of a
    /// subset search.
    #[inline]
    pub fn particle_index(&self, k: usize) -> usize {
        self.indices[k]
    }
}
