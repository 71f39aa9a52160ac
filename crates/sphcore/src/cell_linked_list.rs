//! Cell linked list: particles binned into a uniform mesh for neighbor search.
//!
//! A step goes through three phases, enforced by receiver mutability:
//! 1. population with `insert_index` (`&self`, safe from many threads),
//! 2. `build_cell_data` (`&mut self`) turning index lists into search data,
//! 3. searches (`&self`, parallel over the querying particles).

use std::sync::{Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;

use crate::error::Result;
use crate::mesh::{morton_code, BoundingBox, CellIndex, Mesh, DEFAULT_BUFFER_WIDTH};
use crate::neighbor_builder::NeighborBuilder;
use crate::neighborhood::{ensure_configuration_size, Neighborhood, ParticleConfiguration};
use crate::search::ExecutionPolicy;
use crate::vector::Vector;

/// Non-empty cells grouped by `(i % 3, j % 3, k % 3)`. Two cells of one
/// group are never adjacent, so a depth-1 update of all particles in a group
/// can run in parallel without two cells touching the same neighbor.
pub type SplitCellLists = Vec<Vec<usize>>;

/// Number of split groups for a mesh of `dim` dimensions.
pub fn split_cell_lists_len(dim: usize) -> usize {
    3usize.pow(dim as u32)
}

/// Search entry: particle index and its position at build time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListData<V> {
    pub index: usize,
    pub position: V,
}

/// Contents of one cell.
#[derive(Debug, Default)]
pub struct CellList<V> {
    /// Appended concurrently during population.
    indices: Mutex<Vec<usize>>,
    /// Built from `indices` once population is done.
    list_data: Vec<ListData<V>>,
}

impl<V: Vector> CellList<V> {
    fn lock(&self) -> MutexGuard<'_, Vec<usize>> {
        self.indices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn indices_mut(&mut self) -> &mut Vec<usize> {
        self.indices.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear(&mut self) {
        self.indices_mut().clear();
        self.list_data.clear();
    }

    /// Snapshot of the particle indices inserted this step.
    pub fn indices(&self) -> Vec<usize> {
        self.lock().clone()
    }

    pub fn list_data(&self) -> &[ListData<V>] {
        &self.list_data
    }

    pub fn is_empty(&self) -> bool {
        self.list_data.is_empty() && self.lock().is_empty()
    }
}

/// Single-resolution cell linked list.
#[derive(Debug)]
pub struct CellLinkedList<V> {
    mesh: Mesh<V>,
    cells: Vec<CellList<V>>,
    policy: ExecutionPolicy,
}

impl<V: Vector> CellLinkedList<V> {
    /// Grid over `bounds` with a two-cell buffer. `grid_spacing` must be at
    /// least the largest cutoff radius searched with depth 1.
    pub fn new(bounds: BoundingBox<V>, grid_spacing: f32, policy: ExecutionPolicy) -> Result<Self> {
        let mesh = Mesh::new(bounds, grid_spacing, DEFAULT_BUFFER_WIDTH)?;
        Ok(Self::with_mesh(mesh, policy))
    }

    pub fn with_mesh(mesh: Mesh<V>, policy: ExecutionPolicy) -> Self {
        let total = mesh.total_cells();
        let cells = (0..total).map(|_| CellList::default()).collect();
        log::debug!(
            "cell linked list: {:?} cells, spacing {}",
            mesh.number_of_cells(),
            mesh.grid_spacing()
        );
        Self { mesh, cells, policy }
    }

    pub fn mesh(&self) -> &Mesh<V> {
        &self.mesh
    }

    pub fn grid_spacing(&self) -> f32 {
        self.mesh.grid_spacing()
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ExecutionPolicy) {
        self.policy = policy;
    }

    pub fn cells(&self) -> &[CellList<V>] {
        &self.cells
    }

    /// Cell at integer coordinates.
    pub fn cell(&self, cell: CellIndex) -> &CellList<V> {
        &self.cells[self.mesh.linear_index(cell)]
    }

    /// Empty every cell, keeping allocations.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Record `index` in the cell containing `position`. Safe to call from
    /// many threads; order within a cell is unspecified.
    #[inline]
    pub fn insert_index(&self, index: usize, position: V) {
        let linear = self.mesh.linear_index(self.mesh.cell_index_from_position(position));
        self.cells[linear].lock().push(index);
    }

    /// Append a search entry directly, bypassing the index lists. Used for
    /// ghost particles after `build_cell_data`.
    pub fn insert_list_data_entry(&mut self, index: usize, position: V) {
        let linear = self.mesh.linear_index(self.mesh.cell_index_from_position(position));
        self.cells[linear].list_data.push(ListData { index, position });
    }

    /// Convert every cell's index list into search entries.
    ///
    /// Entries added earlier by `insert_list_data_entry` are discarded.
    pub fn build_cell_data(&mut self, positions: &[V]) {
        for cell in &mut self.cells {
            let CellList { indices, list_data } = cell;
            let indices = indices.get_mut().unwrap_or_else(PoisonError::into_inner);
            list_data.clear();
            list_data.extend(indices.iter().map(|&index| ListData {
                index,
                position: positions[index],
            }));
        }
    }

    /// Full rebuild from the first `total_real` positions.
    pub fn update_cell_lists(&mut self, positions: &[V], total_real: usize) {
        self.clear();
        let positions_real = &positions[..total_real];
        match self.policy {
            ExecutionPolicy::Parallel => {
                let this = &*self;
                positions_real
                    .par_iter()
                    .enumerate()
                    .for_each(|(i, &p)| this.insert_index(i, p));
            }
            ExecutionPolicy::Sequential => {
                for (i, &p) in positions_real.iter().enumerate() {
                    let linear = self.mesh.linear_index(self.mesh.cell_index_from_position(p));
                    self.cells[linear].indices_mut().push(i);
                }
            }
        }
        self.build_cell_data(positions);
    }

    /// Empty every group, keeping allocations.
    pub fn clear_split_cell_lists(split_cell_lists: &mut SplitCellLists) {
        for group in split_cell_lists.iter_mut() {
            group.clear();
        }
    }

    /// Regroup the non-empty cells by their position modulo 3 along each axis.
    pub fn update_split_cell_lists(&self, split_cell_lists: &mut SplitCellLists) {
        split_cell_lists.resize_with(split_cell_lists_len(V::DIM), Vec::new);
        Self::clear_split_cell_lists(split_cell_lists);
        for (l, cell) in self.cells.iter().enumerate() {
            if cell.list_data.is_empty() {
                continue;
            }
            let [i, j, k] = self.mesh.cell_index_from_linear(l);
            split_cell_lists[i % 3 + 3 * (j % 3) + 9 * (k % 3)].push(l);
        }
    }

    /// Entry closest to `position` in its cell and the adjacent ring.
    pub fn find_nearest(&self, position: V) -> Option<ListData<V>> {
        let mut nearest: Option<(f32, ListData<V>)> = None;
        self.for_each_cell_in_range(self.mesh.cell_index_from_position(position), 1, |cell| {
            for entry in cell.list_data() {
                let d = (entry.position - position).length_squared();
                if nearest.map_or(true, |(best, _)| d < best) {
                    nearest = Some((d, *entry));
                }
            }
        });
        nearest.map(|(_, entry)| entry)
    }

    /// Morton key of each real particle's cell.
    pub fn computing_sequence(&self, positions: &[V], total_real: usize) -> Vec<u64> {
        let key = |p: &V| morton_code(self.mesh.cell_index_from_position(*p));
        let positions_real = &positions[..total_real];
        match self.policy {
            ExecutionPolicy::Parallel => positions_real.par_iter().map(key).collect(),
            ExecutionPolicy::Sequential => positions_real.iter().map(key).collect(),
        }
    }

    /// Linear indices of cells whose center satisfies `included(center, spacing)`.
    pub fn tag_body_part_by_cell(&self, included: impl Fn(V, f32) -> bool) -> Vec<usize> {
        let spacing = self.mesh.grid_spacing();
        (0..self.cells.len())
            .filter(|&l| included(self.mesh.cell_position(self.mesh.cell_index_from_linear(l)), spacing))
            .collect()
    }

    /// Cells in a three-layer band around the lower and the upper face of
    /// `bounds` normal to `axis`. Returns `[lower, upper]`.
    pub fn tag_bounding_cells(&self, bounds: &BoundingBox<V>, axis: usize) -> [Vec<usize>; 2] {
        [
            self.tag_one_side_bounding_cells(bounds, axis, false),
            self.tag_one_side_bounding_cells(bounds, axis, true),
        ]
    }

    /// Band of cells around one face of `bounds` normal to `axis`; the upper
    /// face when `positive`.
    pub fn tag_one_side_bounding_cells(&self, bounds: &BoundingBox<V>, axis: usize, positive: bool) -> Vec<usize> {
        debug_assert!(axis < V::DIM);
        let lower = self.mesh.cell_index_from_position(bounds.lower);
        let upper = self.mesh.cell_index_from_position(bounds.upper);
        let n = self.mesh.number_of_cells();

        let mut range = [(0usize, 0usize); 3];
        for (a, r) in range.iter_mut().enumerate() {
            let (lo, hi) = if a == axis {
                let face = if positive { upper[a] } else { lower[a] };
                (face, face)
            } else {
                (lower[a], upper[a])
            };
            *r = (lo.saturating_sub(1), (hi + 1).min(n[a] - 1));
        }

        let mut tagged = Vec::new();
        for k in range[2].0..=range[2].1 {
            for j in range[1].0..=range[1].1 {
                for i in range[0].0..=range[0].1 {
                    tagged.push(self.mesh.linear_index([i, j, k]));
                }
            }
        }
        tagged
    }

    /// Visit cells within `depth` rings of `center`, z outermost, x innermost.
    #[inline]
    fn for_each_cell_in_range(&self, center: CellIndex, depth: usize, mut f: impl FnMut(&CellList<V>)) {
        let range = self.mesh.neighbor_range(center, depth);
        for k in range[2].0..=range[2].1 {
            for j in range[1].0..=range[1].1 {
                for i in range[0].0..=range[0].1 {
                    f(&self.cells[self.mesh.linear_index([i, j, k])]);
                }
            }
        }
    }

    /// Append the neighbors of particle `index` found within `depth` rings.
    /// The neighborhood is not reset.
    #[inline]
    pub(crate) fn search_into<B, P>(
        &self,
        neighborhood: &mut Neighborhood<V>,
        index: usize,
        position: V,
        depth: usize,
        builder: &B,
        part_check: &P,
    ) where
        B: NeighborBuilder<V> + ?Sized,
        P: Fn(usize) -> bool + ?Sized,
    {
        self.for_each_cell_in_range(self.mesh.cell_index_from_position(position), depth, |cell| {
            for entry in cell.list_data() {
                if part_check(entry.index) {
                    builder.build(neighborhood, index, position, entry);
                }
            }
        });
    }

    /// Fill `configuration[k]` with the neighbors of particle
    /// `get_particle_index(k)` for `k < total`.
    ///
    /// `positions` are the querying body's positions; the entries searched
    /// are the ones binned in this grid, which may belong to another body.
    pub fn search_neighbors_by_particles<B, I, D>(
        &self,
        total: usize,
        positions: &[V],
        configuration: &mut ParticleConfiguration<V>,
        get_particle_index: I,
        get_search_depth: D,
        builder: &B,
    ) where
        B: NeighborBuilder<V> + ?Sized,
        I: Fn(usize) -> usize + Sync,
        D: Fn(usize) -> usize + Sync,
    {
        self.search_neighbor_parts_by_particles(
            total,
            positions,
            configuration,
            get_particle_index,
            get_search_depth,
            builder,
            |_| true,
        );
    }

    /// As `search_neighbors_by_particles`, only admitting candidates `j`
    /// for which `part_check(j)` holds.
    #[allow(clippy::too_many_arguments)]
    pub fn search_neighbor_parts_by_particles<B, I, D, P>(
        &self,
        total: usize,
        positions: &[V],
        configuration: &mut ParticleConfiguration<V>,
        get_particle_index: I,
        get_search_depth: D,
        builder: &B,
        part_check: P,
    ) where
        B: NeighborBuilder<V> + ?Sized,
        I: Fn(usize) -> usize + Sync,
        D: Fn(usize) -> usize + Sync,
        P: Fn(usize) -> bool + Sync,
    {
        ensure_configuration_size(configuration, total);
        let search_slot = |(k, neighborhood): (usize, &mut Neighborhood<V>)| {
            let i = get_particle_index(k);
            neighborhood.reset();
            self.search_into(neighborhood, i, positions[i], get_search_depth(i), builder, &part_check);
        };
        match self.policy {
            ExecutionPolicy::Parallel => configuration[..total]
                .par_iter_mut()
                .enumerate()
                .for_each(search_slot),
            ExecutionPolicy::Sequential => configuration[..total].iter_mut().enumerate().for_each(search_slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, KernelKind};
    use crate::neighbor_builder::{single_resolution_depth, InnerNeighbors};
    use glam::{Vec2, Vec3};

    fn grid_2d(policy: ExecutionPolicy) -> CellLinkedList<Vec2> {
        CellLinkedList::new(BoundingBox::new(Vec2::ZERO, Vec2::splat(4.0)), 1.0, policy).unwrap()
    }

    #[test]
    fn test_insert_and_build() {
        let mut cll = grid_2d(ExecutionPolicy::Parallel);
        let positions = vec![Vec2::new(0.5, 0.5), Vec2::new(0.6, 0.4), Vec2::new(3.5, 3.5)];
        for (i, &p) in positions.iter().enumerate() {
            cll.insert_index(i, p);
        }
        cll.build_cell_data(&positions);

        let cell = cll.cell(cll.mesh().cell_index_from_position(positions[0]));
        let mut indices: Vec<usize> = cell.list_data().iter().map(|e| e.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);

        cll.clear();
        assert!(cll.cells().iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_update_is_idempotent() {
        let positions: Vec<Vec2> = (0..20).map(|i| Vec2::new(0.2 * i as f32, 0.1 * i as f32)).collect();
        let mut cll = grid_2d(ExecutionPolicy::Sequential);
        cll.update_cell_lists(&positions, positions.len());
        let first: Vec<Vec<ListData<Vec2>>> = cll.cells().iter().map(|c| c.list_data().to_vec()).collect();
        cll.update_cell_lists(&positions, positions.len());
        let second: Vec<Vec<ListData<Vec2>>> = cll.cells().iter().map(|c| c.list_data().to_vec()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ghost_entry_is_searchable() {
        let mut positions = vec![Vec2::new(1.0, 1.0)];
        let mut cll = grid_2d(ExecutionPolicy::Parallel);
        cll.update_cell_lists(&positions, 1);
        positions.push(Vec2::new(1.3, 1.0));
        cll.insert_list_data_entry(1, positions[1]);

        let kernel = Kernel::new(KernelKind::WendlandC2, 0.5, 2).unwrap();
        let mut config = Vec::new();
        cll.search_neighbors_by_particles(1, &positions, &mut config, |k| k, single_resolution_depth, &InnerNeighbors::new(kernel));
        assert_eq!(config[0].j(), &[1]);
    }

    #[test]
    fn test_find_nearest() {
        let positions = vec![Vec3::new(0.1, 0.1, 0.1), Vec3::new(0.9, 0.9, 0.9), Vec3::new(1.6, 0.1, 0.1)];
        let mut cll =
            CellLinkedList::new(BoundingBox::new(Vec3::ZERO, Vec3::splat(2.0)), 1.0, ExecutionPolicy::Parallel).unwrap();
        cll.update_cell_lists(&positions, positions.len());
        assert_eq!(cll.find_nearest(Vec3::new(1.0, 1.0, 1.0)).map(|e| e.index), Some(1));
        assert_eq!(cll.find_nearest(Vec3::new(1.5, 0.0, 0.0)).map(|e| e.index), Some(2));

        cll.clear();
        assert!(cll.find_nearest(Vec3::ZERO).is_none());
    }

    #[test]
    fn test_computing_sequence_follows_cells() {
        let positions = vec![Vec2::new(3.5, 0.5), Vec2::new(0.5, 0.5), Vec2::new(0.5, 3.5)];
        let cll = grid_2d(ExecutionPolicy::Sequential);
        let seq = cll.computing_sequence(&positions, 3);
        assert_eq!(seq.len(), 3);
        assert!(seq[1] < seq[0]);
        assert!(seq[1] < seq[2]);
        assert_eq!(cll.computing_sequence(&positions, 2).len(), 2);
    }

    #[test]
    fn test_tag_body_part_by_cell() {
        let cll = grid_2d(ExecutionPolicy::Parallel);
        let tagged = cll.tag_body_part_by_cell(|center, _| center.x < 0.0 && center.y < 0.0);
        // Buffer of two cells on each side: 2 x 2 cells have negative centers.
        assert_eq!(tagged.len(), 4);
        assert_eq!(tagged[0], 0);
    }

    #[test]
    fn test_tag_bounding_cells() {
        let cll = grid_2d(ExecutionPolicy::Parallel);
        let bounds = BoundingBox::new(Vec2::ZERO, Vec2::splat(4.0));
        let [lower, upper] = cll.tag_bounding_cells(&bounds, 0);
        // Face cells are 2 and 6 in x; y spans cells 1..=7.
        assert_eq!(lower.len(), 3 * 7);
        assert_eq!(upper.len(), 3 * 7);
        let mesh = cll.mesh();
        assert!(lower.iter().all(|&l| (1..=3).contains(&mesh.cell_index_from_linear(l)[0])));
        assert!(upper.iter().all(|&l| (5..=7).contains(&mesh.cell_index_from_linear(l)[0])));
        assert_eq!(cll.tag_one_side_bounding_cells(&bounds, 0, true), upper);
    }

    #[test]
    fn test_split_cell_lists_are_not_adjacent() {
        let positions: Vec<Vec3> = (0..6)
            .flat_map(|k| (0..6).flat_map(move |j| (0..6).map(move |i| Vec3::new(i as f32, j as f32, k as f32) + 0.5)))
            .collect();
        let mut cll =
            CellLinkedList::new(BoundingBox::new(Vec3::ZERO, Vec3::splat(6.0)), 1.0, ExecutionPolicy::Parallel).unwrap();
        cll.update_cell_lists(&positions, positions.len());

        let mut split = SplitCellLists::new();
        cll.update_split_cell_lists(&mut split);
        assert_eq!(split.len(), 27);
        assert_eq!(split.iter().map(Vec::len).sum::<usize>(), positions.len());

        let mesh = cll.mesh();
        for group in &split {
            assert!(!group.is_empty());
            for (a, &la) in group.iter().enumerate() {
                for &lb in &group[a + 1..] {
                    let (ca, cb) = (mesh.cell_index_from_linear(la), mesh.cell_index_from_linear(lb));
                    let apart = (0..3).any(|d| ca[d].abs_diff(cb[d]) > 1);
                    assert!(apart, "cells {:?} and {:?} share a group", ca, cb);
                }
            }
        }

        cll.clear();
        cll.update_split_cell_lists(&mut split);
        assert!(split.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_split_cell_lists_in_2d() {
        let positions = vec![Vec2::new(0.5, 0.5), Vec2::new(1.5, 0.5), Vec2::new(3.5, 0.5)];
        let mut cll = grid_2d(ExecutionPolicy::Sequential);
        cll.update_cell_lists(&positions, positions.len());

        let mut split = SplitCellLists::new();
        cll.update_split_cell_lists(&mut split);
        assert_eq!(split.len(), 9);
        // Cells 2 and 5 along x share a group; cell 3 does not.
        let group_of = |p: Vec2| {
            let l = cll.mesh().linear_index(cll.mesh().cell_index_from_position(p));
            split.iter().position(|g| g.contains(&l))
        };
        assert_eq!(group_of(positions[0]), group_of(positions[2]));
        assert_ne!(group_of(positions[0]), group_of(positions[1]));
    }
}
