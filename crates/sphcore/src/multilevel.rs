//! Multi-resolution cell linked list for variable smoothing length.
//!
//! Level `l` is a full grid with spacing `reference_spacing * 2^l`. Each
//! particle is binned in the level matching its own cutoff, and a search may
//! scan several levels and merge the results into one neighborhood.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cell_linked_list::{CellLinkedList, ListData};
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::mesh::BoundingBox;
use crate::neighbor_builder::{search_depth_for_cutoff, NeighborBuilder};
use crate::neighborhood::{ensure_configuration_size, Neighborhood, ParticleConfiguration};
use crate::particles::{ParticleStore, SMOOTHING_LENGTH_RATIO};
use crate::search::{ExecutionPolicy, NeighborSearch};
use crate::vector::Vector;

/// Which levels a search scans.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelScope {
    /// Only the level of the querying particle's own cutoff.
    OwnLevel,
    /// Every level; finds neighbors binned at any resolution.
    #[default]
    AllLevels,
    /// An explicit set of levels. Out-of-range entries are ignored.
    Designated(Vec<usize>),
}

#[inline]
fn ratio_of(h_ratio: Option<&[f32]>, index: usize) -> f32 {
    h_ratio.map_or(1.0, |r| r[index])
}

#[derive(Debug)]
pub struct MultilevelCellLinkedList<V> {
    kernel: Kernel,
    reference_spacing: f32,
    levels: Vec<CellLinkedList<V>>,
    /// Largest cutoff radius binned at each level by the last update.
    max_cutoffs: Vec<f32>,
    scope: LevelScope,
    policy: ExecutionPolicy,
}

impl<V: Vector> MultilevelCellLinkedList<V> {
    pub fn new(
        bounds: BoundingBox<V>,
        reference_spacing: f32,
        total_levels: usize,
        kernel: Kernel,
        policy: ExecutionPolicy,
    ) -> Result<Self> {
        if total_levels == 0 {
            return Err(Error::InvalidParam("multi-level grid needs at least one level".to_string()));
        }
        let levels = (0..total_levels)
            .map(|l| CellLinkedList::new(bounds, reference_spacing * (1u32 << l) as f32, policy))
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "multi-level cell linked list: {} levels, spacing {} .. {}",
            total_levels,
            reference_spacing,
            levels.last().map_or(reference_spacing, |l| l.grid_spacing())
        );
        Ok(Self {
            kernel,
            reference_spacing,
            max_cutoffs: vec![0.0; total_levels],
            levels,
            scope: LevelScope::default(),
            policy,
        })
    }

    pub fn with_scope(mut self, scope: LevelScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn set_scope(&mut self, scope: LevelScope) {
        self.scope = scope;
    }

    pub fn scope(&self) -> &LevelScope {
        &self.scope
    }

    pub fn total_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn reference_spacing(&self) -> f32 {
        self.reference_spacing
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn level(&self, level: usize) -> &CellLinkedList<V> {
        &self.levels[level]
    }

    pub fn levels(&self) -> &[CellLinkedList<V>] {
        &self.levels
    }

    /// Largest cutoff radius binned at `level`, 0 for an empty level.
    pub fn max_cutoff(&self, level: usize) -> f32 {
        self.max_cutoffs[level]
    }

    /// Finest level whose spacing covers `cutoff_radius`, clamped to the
    /// coarsest level.
    pub fn get_mesh_level(&self, cutoff_radius: f32) -> usize {
        self.levels
            .iter()
            .position(|l| l.grid_spacing() >= cutoff_radius)
            .unwrap_or(self.levels.len() - 1)
    }

    /// Rebuild every level, binning particle `i` by the cutoff of `h_ratio[i]`
    /// (1.0 when `None`).
    pub fn update_cell_lists_with_ratio(&mut self, positions: &[V], h_ratio: Option<&[f32]>, total_real: usize) {
        for level in &mut self.levels {
            level.clear();
        }
        let this = &*self;
        let bin = |i: usize| {
            let cutoff = this.kernel.cutoff_radius_with_ratio(ratio_of(h_ratio, i));
            let l = this.get_mesh_level(cutoff);
            this.levels[l].insert_index(i, positions[i]);
            (l, cutoff)
        };
        let binned: Vec<(usize, f32)> = match self.policy {
            ExecutionPolicy::Parallel => (0..total_real).into_par_iter().map(bin).collect(),
            ExecutionPolicy::Sequential => (0..total_real).map(bin).collect(),
        };

        self.max_cutoffs.iter_mut().for_each(|c| *c = 0.0);
        for (l, cutoff) in binned {
            if cutoff.is_finite() {
                self.max_cutoffs[l] = self.max_cutoffs[l].max(cutoff);
            }
        }
        for level in &mut self.levels {
            level.build_cell_data(positions);
        }
    }

    /// Levels scanned for a particle binned at `own_level`.
    fn scanned_levels(&self, own_level: usize) -> Vec<usize> {
        match &self.scope {
            LevelScope::OwnLevel => vec![own_level],
            LevelScope::AllLevels => (0..self.levels.len()).collect(),
            LevelScope::Designated(levels) => levels.iter().copied().filter(|&l| l < self.levels.len()).collect(),
        }
    }

    /// Search every real particle against the levels selected by the scope.
    ///
    /// Each neighborhood is reset once, then receives the candidates of all
    /// scanned levels. Level `l` is searched deep enough to cover both
    /// `cutoff_i` and the largest cutoff binned there, since a pair is
    /// accepted out to the larger of the two supports.
    pub fn search_with_ratio<B: NeighborBuilder<V> + ?Sized>(
        &self,
        positions: &[V],
        h_ratio: Option<&[f32]>,
        total_real: usize,
        configuration: &mut ParticleConfiguration<V>,
        builder: &B,
    ) {
        ensure_configuration_size(configuration, total_real);
        let search_slot = |(i, neighborhood): (usize, &mut Neighborhood<V>)| {
            neighborhood.reset();
            let cutoff = self.kernel.cutoff_radius_with_ratio(ratio_of(h_ratio, i));
            for l in self.scanned_levels(self.get_mesh_level(cutoff)) {
                let level = &self.levels[l];
                let depth = search_depth_for_cutoff(cutoff.max(self.max_cutoffs[l]), level.grid_spacing());
                level.search_into(neighborhood, i, positions[i], depth, builder, &|_: usize| true);
            }
        };
        match self.policy {
            ExecutionPolicy::Parallel => configuration[..total_real]
                .par_iter_mut()
                .enumerate()
                .for_each(search_slot),
            ExecutionPolicy::Sequential => configuration[..total_real]
                .iter_mut()
                .enumerate()
                .for_each(search_slot),
        }
    }

    /// Cells of every level whose center satisfies `included(center, spacing)`,
    /// indexed by level.
    pub fn tag_body_part_by_cell(&self, included: impl Fn(V, f32) -> bool) -> Vec<Vec<usize>> {
        self.levels.iter().map(|l| l.tag_body_part_by_cell(&included)).collect()
    }

    /// Closest entry over all levels.
    pub fn find_nearest(&self, position: V) -> Option<ListData<V>> {
        self.levels
            .iter()
            .filter_map(|l| l.find_nearest(position))
            .min_by(|a, b| {
                let da = (a.position - position).length_squared();
                let db = (b.position - position).length_squared();
                da.total_cmp(&db)
            })
    }
}

impl<V: Vector> NeighborSearch<V> for MultilevelCellLinkedList<V> {
    fn update_cell_lists(&mut self, particles: &ParticleStore<V>) {
        let h_ratio = particles.variable::<f32>(SMOOTHING_LENGTH_RATIO).ok();
        self.update_cell_lists_with_ratio(particles.positions(), h_ratio, particles.total_real_particles());
    }

    fn search_inner(
        &self,
        particles: &ParticleStore<V>,
        configuration: &mut ParticleConfiguration<V>,
        builder: &dyn NeighborBuilder<V>,
    ) {
        let h_ratio = particles.variable::<f32>(SMOOTHING_LENGTH_RATIO).ok();
        self.search_with_ratio(
            particles.positions(),
            h_ratio,
            particles.total_real_particles(),
            configuration,
            builder,
        );
    }

    fn find_nearest(&self, position: V) -> Option<ListData<V>> {
        MultilevelCellLinkedList::find_nearest(self, position)
    }

    /// Keys come from the finest level.
    fn computing_sequence(&self, particles: &ParticleStore<V>) -> Vec<u64> {
        self.levels[0].computing_sequence(particles.positions(), particles.total_real_particles())
    }

    fn name(&self) -> &'static str {
        "multi-level cell linked list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelKind;
    use crate::neighbor_builder::AdaptiveInnerNeighbors;
    use glam::Vec2;

    fn two_level_grid() -> MultilevelCellLinkedList<Vec2> {
        // h = 0.5 gives a reference cutoff of 1.0, matching level 0.
        let kernel = Kernel::new(KernelKind::WendlandC2, 0.5, 2).unwrap();
        MultilevelCellLinkedList::new(
            BoundingBox::new(Vec2::ZERO, Vec2::splat(8.0)),
            1.0,
            2,
            kernel,
            ExecutionPolicy::Parallel,
        )
        .unwrap()
    }

    #[test]
    fn test_level_spacing_doubles() {
        let grid = two_level_grid();
        assert_eq!(grid.total_levels(), 2);
        assert_eq!(grid.level(0).grid_spacing(), 1.0);
        assert_eq!(grid.level(1).grid_spacing(), 2.0);
    }

    #[test]
    fn test_get_mesh_level() {
        let grid = two_level_grid();
        assert_eq!(grid.get_mesh_level(0.4), 0);
        assert_eq!(grid.get_mesh_level(1.0), 0);
        assert_eq!(grid.get_mesh_level(1.5), 1);
        assert_eq!(grid.get_mesh_level(10.0), 1);
    }

    #[test]
    fn test_rejects_zero_levels() {
        let kernel = Kernel::new(KernelKind::WendlandC2, 0.5, 2).unwrap();
        let err = MultilevelCellLinkedList::<Vec2>::new(
            BoundingBox::new(Vec2::ZERO, Vec2::ONE),
            1.0,
            0,
            kernel,
            ExecutionPolicy::Parallel,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_particles_binned_by_own_cutoff() {
        let mut grid = two_level_grid();
        let positions = vec![Vec2::new(1.0, 1.0), Vec2::new(1.2, 1.0)];
        // Particle 1 has twice the smoothing length: cutoff 2.0 -> level 1.
        let h_ratio = vec![1.0, 0.5];
        grid.update_cell_lists_with_ratio(&positions, Some(&h_ratio), 2);

        let count = |l: usize| grid.level(l).cells().iter().map(|c| c.list_data().len()).sum::<usize>();
        assert_eq!(count(0), 1);
        assert_eq!(count(1), 1);
    }

    #[test]
    fn test_scopes_merge_levels() {
        let mut grid = two_level_grid();
        let positions = vec![Vec2::new(1.0, 1.0), Vec2::new(2.5, 1.0)];
        let h_ratio = vec![1.0, 0.5];
        grid.update_cell_lists_with_ratio(&positions, Some(&h_ratio), 2);
        let builder = AdaptiveInnerNeighbors::new(*grid.kernel(), &h_ratio);

        let mut config = Vec::new();
        grid.search_with_ratio(&positions, Some(&h_ratio), 2, &mut config, &builder);
        assert_eq!(config[0].j(), &[1]);
        assert_eq!(config[1].j(), &[0]);

        grid.set_scope(LevelScope::OwnLevel);
        grid.search_with_ratio(&positions, Some(&h_ratio), 2, &mut config, &builder);
        assert!(config[0].is_empty(), "level 0 alone cannot see particle 1");
        assert_eq!(config[1].len(), 0);

        grid.set_scope(LevelScope::Designated(vec![1, 7]));
        grid.search_with_ratio(&positions, Some(&h_ratio), 2, &mut config, &builder);
        assert_eq!(config[0].j(), &[1]);
        assert!(config[1].is_empty());
    }

    #[test]
    fn test_clamped_particle_is_seen_from_finer_level() {
        let mut grid = two_level_grid();
        // Particle 1 has cutoff 4.0, beyond the coarsest spacing of 2.0.
        let positions = vec![Vec2::new(2.5, 2.5), Vec2::new(6.4, 2.5)];
        let h_ratio = vec![1.0, 0.25];
        grid.update_cell_lists_with_ratio(&positions, Some(&h_ratio), 2);
        assert_eq!(grid.max_cutoff(0), 1.0);
        assert_eq!(grid.max_cutoff(1), 4.0);

        let builder = AdaptiveInnerNeighbors::new(*grid.kernel(), &h_ratio);
        let mut config = Vec::new();
        grid.search_with_ratio(&positions, Some(&h_ratio), 2, &mut config, &builder);
        assert_eq!(config[0].j(), &[1]);
        assert_eq!(config[1].j(), &[0]);
    }

    #[test]
    fn test_tag_body_part_by_cell_per_level() {
        let grid = two_level_grid();
        let tagged = grid.tag_body_part_by_cell(|center, _| center.x < 0.0 && center.y < 0.0);
        assert_eq!(tagged.len(), 2);
        // Two buffer cells per side on each level.
        assert_eq!(tagged[0].len(), 4);
        assert_eq!(tagged[1].len(), 4);
    }

    #[test]
    fn test_find_nearest_across_levels() {
        let mut grid = two_level_grid();
        let positions = vec![Vec2::new(1.0, 1.0), Vec2::new(1.4, 1.0)];
        let h_ratio = vec![1.0, 0.5];
        grid.update_cell_lists_with_ratio(&positions, Some(&h_ratio), 2);
        assert_eq!(grid.find_nearest(Vec2::new(1.5, 1.0)).map(|e| e.index), Some(1));
        assert_eq!(grid.find_nearest(Vec2::new(0.9, 1.0)).map(|e| e.index), Some(0));
    }
}
