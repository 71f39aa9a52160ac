//! Pair acceptance rules and search-depth policies.
//!
//! A builder decides whether a candidate entry from a nearby cell becomes a
//! neighbor and fills in distance, direction and kernel values.

use crate::cell_linked_list::ListData;
use crate::kernel::Kernel;
use crate::neighborhood::Neighborhood;
use crate::vector::Vector;

/// Added to `r` before normalising the direction so coincident particles
/// give a zero vector instead of NaN.
pub const TINY: f32 = 1.0e-15;

/// Builds one neighbor relation from a candidate cell entry.
pub trait NeighborBuilder<V: Vector>: Sync {
    fn build(&self, neighborhood: &mut Neighborhood<V>, index_i: usize, position_i: V, entry: &ListData<V>);
}

#[inline]
fn push_pair<V: Vector>(neighborhood: &mut Neighborhood<V>, j: usize, displacement: V, r: f32, w: f32, dw: f32) {
    neighborhood.push(j, r, displacement / (r + TINY), w, dw);
}

/// Neighbors within the same body, self excluded.
#[derive(Clone, Copy, Debug)]
pub struct InnerNeighbors {
    kernel: Kernel,
    cutoff_sq: f32,
}

impl InnerNeighbors {
    pub fn new(kernel: Kernel) -> Self {
        let cutoff = kernel.cutoff_radius();
        Self {
            kernel,
            cutoff_sq: cutoff * cutoff,
        }
    }
}

impl<V: Vector> NeighborBuilder<V> for InnerNeighbors {
    #[inline]
    fn build(&self, neighborhood: &mut Neighborhood<V>, index_i: usize, position_i: V, entry: &ListData<V>) {
        if entry.index == index_i {
            return;
        }
        let displacement = position_i - entry.position;
        let r_sq = displacement.length_squared();
        if r_sq <= self.cutoff_sq {
            let r = r_sq.sqrt();
            push_pair(neighborhood, entry.index, displacement, r, self.kernel.w(r), self.kernel.dw(r));
        }
    }
}

/// Neighbors in another body. Indices refer to that body's particles, so no
/// self exclusion applies.
#[derive(Clone, Copy, Debug)]
pub struct ContactNeighbors {
    kernel: Kernel,
    cutoff_sq: f32,
}

impl ContactNeighbors {
    /// `kernel` is usually the one with the larger smoothing length of the
    /// two bodies.
    pub fn new(kernel: Kernel) -> Self {
        let cutoff = kernel.cutoff_radius();
        Self {
            kernel,
            cutoff_sq: cutoff * cutoff,
        }
    }
}

impl<V: Vector> NeighborBuilder<V> for ContactNeighbors {
    #[inline]
    fn build(&self, neighborhood: &mut Neighborhood<V>, _index_i: usize, position_i: V, entry: &ListData<V>) {
        let displacement = position_i - entry.position;
        let r_sq = displacement.length_squared();
        if r_sq <= self.cutoff_sq {
            let r = r_sq.sqrt();
            push_pair(neighborhood, entry.index, displacement, r, self.kernel.w(r), self.kernel.dw(r));
        }
    }
}

/// Inner neighbors with a per-particle smoothing length `h_ref / h_ratio[i]`.
///
/// A pair uses the smaller of the two ratios, i.e. the larger support, so the
/// relation is symmetric.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveInnerNeighbors<'a> {
    kernel: Kernel,
    h_ratio: &'a [f32],
}

impl<'a> AdaptiveInnerNeighbors<'a> {
    pub fn new(kernel: Kernel, h_ratio: &'a [f32]) -> Self {
        Self { kernel, h_ratio }
    }
}

impl<V: Vector> NeighborBuilder<V> for AdaptiveInnerNeighbors<'_> {
    #[inline]
    fn build(&self, neighborhood: &mut Neighborhood<V>, index_i: usize, position_i: V, entry: &ListData<V>) {
        if entry.index == index_i {
            return;
        }
        let ratio = self.h_ratio[index_i].min(self.h_ratio[entry.index]);
        let cutoff = self.kernel.cutoff_radius_with_ratio(ratio);
        let displacement = position_i - entry.position;
        let r_sq = displacement.length_squared();
        if r_sq <= cutoff * cutoff {
            let r = r_sq.sqrt();
            push_pair(
                neighborhood,
                entry.index,
                displacement,
                r,
                self.kernel.w_with_ratio(ratio, r),
                self.kernel.dw_with_ratio(ratio, r),
            );
        }
    }
}

/// Cell rings to scan so that `cutoff` is covered on a grid of `grid_spacing`.
#[inline]
pub fn search_depth_for_cutoff(cutoff: f32, grid_spacing: f32) -> usize {
    ((cutoff / grid_spacing).ceil() as usize).max(1)
}

/// Depth policy for a single-resolution grid: always the adjacent ring.
#[inline]
pub fn single_resolution_depth(_index: usize) -> usize {
    1
}

/// Depth policy for variable smoothing length on one grid.
///
/// A pair is accepted out to the larger of the two supports, so every
/// particle scans deep enough to reach the widest support in the body.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveSearchDepth<'a> {
    kernel: Kernel,
    grid_spacing: f32,
    h_ratio: &'a [f32],
    max_cutoff: f32,
}

impl<'a> AdaptiveSearchDepth<'a> {
    /// `h_ratio` should cover only the particles being searched; zeroed
    /// buffer slots would otherwise count as an infinite support.
    pub fn new(kernel: Kernel, grid_spacing: f32, h_ratio: &'a [f32]) -> Self {
        let max_cutoff = h_ratio
            .iter()
            .map(|&r| kernel.cutoff_radius_with_ratio(r))
            .filter(|c| c.is_finite())
            .fold(0.0f32, f32::max);
        Self {
            kernel,
            grid_spacing,
            h_ratio,
            max_cutoff,
        }
    }

    /// Largest finite cutoff radius among the particles.
    pub fn max_cutoff(&self) -> f32 {
        self.max_cutoff
    }

    #[inline]
    pub fn depth(&self, index: usize) -> usize {
        let own = self.kernel.cutoff_radius_with_ratio(self.h_ratio[index]);
        search_depth_for_cutoff(own.max(self.max_cutoff), self.grid_spacing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelKind;
    use glam::{Vec2, Vec3};

    fn kernel(h: f32, dim: usize) -> Kernel {
        Kernel::new(KernelKind::WendlandC2, h, dim).unwrap()
    }

    #[test]
    fn test_inner_excludes_self_and_far() {
        let builder = InnerNeighbors::new(kernel(0.5, 2));
        let mut nbh = Neighborhood::new();
        let p = Vec2::ZERO;
        builder.build(&mut nbh, 0, p, &ListData { index: 0, position: p });
        builder.build(&mut nbh, 0, p, &ListData { index: 1, position: Vec2::new(2.0, 0.0) });
        assert!(nbh.is_empty());

        builder.build(&mut nbh, 0, p, &ListData { index: 2, position: Vec2::new(0.5, 0.0) });
        assert_eq!(nbh.j(), &[2]);
        assert!((nbh.r_ij()[0] - 0.5).abs() < 1e-6);
        assert!((nbh.e_ij()[0] - Vec2::new(-1.0, 0.0)).length() < 1e-5);
        assert!(nbh.w_ij()[0] > 0.0);
        assert!(nbh.dw_ij()[0] < 0.0);
    }

    #[test]
    fn test_exact_cutoff_is_accepted() {
        let builder = InnerNeighbors::new(kernel(0.5, 3));
        let mut nbh = Neighborhood::new();
        builder.build(&mut nbh, 0, Vec3::ZERO, &ListData { index: 1, position: Vec3::new(0.0, 1.0, 0.0) });
        assert_eq!(nbh.len(), 1);
        assert_eq!(nbh.w_ij()[0], 0.0);
    }

    #[test]
    fn test_contact_keeps_same_index() {
        let builder = ContactNeighbors::new(kernel(0.5, 2));
        let mut nbh = Neighborhood::new();
        builder.build(&mut nbh, 3, Vec2::ZERO, &ListData { index: 3, position: Vec2::new(0.0, 0.2) });
        assert_eq!(nbh.j(), &[3]);
    }

    #[test]
    fn test_adaptive_uses_larger_support() {
        let h_ratio = [1.0, 2.0];
        let builder = AdaptiveInnerNeighbors::new(kernel(0.5, 2), &h_ratio);
        let mut nbh = Neighborhood::new();
        // Particle 1 alone has cutoff 0.5, the pair uses particle 0's cutoff 1.0.
        builder.build(&mut nbh, 1, Vec2::ZERO, &ListData { index: 0, position: Vec2::new(0.9, 0.0) });
        assert_eq!(nbh.len(), 1);

        let mut back = Neighborhood::new();
        builder.build(&mut back, 0, Vec2::new(0.9, 0.0), &ListData { index: 1, position: Vec2::ZERO });
        assert_eq!(back.len(), 1);
        assert!((back.w_ij()[0] - nbh.w_ij()[0]).abs() < 1e-6);
    }

    #[test]
    fn test_search_depth() {
        assert_eq!(search_depth_for_cutoff(0.3, 1.0), 1);
        assert_eq!(search_depth_for_cutoff(1.0, 1.0), 1);
        assert_eq!(search_depth_for_cutoff(2.5, 1.0), 3);
        assert_eq!(single_resolution_depth(42), 1);

        let h_ratio = [1.0, 0.25];
        let depth = AdaptiveSearchDepth::new(kernel(0.5, 2), 1.0, &h_ratio);
        assert_eq!(depth.max_cutoff(), 4.0);
        // The fine particle must still reach the coarse one.
        assert_eq!(depth.depth(0), 4);
        assert_eq!(depth.depth(1), 4);

        let uniform = [1.0, 1.0];
        assert_eq!(AdaptiveSearchDepth::new(kernel(0.5, 2), 1.0, &uniform).depth(0), 1);
    }
}
