//! Per-particle neighbor lists produced by the cell linked list search.

use serde::Serialize;

use crate::vector::Vector;

/// Neighbors of one particle for the current step.
///
/// Only the first `len()` entries are valid. Reset keeps the allocation so
/// repeated searches reuse storage.
#[derive(Clone, Debug, Default)]
pub struct Neighborhood<V> {
    current_size: usize,
    j: Vec<usize>,
    r_ij: Vec<f32>,
    /// Unit vector pointing from the neighbor to the particle.
    e_ij: Vec<V>,
    w_ij: Vec<f32>,
    dw_ij: Vec<f32>,
}

/// One accepted neighbor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborRef<V> {
    pub j: usize,
    pub r_ij: f32,
    pub e_ij: V,
    pub w_ij: f32,
    pub dw_ij: f32,
}

/// One neighborhood per searched particle.
pub type ParticleConfiguration<V> = Vec<Neighborhood<V>>;

impl<V: Vector> Neighborhood<V> {
    pub fn new() -> Self {
        Self {
            current_size: 0,
            j: Vec::new(),
            r_ij: Vec::new(),
            e_ij: Vec::new(),
            w_ij: Vec::new(),
            dw_ij: Vec::new(),
        }
    }

    /// Invalidate every entry, keeping storage.
    #[inline]
    pub fn reset(&mut self) {
        self.current_size = 0;
    }

    /// Append a neighbor, overwriting stale storage when available.
    #[inline]
    pub fn push(&mut self, j: usize, r_ij: f32, e_ij: V, w_ij: f32, dw_ij: f32) {
        let n = self.current_size;
        if n < self.j.len() {
            self.j[n] = j;
            self.r_ij[n] = r_ij;
            self.e_ij[n] = e_ij;
            self.w_ij[n] = w_ij;
            self.dw_ij[n] = dw_ij;
        } else {
            self.j.push(j);
            self.r_ij.push(r_ij);
            self.e_ij.push(e_ij);
            self.w_ij.push(w_ij);
            self.dw_ij.push(dw_ij);
        }
        self.current_size += 1;
    }

    pub fn len(&self) -> usize {
        self.current_size
    }

    pub fn is_empty(&self) -> bool {
        self.current_size == 0
    }

    /// Entries allocated, valid or not.
    pub fn allocated(&self) -> usize {
        self.j.len()
    }

    pub fn j(&self) -> &[usize] {
        &self.j[..self.current_size]
    }

    pub fn r_ij(&self) -> &[f32] {
        &self.r_ij[..self.current_size]
    }

    pub fn e_ij(&self) -> &[V] {
        &self.e_ij[..self.current_size]
    }

    pub fn w_ij(&self) -> &[f32] {
        &self.w_ij[..self.current_size]
    }

    pub fn dw_ij(&self) -> &[f32] {
        &self.dw_ij[..self.current_size]
    }

    pub fn get(&self, n: usize) -> Option<NeighborRef<V>> {
        (n < self.current_size).then(|| NeighborRef {
            j: self.j[n],
            r_ij: self.r_ij[n],
            e_ij: self.e_ij[n],
            w_ij: self.w_ij[n],
            dw_ij: self.dw_ij[n],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = NeighborRef<V>> + '_ {
        (0..self.current_size).filter_map(move |n| self.get(n))
    }

    /// Whether `j` is among the valid entries.
    pub fn contains(&self, j: usize) -> bool {
        self.j().contains(&j)
    }
}

/// Make `configuration` hold at least `n` neighborhoods.
pub fn ensure_configuration_size<V: Vector>(configuration: &mut ParticleConfiguration<V>, n: usize) {
    if configuration.len() < n {
        configuration.resize_with(n, Neighborhood::new);
    }
}

/// Summary of neighborhood sizes over a configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NeighborhoodStats {
    /// `histogram[n]` counts particles with exactly `n` neighbors.
    pub histogram: Vec<usize>,
    pub particles_with_neighbors: usize,
    pub max_neighbors: usize,
    /// Mean over particles that have at least one neighbor.
    pub avg_neighbors: f64,
}

impl NeighborhoodStats {
    pub fn from_configuration<V: Vector>(configuration: &[Neighborhood<V>]) -> Self {
        let mut stats = Self {
            histogram: vec![0],
            ..Self::default()
        };
        let mut total_neighbors = 0;
        for neighborhood in configuration {
            let n = neighborhood.len();
            if stats.histogram.len() <= n {
                stats.histogram.resize(n + 1, 0);
            }
            stats.histogram[n] += 1;
            if n > 0 {
                stats.max_neighbors = stats.max_neighbors.max(n);
                stats.particles_with_neighbors += 1;
                total_neighbors += n;
            }
        }
        if stats.particles_with_neighbors > 0 {
            stats.avg_neighbors = total_neighbors as f64 / stats.particles_with_neighbors as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_reset_reuses_storage() {
        let mut nbh = Neighborhood::<Vec2>::new();
        nbh.push(3, 0.5, Vec2::X, 1.0, -1.0);
        nbh.push(4, 0.7, Vec2::Y, 0.5, -0.5);
        assert_eq!(nbh.len(), 2);

        nbh.reset();
        assert!(nbh.is_empty());
        assert_eq!(nbh.allocated(), 2);
        assert!(nbh.j().is_empty());

        nbh.push(9, 0.1, -Vec2::X, 2.0, -3.0);
        assert_eq!(nbh.j(), &[9]);
        assert_eq!(nbh.allocated(), 2);
        assert!(!nbh.contains(4), "stale entry must not be visible");
    }

    #[test]
    fn test_iter_yields_valid_entries() {
        let mut nbh = Neighborhood::<Vec2>::new();
        for j in 0..3 {
            nbh.push(j, j as f32, Vec2::X, 0.0, 0.0);
        }
        nbh.reset();
        nbh.push(7, 0.25, Vec2::Y, 1.0, -2.0);
        let all: Vec<_> = nbh.iter().collect();
        assert_eq!(
            all,
            vec![NeighborRef { j: 7, r_ij: 0.25, e_ij: Vec2::Y, w_ij: 1.0, dw_ij: -2.0 }]
        );
        assert!(nbh.get(1).is_none());
    }

    #[test]
    fn test_ensure_configuration_size() {
        let mut config: ParticleConfiguration<Vec2> = Vec::new();
        ensure_configuration_size(&mut config, 5);
        assert_eq!(config.len(), 5);
        ensure_configuration_size(&mut config, 2);
        assert_eq!(config.len(), 5);
    }

    #[test]
    fn test_stats_histogram() {
        let mut config: ParticleConfiguration<Vec2> = vec![Neighborhood::new(); 3];
        config[0].push(1, 0.1, Vec2::X, 1.0, -1.0);
        config[0].push(2, 0.1, Vec2::X, 1.0, -1.0);
        config[1].push(0, 0.1, Vec2::X, 1.0, -1.0);
        let stats = NeighborhoodStats::from_configuration(&config);
        assert_eq!(stats.histogram, vec![1, 1, 1]);
        assert_eq!(stats.particles_with_neighbors, 2);
        assert_eq!(stats.max_neighbors, 2);
        assert!((stats.avg_neighbors - 1.5).abs() < 1e-12);
    }
}
