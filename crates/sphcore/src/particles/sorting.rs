//! Reordering of real particles by a spatial sequence key.

use rayon::prelude::*;

use super::ParticleStore;
use crate::vector::Vector;

impl<V: Vector> ParticleStore<V> {
    /// Reorder the real particles by ascending `sequence[i]`.
    ///
    /// Ties keep their current relative order. Only variables in the sort
    /// list are permuted; `original_id` moves with the particles and
    /// `sorted_id` is rebuilt so `sorted_id[original_id[i]] == i` holds.
    /// Buffer and ghost slots are left untouched.
    pub fn sort_particles_by_sequence(&mut self, sequence: &[u64]) {
        let n = self.total_real_particles;
        debug_assert!(sequence.len() >= n);
        if n < 2 {
            return;
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.par_sort_by_key(|&i| sequence[i]);

        for &var in &self.sortable {
            self.variables[var].data_mut().permute_prefix(&order);
        }

        let ids: Vec<usize> = order.iter().map(|&old| self.original_id[old]).collect();
        self.original_id[..n].copy_from_slice(&ids);
        for (slot, &id) in ids.iter().enumerate() {
            self.sorted_id[id] = slot;
        }
        log::trace!("sorted {} particles", n);
    }
}
