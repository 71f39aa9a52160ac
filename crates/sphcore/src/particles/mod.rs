//! Per-particle state container.
//!
//! Slots are split into three contiguous regions:
//! real `[0, total_real)`, buffer `[total_real, real_bound)` and
//! ghost `[real_bound, particles_bound)`. Every registered variable has
//! exactly `particles_bound` entries.

pub mod sorting;
pub mod variable;

use std::marker::PhantomData;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::vector::Vector;
use variable::{Variable, VariableData, VariableType};

pub const POSITION: &str = "Position";
pub const VOLUMETRIC_MEASURE: &str = "VolumetricMeasure";
pub const DENSITY: &str = "Density";
pub const MASS: &str = "Mass";
/// Optional per-particle `h_ref / h`, read by the multi-level grid.
pub const SMOOTHING_LENGTH_RATIO: &str = "SmoothingLengthRatio";

const POSITION_INDEX: usize = 0;
const VOLUME_INDEX: usize = 1;
const DENSITY_INDEX: usize = 2;
const MASS_INDEX: usize = 3;

/// Owns every per-particle array of one body.
#[derive(Clone, Debug)]
pub struct ParticleStore<V: Vector> {
    total_real_particles: usize,
    real_particles_bound: usize,
    particles_bound: usize,
    variables: Vec<Variable>,
    variable_index: FxHashMap<String, usize>,
    singular_variables: Vec<Variable>,
    singular_index: FxHashMap<String, usize>,
    /// Variables permuted by `sort_particles_by_sequence`.
    sortable: Vec<usize>,
    /// Slot -> identity at initialization. Length `real_particles_bound`.
    original_id: Vec<usize>,
    /// Identity -> current slot. Length `real_particles_bound`.
    sorted_id: Vec<usize>,
    _dim: PhantomData<V>,
}

impl<V: Vector> Default for ParticleStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed view of `vars[i]`, checking the stored kind.
fn typed_slice<T: VariableType>(vars: &[Variable], i: usize) -> Result<&[T]> {
    vars[i].typed()
}

fn typed_slice_mut<T: VariableType>(vars: &mut [Variable], i: usize) -> Result<&mut [T]> {
    vars[i].typed_mut()
}

impl<V: Vector> ParticleStore<V> {
    /// Empty store with the basic variables registered.
    pub fn new() -> Self {
        let mut store = Self {
            total_real_particles: 0,
            real_particles_bound: 0,
            particles_bound: 0,
            variables: Vec::new(),
            variable_index: FxHashMap::default(),
            singular_variables: Vec::new(),
            singular_index: FxHashMap::default(),
            sortable: Vec::new(),
            original_id: Vec::new(),
            sorted_id: Vec::new(),
            _dim: PhantomData,
        };
        store.push_variable(Variable::new::<V>(POSITION, Vec::new()));
        store.push_variable(Variable::new::<f32>(VOLUMETRIC_MEASURE, Vec::new()));
        store.push_variable(Variable::new::<f32>(DENSITY, Vec::new()));
        store.push_variable(Variable::new::<f32>(MASS, Vec::new()));
        store.sortable = vec![POSITION_INDEX, VOLUME_INDEX, DENSITY_INDEX, MASS_INDEX];
        store
    }

    /// Store holding one real particle per generated position.
    ///
    /// Density starts at `rest_density` and mass at `rest_density * volume`.
    pub fn from_generated(positions: Vec<V>, volumes: Vec<f32>, rest_density: f32) -> Result<Self> {
        if volumes.len() != positions.len() {
            return Err(Error::LengthMismatch {
                name: VOLUMETRIC_MEASURE.to_string(),
                expected: positions.len(),
                got: volumes.len(),
            });
        }
        if !(rest_density.is_finite() && rest_density > 0.0) {
            return Err(Error::InvalidParam(format!(
                "rest density must be positive and finite, got {}",
                rest_density
            )));
        }
        if let Some(v) = volumes.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(Error::InvalidParam(format!(
                "particle volume must be positive and finite, got {}",
                v
            )));
        }

        let mut store = Self::new();
        store.initialize_all_particles_bounds(positions.len());
        store.positions_mut().copy_from_slice(&positions);
        store.volumes_mut().copy_from_slice(&volumes);
        store.densities_mut().fill(rest_density);
        for (m, v) in store.masses_mut().iter_mut().zip(&volumes) {
            *m = rest_density * v;
        }
        Ok(store)
    }

    fn push_variable(&mut self, mut var: Variable) -> usize {
        var.data_mut().resize(self.particles_bound);
        let i = self.variables.len();
        self.variable_index.insert(var.name().to_string(), i);
        self.variables.push(var);
        i
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.variable_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Register a variable filled with `init`, or return the existing one.
    pub fn register_variable<T: VariableType>(&mut self, name: &str, init: T) -> Result<&mut [T]> {
        self.register_variable_with(name, |_| init)
    }

    /// Register a variable initialized per slot, or return the existing one
    /// untouched.
    pub fn register_variable_with<T: VariableType>(
        &mut self,
        name: &str,
        init: impl Fn(usize) -> T,
    ) -> Result<&mut [T]> {
        let i = match self.variable_index.get(name) {
            Some(&i) => i,
            None => {
                let data: Vec<T> = (0..self.particles_bound).map(init).collect();
                self.push_variable(Variable::new(name, data))
            }
        };
        typed_slice_mut(&mut self.variables, i)
    }

    /// Register `new_name` as a copy of the variable `existing`.
    pub fn register_variable_from<T: VariableType>(
        &mut self,
        new_name: &str,
        existing: &str,
    ) -> Result<&mut [T]> {
        let source = self.index_of(existing)?;
        let data = typed_slice::<T>(&self.variables, source)?.to_vec();
        self.register_variable_from_data(new_name, data)
    }

    /// Register a variable from caller data of length `particles_bound`.
    ///
    /// An existing variable of the same kind is overwritten.
    pub fn register_variable_from_data<T: VariableType>(
        &mut self,
        name: &str,
        data: Vec<T>,
    ) -> Result<&mut [T]> {
        if data.len() != self.particles_bound {
            return Err(Error::LengthMismatch {
                name: name.to_string(),
                expected: self.particles_bound,
                got: data.len(),
            });
        }
        match self.variable_index.get(name) {
            Some(&i) => {
                let slot = typed_slice_mut::<T>(&mut self.variables, i)?;
                slot.copy_from_slice(&data);
                Ok(slot)
            }
            None => {
                let i = self.push_variable(Variable::new(name, data));
                typed_slice_mut(&mut self.variables, i)
            }
        }
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variable_index.contains_key(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name())
    }

    pub fn variable<T: VariableType>(&self, name: &str) -> Result<&[T]> {
        let i = self.index_of(name)?;
        typed_slice(&self.variables, i)
    }

    pub fn variable_mut<T: VariableType>(&mut self, name: &str) -> Result<&mut [T]> {
        let i = self.index_of(name)?;
        typed_slice_mut(&mut self.variables, i)
    }

    /// Untyped access to a variable's storage.
    pub fn variable_data(&self, name: &str) -> Result<&VariableData> {
        let i = self.index_of(name)?;
        Ok(self.variables[i].data())
    }

    /// Register a body-wide scalar, or return the existing one.
    pub fn register_singular_variable<T: VariableType>(&mut self, name: &str, value: T) -> Result<&mut T> {
        let i = match self.singular_index.get(name) {
            Some(&i) => i,
            None => {
                let i = self.singular_variables.len();
                self.singular_index.insert(name.to_string(), i);
                self.singular_variables.push(Variable::new(name, vec![value]));
                i
            }
        };
        typed_slice_mut::<T>(&mut self.singular_variables, i).map(|s| &mut s[0])
    }

    pub fn singular_variable<T: VariableType>(&self, name: &str) -> Result<&T> {
        let i = self
            .singular_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        typed_slice::<T>(&self.singular_variables, i).map(|s| &s[0])
    }

    pub fn singular_variable_mut<T: VariableType>(&mut self, name: &str) -> Result<&mut T> {
        let i = self
            .singular_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        typed_slice_mut::<T>(&mut self.singular_variables, i).map(|s| &mut s[0])
    }

    /// Include a registered variable in particle sorting.
    pub fn add_variable_to_sort<T: VariableType>(&mut self, name: &str) -> Result<()> {
        let i = self.index_of(name)?;
        typed_slice::<T>(&self.variables, i)?;
        if !self.sortable.contains(&i) {
            self.sortable.push(i);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bounds and population
    // ------------------------------------------------------------------

    /// Set all three counters to `total_real` and size every array to it.
    pub fn initialize_all_particles_bounds(&mut self, total_real: usize) {
        self.total_real_particles = total_real;
        self.real_particles_bound = total_real;
        self.particles_bound = total_real;
        self.resize_variables();
        self.original_id = (0..total_real).collect();
        self.sorted_id = (0..total_real).collect();
    }

    /// Grow the real bound by `buffer_size` reserve slots.
    ///
    /// Ghost slots present at this point are discarded.
    pub fn increase_all_particles_bounds(&mut self, buffer_size: usize) {
        let ghosts = self.ghost_particles();
        if ghosts > 0 {
            log::warn!("discarding {} ghost particles while growing particle bounds", ghosts);
            self.reset_ghost_particles();
        }
        let old_bound = self.real_particles_bound;
        self.real_particles_bound += buffer_size;
        self.particles_bound = self.real_particles_bound;
        self.resize_variables();
        self.original_id.extend(old_bound..self.real_particles_bound);
        self.sorted_id.extend(old_bound..self.real_particles_bound);
    }

    /// Reserve `ghost_size` ghost slots and return the first one.
    pub fn allocate_ghost_particles(&mut self, ghost_size: usize) -> usize {
        let start = self.particles_bound;
        self.particles_bound += ghost_size;
        self.resize_variables();
        start
    }

    /// Drop every ghost slot. Called at the start of a step.
    pub fn reset_ghost_particles(&mut self) {
        self.particles_bound = self.real_particles_bound;
        self.resize_variables();
    }

    fn resize_variables(&mut self) {
        for var in &mut self.variables {
            var.data_mut().resize(self.particles_bound);
        }
    }

    /// Copy every variable entry of slot `another_index` into slot `index`.
    pub fn copy_from_another_particle(&mut self, index: usize, another_index: usize) {
        debug_assert!(index < self.particles_bound && another_index < self.particles_bound);
        for var in &mut self.variables {
            var.data_mut().copy_entry(index, another_index);
        }
    }

    /// Refresh ghost `ghost_index` from the real particle `index`.
    pub fn update_ghost_particle(&mut self, ghost_index: usize, index: usize) {
        debug_assert!(ghost_index >= self.real_particles_bound);
        self.copy_from_another_particle(ghost_index, index);
    }

    /// Turn real particle `index` into a buffer particle.
    ///
    /// The last real particle moves into `index`, so indices cached by the
    /// caller for that particle become stale.
    pub fn switch_to_buffer_particle(&mut self, index: usize) {
        debug_assert!(index < self.total_real_particles);
        let last = self.total_real_particles - 1;
        if index != last {
            self.copy_from_another_particle(index, last);
            self.original_id.swap(index, last);
            self.sorted_id[self.original_id[index]] = index;
            self.sorted_id[self.original_id[last]] = last;
        }
        self.total_real_particles -= 1;
    }

    /// Turn the first buffer slot into a copy of particle `index`.
    pub fn create_real_particle_from(&mut self, index: usize) -> Result<usize> {
        if self.total_real_particles >= self.real_particles_bound {
            return Err(Error::BufferExhausted {
                total_real: self.total_real_particles,
                bound: self.real_particles_bound,
            });
        }
        let new_index = self.total_real_particles;
        self.copy_from_another_particle(new_index, index);
        self.sorted_id[self.original_id[new_index]] = new_index;
        self.total_real_particles += 1;
        Ok(new_index)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn total_real_particles(&self) -> usize {
        self.total_real_particles
    }

    pub fn real_particles_bound(&self) -> usize {
        self.real_particles_bound
    }

    pub fn particles_bound(&self) -> usize {
        self.particles_bound
    }

    pub fn buffer_particles(&self) -> usize {
        self.real_particles_bound - self.total_real_particles
    }

    pub fn ghost_particles(&self) -> usize {
        self.particles_bound - self.real_particles_bound
    }

    pub fn positions(&self) -> &[V] {
        V::slice(self.variables[POSITION_INDEX].data()).unwrap_or(&[])
    }

    pub fn positions_mut(&mut self) -> &mut [V] {
        V::slice_mut(self.variables[POSITION_INDEX].data_mut()).unwrap_or(&mut [])
    }

    pub fn volumes(&self) -> &[f32] {
        f32::slice(self.variables[VOLUME_INDEX].data()).unwrap_or(&[])
    }

    pub fn volumes_mut(&mut self) -> &mut [f32] {
        f32::slice_mut(self.variables[VOLUME_INDEX].data_mut()).unwrap_or(&mut [])
    }

    pub fn densities(&self) -> &[f32] {
        f32::slice(self.variables[DENSITY_INDEX].data()).unwrap_or(&[])
    }

    pub fn densities_mut(&mut self) -> &mut [f32] {
        f32::slice_mut(self.variables[DENSITY_INDEX].data_mut()).unwrap_or(&mut [])
    }

    pub fn masses(&self) -> &[f32] {
        f32::slice(self.variables[MASS_INDEX].data()).unwrap_or(&[])
    }

    pub fn masses_mut(&mut self) -> &mut [f32] {
        f32::slice_mut(self.variables[MASS_INDEX].data_mut()).unwrap_or(&mut [])
    }

    pub fn particle_volume(&self, index: usize) -> f32 {
        self.volumes()[index]
    }

    /// Edge length of the cube (square in 2D) with the particle's volume.
    pub fn particle_spacing(&self, index: usize) -> f32 {
        self.particle_volume(index).powf(1.0 / V::DIM as f32)
    }

    /// Identity of the particle in each slot.
    pub fn original_ids(&self) -> &[usize] {
        &self.original_id
    }

    /// Current slot of each identity.
    pub fn sorted_ids(&self) -> &[usize] {
        &self.sorted_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn store_2d(n: usize) -> ParticleStore<Vec2> {
        let positions = (0..n).map(|i| Vec2::new(i as f32, 0.0)).collect();
        ParticleStore::from_generated(positions, vec![0.01; n], 1000.0).unwrap()
    }

    #[test]
    fn test_from_generated_sets_basic_variables() {
        let store = store_2d(4);
        assert_eq!(store.total_real_particles(), 4);
        assert_eq!(store.particles_bound(), 4);
        assert_eq!(store.positions()[3], Vec2::new(3.0, 0.0));
        assert_eq!(store.densities(), &[1000.0; 4]);
        assert!((store.masses()[0] - 10.0).abs() < 1e-4);
        assert!((store.particle_spacing(0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_from_generated_rejects_mismatched_lengths() {
        let err = ParticleStore::<Vec3>::from_generated(vec![Vec3::ZERO; 3], vec![1.0; 2], 1.0);
        assert!(matches!(err, Err(Error::LengthMismatch { expected: 3, got: 2, .. })));
    }

    #[test]
    fn test_register_variable_returns_existing() {
        let mut store = store_2d(3);
        store.register_variable("Pressure", 1.5f32).unwrap()[1] = 7.0;
        let again = store.register_variable("Pressure", 0.0f32).unwrap();
        assert_eq!(again, &[1.5, 7.0, 1.5]);
    }

    #[test]
    fn test_register_variable_kind_mismatch() {
        let mut store = store_2d(3);
        store.register_variable("Pressure", 0.0f32).unwrap();
        let err = store.register_variable("Pressure", Vec2::ZERO).unwrap_err();
        assert!(matches!(err, Error::VariableTypeMismatch { .. }), "got {:?}", err);
        assert!(matches!(store.variable::<i32>("Nope"), Err(Error::UnknownVariable(_))));
    }

    #[test]
    fn test_register_variable_from_copies() {
        let mut store = store_2d(3);
        let copy = store.register_variable_from::<Vec2>("InitialPosition", POSITION).unwrap();
        assert_eq!(copy[2], Vec2::new(2.0, 0.0));
        copy[2] = Vec2::ONE;
        assert_eq!(store.positions()[2], Vec2::new(2.0, 0.0));
    }

    #[test]
    fn test_register_variable_from_data_checks_length() {
        let mut store = store_2d(3);
        assert!(store.register_variable_from_data("Tag", vec![1i32; 2]).is_err());
        let tags = store.register_variable_from_data("Tag", vec![1i32, 2, 3]).unwrap();
        assert_eq!(tags, &[1, 2, 3]);
    }

    #[test]
    fn test_singular_variables() {
        let mut store = store_2d(1);
        *store.register_singular_variable("PhysicalTime", 0.0f32).unwrap() += 0.5;
        assert_eq!(*store.singular_variable::<f32>("PhysicalTime").unwrap(), 0.5);
        assert!(store.singular_variable::<u32>("PhysicalTime").is_err());
    }

    #[test]
    fn test_ghost_allocation_accumulates_and_resets() {
        let mut store = store_2d(5);
        let a = store.allocate_ghost_particles(2);
        let b = store.allocate_ghost_particles(3);
        assert_eq!((a, b), (5, 7));
        assert_eq!(store.ghost_particles(), 5);
        assert_eq!(store.positions().len(), 10);

        store.update_ghost_particle(a, 4);
        assert_eq!(store.positions()[a], Vec2::new(4.0, 0.0));

        store.reset_ghost_particles();
        assert_eq!(store.particles_bound(), 5);
        assert_eq!(store.volumes().len(), 5);
    }

    #[test]
    fn test_switch_last_particle_only_decrements() {
        let mut store = store_2d(3);
        store.switch_to_buffer_particle(2);
        assert_eq!(store.total_real_particles(), 2);
        assert_eq!(store.original_ids(), &[0, 1, 2]);
        assert_eq!(store.positions()[2], Vec2::new(2.0, 0.0));
    }
}
