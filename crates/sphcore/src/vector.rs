//! Dimension abstraction over glam vectors.
//!
//! The grid always works on three integer axes. A 2D vector reports `z = 0`,
//! and a 2D mesh has exactly one cell layer along z, so every scan over
//! `-depth..=depth` in z collapses to the single layer.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use glam::{Vec2, Vec3};

use crate::particles::variable::VariableType;

/// Spatial vector usable as a particle position.
pub trait Vector:
    VariableType
    + Debug
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f32, Output = Self>
    + Div<f32, Output = Self>
    + AddAssign
    + SubAssign
    + Neg<Output = Self>
{
    /// Number of spatial dimensions (2 or 3).
    const DIM: usize;

    fn splat(value: f32) -> Self;

    /// Build from three components; z is ignored in 2D.
    fn from_xyz(xyz: [f32; 3]) -> Self;

    /// Components padded to three axes (z = 0 in 2D).
    fn to_xyz(self) -> [f32; 3];

    fn length(self) -> f32;

    fn length_squared(self) -> f32;

    fn dot(self, other: Self) -> f32;

    /// Component-wise minimum.
    fn min(self, other: Self) -> Self;

    /// Component-wise maximum.
    fn max(self, other: Self) -> Self;

    #[inline]
    fn axis(self, axis: usize) -> f32 {
        self.to_xyz()[axis]
    }

    #[inline]
    fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }
}

impl Vector for Vec2 {
    const DIM: usize = 2;

    #[inline]
    fn splat(value: f32) -> Self {
        Vec2::splat(value)
    }

    #[inline]
    fn from_xyz(xyz: [f32; 3]) -> Self {
        Vec2::new(xyz[0], xyz[1])
    }

    #[inline]
    fn to_xyz(self) -> [f32; 3] {
        [self.x, self.y, 0.0]
    }

    #[inline]
    fn length(self) -> f32 {
        Vec2::length(self)
    }

    #[inline]
    fn length_squared(self) -> f32 {
        Vec2::length_squared(self)
    }

    #[inline]
    fn dot(self, other: Self) -> f32 {
        Vec2::dot(self, other)
    }

    #[inline]
    fn min(self, other: Self) -> Self {
        Vec2::min(self, other)
    }

    #[inline]
    fn max(self, other: Self) -> Self {
        Vec2::max(self, other)
    }
}

impl Vector for Vec3 {
    const DIM: usize = 3;

    #[inline]
    fn splat(value: f32) -> Self {
        Vec3::splat(value)
    }

    #[inline]
    fn from_xyz(xyz: [f32; 3]) -> Self {
        Vec3::from_array(xyz)
    }

    #[inline]
    fn to_xyz(self) -> [f32; 3] {
        self.to_array()
    }

    #[inline]
    fn length(self) -> f32 {
        Vec3::length(self)
    }

    #[inline]
    fn length_squared(self) -> f32 {
        Vec3::length_squared(self)
    }

    #[inline]
    fn dot(self, other: Self) -> f32 {
        Vec3::dot(self, other)
    }

    #[inline]
    fn min(self, other: Self) -> Self {
        Vec3::min(self, other)
    }

    #[inline]
    fn max(self, other: Self) -> Self {
        Vec3::max(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_pads_z() {
        let v = Vec2::new(1.0, 2.0);
        assert_eq!(v.to_xyz(), [1.0, 2.0, 0.0]);
        assert_eq!(<Vec2 as Vector>::from_xyz([1.0, 2.0, 7.0]), v);
        assert_eq!(v.axis(2), 0.0);
    }

    #[test]
    fn test_vec3_round_trip_axes() {
        let v = Vec3::new(1.0, -2.0, 3.0);
        assert_eq!(v.axis(1), -2.0);
        assert_eq!(<Vec3 as Vector>::from_xyz(v.to_xyz()), v);
    }

    #[test]
    fn test_generic_distance() {
        fn dist<V: Vector>(a: V, b: V) -> f32 {
            a.distance(b)
        }
        assert!((dist(Vec2::ZERO, Vec2::new(3.0, 4.0)) - 5.0).abs() < 1e-6);
        assert!((dist(Vec3::ZERO, Vec3::new(0.0, 3.0, 4.0)) - 5.0).abs() < 1e-6);
    }
}
