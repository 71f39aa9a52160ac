//! Type-erased per-particle arrays.
//!
//! Every registered variable is one `VariableData` value: a tagged union over
//! the supported element types. Lookups check the stored `VariableKind`
//! against the requested element type, so independently written modules can
//! attach state by name without a shared static schema.

use glam::{Mat2, Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stored element type of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Real,
    Int,
    UnsignedInt,
    Vec2,
    Vec3,
    Mat2,
    Mat3,
}

/// Owned storage of one variable.
#[derive(Clone, Debug, PartialEq)]
pub enum VariableData {
    Real(Vec<f32>),
    Int(Vec<i32>),
    UnsignedInt(Vec<u32>),
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Mat2(Vec<Mat2>),
    Mat3(Vec<Mat3>),
}

/// Applies the same expression to whichever vector the union holds.
macro_rules! for_each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            VariableData::Real($v) => $body,
            VariableData::Int($v) => $body,
            VariableData::UnsignedInt($v) => $body,
            VariableData::Vec2($v) => $body,
            VariableData::Vec3($v) => $body,
            VariableData::Mat2($v) => $body,
            VariableData::Mat3($v) => $body,
        }
    };
}

impl VariableData {
    pub fn kind(&self) -> VariableKind {
        match self {
            Self::Real(_) => VariableKind::Real,
            Self::Int(_) => VariableKind::Int,
            Self::UnsignedInt(_) => VariableKind::UnsignedInt,
            Self::Vec2(_) => VariableKind::Vec2,
            Self::Vec3(_) => VariableKind::Vec3,
            Self::Mat2(_) => VariableKind::Mat2,
            Self::Mat3(_) => VariableKind::Mat3,
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize to `len`, zero-filling new slots. Shrinking keeps capacity.
    pub fn resize(&mut self, len: usize) {
        match self {
            Self::Real(v) => v.resize(len, 0.0),
            Self::Int(v) => v.resize(len, 0),
            Self::UnsignedInt(v) => v.resize(len, 0),
            Self::Vec2(v) => v.resize(len, Vec2::ZERO),
            Self::Vec3(v) => v.resize(len, Vec3::ZERO),
            Self::Mat2(v) => v.resize(len, Mat2::ZERO),
            Self::Mat3(v) => v.resize(len, Mat3::ZERO),
        }
    }

    /// `data[index] = data[another_index]`
    #[inline]
    pub fn copy_entry(&mut self, index: usize, another_index: usize) {
        for_each_variant!(self, v => v[index] = v[another_index])
    }

    /// Reorder the leading `order.len()` entries so that new slot `k` holds
    /// old slot `order[k]`. Entries past that prefix are untouched.
    pub fn permute_prefix(&mut self, order: &[usize]) {
        for_each_variant!(self, v => {
            let reordered: Vec<_> = order.iter().map(|&old| v[old]).collect();
            v[..order.len()].copy_from_slice(&reordered);
        })
    }
}

/// Element types that can be stored as a particle variable.
pub trait VariableType: Copy + Default + Send + Sync + 'static {
    const KIND: VariableKind;
    /// Fill value for newly allocated slots.
    const ZERO: Self;

    fn wrap(data: Vec<Self>) -> VariableData;

    fn slice(data: &VariableData) -> Option<&[Self]>;

    fn slice_mut(data: &mut VariableData) -> Option<&mut [Self]>;
}

macro_rules! impl_variable_type {
    ($ty:ty, $variant:ident, $zero:expr) => {
        impl VariableType for $ty {
            const KIND: VariableKind = VariableKind::$variant;
            const ZERO: Self = $zero;

            #[inline]
            fn wrap(data: Vec<Self>) -> VariableData {
                VariableData::$variant(data)
            }

            #[inline]
            fn slice(data: &VariableData) -> Option<&[Self]> {
                match data {
                    VariableData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn slice_mut(data: &mut VariableData) -> Option<&mut [Self]> {
                match data {
                    VariableData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_variable_type!(f32, Real, 0.0);
impl_variable_type!(i32, Int, 0);
impl_variable_type!(u32, UnsignedInt, 0);
impl_variable_type!(Vec2, Vec2, Vec2::ZERO);
impl_variable_type!(Vec3, Vec3, Vec3::ZERO);
impl_variable_type!(Mat2, Mat2, Mat2::ZERO);
impl_variable_type!(Mat3, Mat3, Mat3::ZERO);

/// A named per-particle array.
#[derive(Clone, Debug)]
pub struct Variable {
    name: String,
    data: VariableData,
}

impl Variable {
    pub fn new<T: VariableType>(name: &str, data: Vec<T>) -> Self {
        Self {
            name: name.to_string(),
            data: T::wrap(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.data.kind()
    }

    pub fn data(&self) -> &VariableData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut VariableData {
        &mut self.data
    }

    /// Typed view, failing when `T` is not the stored kind.
    pub fn typed<T: VariableType>(&self) -> Result<&[T]> {
        T::slice(&self.data).ok_or_else(|| Error::VariableTypeMismatch {
            name: self.name.clone(),
            requested: T::KIND,
            found: self.data.kind(),
        })
    }

    pub fn typed_mut<T: VariableType>(&mut self) -> Result<&mut [T]> {
        let Variable { name, data } = self;
        let found = data.kind();
        T::slice_mut(data).ok_or_else(|| Error::VariableTypeMismatch {
            name: name.clone(),
            requested: T::KIND,
            found,
        })
    }
}
