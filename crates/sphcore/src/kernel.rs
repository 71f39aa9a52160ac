//! SPH smoothing kernels with compact support `2h`.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kernel shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    /// Wendland C2, the default for weakly compressible flows.
    #[default]
    WendlandC2,
    /// Cubic B-spline (M4).
    CubicSpline,
}

/// Reduced support radius `q = r / h` at which every kernel vanishes.
pub const KERNEL_SIZE: f32 = 2.0;

/// Normalised kernel for a fixed reference smoothing length.
///
/// Coefficients are precomputed at construction so `w` and `dw` avoid
/// `powi` in the pair loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Kernel {
    kind: KernelKind,
    dimension: usize,
    h: f32,
    inv_h: f32,
    cutoff: f32,
    /// Normalisation of W for this dimension and h.
    factor_w: f32,
    /// `factor_w / h`, applied to dW/dq.
    factor_dw: f32,
}

impl Kernel {
    pub fn new(kind: KernelKind, smoothing_length: f32, dimension: usize) -> Result<Self> {
        if !(smoothing_length.is_finite() && smoothing_length > 0.0) {
            return Err(Error::InvalidParam(format!(
                "smoothing length must be positive and finite, got {}",
                smoothing_length
            )));
        }
        let h = smoothing_length;
        let factor_w = match (kind, dimension) {
            (KernelKind::WendlandC2, 1) => 3.0 / (4.0 * h),
            (KernelKind::WendlandC2, 2) => 7.0 / (4.0 * PI * h * h),
            (KernelKind::WendlandC2, 3) => 21.0 / (16.0 * PI * h * h * h),
            (KernelKind::CubicSpline, 1) => 2.0 / (3.0 * h),
            (KernelKind::CubicSpline, 2) => 10.0 / (7.0 * PI * h * h),
            (KernelKind::CubicSpline, 3) => 1.0 / (PI * h * h * h),
            (_, d) => {
                return Err(Error::InvalidParam(format!(
                    "kernel dimension must be 1, 2 or 3, got {}",
                    d
                )))
            }
        };
        Ok(Self {
            kind,
            dimension,
            h,
            inv_h: 1.0 / h,
            cutoff: KERNEL_SIZE * h,
            factor_w,
            factor_dw: factor_w / h,
        })
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn smoothing_length(&self) -> f32 {
        self.h
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn cutoff_radius(&self) -> f32 {
        self.cutoff
    }

    /// Cutoff of a particle whose smoothing length is `h / h_ratio`.
    #[inline]
    pub fn cutoff_radius_with_ratio(&self, h_ratio: f32) -> f32 {
        self.cutoff / h_ratio
    }

    #[inline]
    fn shape(&self, q: f32) -> f32 {
        match self.kind {
            KernelKind::WendlandC2 => {
                let t = 1.0 - 0.5 * q;
                let t2 = t * t;
                t2 * t2 * (1.0 + 2.0 * q)
            }
            KernelKind::CubicSpline => {
                if q < 1.0 {
                    1.0 - 1.5 * q * q + 0.75 * q * q * q
                } else {
                    let t = 2.0 - q;
                    0.25 * t * t * t
                }
            }
        }
    }

    #[inline]
    fn shape_derivative(&self, q: f32) -> f32 {
        match self.kind {
            KernelKind::WendlandC2 => {
                let t = 1.0 - 0.5 * q;
                -5.0 * q * t * t * t
            }
            KernelKind::CubicSpline => {
                if q < 1.0 {
                    -3.0 * q + 2.25 * q * q
                } else {
                    let t = 2.0 - q;
                    -0.75 * t * t
                }
            }
        }
    }

    /// Kernel value W(r).
    #[inline]
    pub fn w(&self, r: f32) -> f32 {
        let q = r * self.inv_h;
        if q >= KERNEL_SIZE {
            return 0.0;
        }
        self.factor_w * self.shape(q)
    }

    /// Radial derivative dW/dr (non-positive).
    #[inline]
    pub fn dw(&self, r: f32) -> f32 {
        let q = r * self.inv_h;
        if q >= KERNEL_SIZE {
            return 0.0;
        }
        self.factor_dw * self.shape_derivative(q)
    }

    /// W(r) for smoothing length `h / h_ratio`.
    #[inline]
    pub fn w_with_ratio(&self, h_ratio: f32, r: f32) -> f32 {
        h_ratio.powi(self.dimension as i32) * self.w(r * h_ratio)
    }

    /// dW/dr for smoothing length `h / h_ratio`.
    #[inline]
    pub fn dw_with_ratio(&self, h_ratio: f32, r: f32) -> f32 {
        h_ratio.powi(self.dimension as i32 + 1) * self.dw(r * h_ratio)
    }
}
