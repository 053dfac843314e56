mod gravity;

use std::f64::consts::PI;

use once_cell::sync::Lazy;

pub use gravity::GravityLutKernel;

use crate::prelude::Float;

/// Shared table of the default kernel, so short-lived solvers and
/// diagnostics do not rebuild it.
static STANDARD_KERNEL: Lazy<LutKernel> = Lazy::new(|| LutKernel::new(CubicSpline));

pub fn standard_kernel() -> &'static LutKernel {
    &STANDARD_KERNEL
}

/// A compactly supported radial smoothing function. Implementors
/// provide the dimensionless profile `w(q)` with `q = r/h`; the trait
/// supplies the dimensionful value and gradient.
///
/// The gradient convention avoids a square root in the inner loop:
/// `grad` returns the scalar `g` such that `∇W = (r_i - r_j) · g`.
pub trait Kernel: Send + Sync {
    /// Support radius in units of the smoothing length.
    fn radius(&self) -> Float;

    /// Dimensionless kernel value as a function of `q²`.
    fn value_impl(&self, q_sqr: Float) -> Float;

    /// Dimensionless `w'(q)/q` as a function of `q²`. Finite at the
    /// origin for all implemented kernels.
    fn grad_impl(&self, q_sqr: Float) -> Float;

    fn value(&self, r: Float, h: Float) -> Float {
        debug_assert!(h > 0.0);
        let q_sqr = r * r / (h * h);
        if q_sqr >= self.radius() * self.radius() {
            return 0.0;
        }
        self.value_impl(q_sqr) / h.powi(3)
    }

    fn grad(&self, r: Float, h: Float) -> Float {
        debug_assert!(h > 0.0);
        let q_sqr = r * r / (h * h);
        if q_sqr >= self.radius() * self.radius() {
            return 0.0;
        }
        self.grad_impl(q_sqr) / h.powi(5)
    }
}

/// Cubic spline kernel, Monaghan & Lattanzio (1985).
#[derive(Clone, Copy, Debug, Default)]
pub struct CubicSpline;

impl Kernel for CubicSpline {
    fn radius(&self) -> Float {
        2.0
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        let sigma = 1.0 / PI;
        if q < 1.0 {
            sigma * (1.0 - 1.5 * q * q + 0.75 * q * q * q)
        } else if q < 2.0 {
            0.25 * sigma * (2.0 - q).powi(3)
        } else {
            0.0
        }
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        let sigma = 1.0 / PI;
        if q < 1.0 {
            sigma * (-3.0 + 2.25 * q)
        } else if q < 2.0 {
            // w'(q)/q with w' = -3σ/4 (2-q)²
            -0.75 * sigma * (2.0 - q).powi(2) / q
        } else {
            0.0
        }
    }
}

/// Wendland C2 kernel (Wendland 1995, Dehnen & Aly 2012).
#[derive(Clone, Copy, Debug, Default)]
pub struct WendlandC2;

impl Kernel for WendlandC2 {
    fn radius(&self) -> Float {
        2.0
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        if q >= 2.0 {
            return 0.0;
        }
        let sigma = 21.0 / (16.0 * PI);
        sigma * (1.0 - 0.5 * q).powi(4) * (1.0 + 2.0 * q)
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        if q >= 2.0 {
            return 0.0;
        }
        let sigma = 21.0 / (16.0 * PI);
        // w'(q) = -5σ q (1 - q/2)³
        -5.0 * sigma * (1.0 - 0.5 * q).powi(3)
    }
}

/// Wendland C4 kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct WendlandC4;

impl Kernel for WendlandC4 {
    fn radius(&self) -> Float {
        2.0
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        if q >= 2.0 {
            return 0.0;
        }
        let sigma = 495.0 / (256.0 * PI);
        sigma * (1.0 - 0.5 * q).powi(6) * (1.0 + 3.0 * q + 35.0 / 12.0 * q * q)
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        if q >= 2.0 {
            return 0.0;
        }
        let sigma = 495.0 / (256.0 * PI);
        let half = 1.0 - 0.5 * q;
        let w_prime = sigma
            * (half.powi(6) * (3.0 + 35.0 / 6.0 * q)
                - 3.0 * half.powi(5) * (1.0 + 3.0 * q + 35.0 / 12.0 * q * q));
        if q < 1.0e-12 {
            // limit of w'/q for q -> 0
            return -sigma * 14.0 / 3.0;
        }
        w_prime / q
    }
}

/// Gaussian kernel, truncated at `q = 3`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gaussian;

impl Kernel for Gaussian {
    fn radius(&self) -> Float {
        3.0
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        if q_sqr >= 9.0 {
            return 0.0;
        }
        PI.powf(-1.5) * (-q_sqr).exp()
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        if q_sqr >= 9.0 {
            return 0.0;
        }
        -2.0 * PI.powf(-1.5) * (-q_sqr).exp()
    }
}

const LUT_SIZE: usize = 8192;

/// Kernel with precomputed value and gradient tables, indexed by the
/// squared distance so the inner loop avoids the square root.
#[derive(Clone)]
pub struct LutKernel {
    radius: Float,
    radius_sqr: Float,
    values: Vec<Float>,
    grads: Vec<Float>,
}

impl LutKernel {
    pub fn new(kernel: impl Kernel) -> Self {
        let radius = kernel.radius();
        let radius_sqr = radius * radius;
        let mut values = Vec::with_capacity(LUT_SIZE);
        let mut grads = Vec::with_capacity(LUT_SIZE);
        for i in 0..LUT_SIZE {
            let q_sqr = radius_sqr * i as Float / (LUT_SIZE - 1) as Float;
            values.push(kernel.value_impl(q_sqr));
            grads.push(kernel.grad_impl(q_sqr));
        }
        // the last entry lies on the support boundary
        *values.last_mut().unwrap() = 0.0;
        *grads.last_mut().unwrap() = 0.0;
        Self {
            radius,
            radius_sqr,
            values,
            grads,
        }
    }

    fn interpolate(table: &[Float], floor: Float) -> Float {
        let index = floor as usize;
        if index + 1 >= table.len() {
            return table[table.len() - 1];
        }
        let weight = floor - index as Float;
        table[index] * (1.0 - weight) + table[index + 1] * weight
    }

    fn table_position(&self, q_sqr: Float) -> Float {
        q_sqr / self.radius_sqr * (LUT_SIZE - 1) as Float
    }
}

impl Kernel for LutKernel {
    fn radius(&self) -> Float {
        self.radius
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        if q_sqr >= self.radius_sqr {
            return 0.0;
        }
        Self::interpolate(&self.values, self.table_position(q_sqr))
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        if q_sqr >= self.radius_sqr {
            return 0.0;
        }
        Self::interpolate(&self.grads, self.table_position(q_sqr))
    }
}

/// Symmetrization adapter averaging kernel evaluations at the
/// smoothing lengths of both particles of a pair.
#[derive(Clone)]
pub struct SymmetrizedKernel<K> {
    kernel: K,
}

impl<K: Kernel> SymmetrizedKernel<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn radius(&self) -> Float {
        self.kernel.radius()
    }

    pub fn value(&self, r: Float, h_i: Float, h_j: Float) -> Float {
        0.5 * (self.kernel.value(r, h_i) + self.kernel.value(r, h_j))
    }

    pub fn grad(&self, r: Float, h_i: Float, h_j: Float) -> Float {
        0.5 * (self.kernel.grad(r, h_i) + self.kernel.grad(r, h_j))
    }
}

pub type SymmetrizedLutKernel = SymmetrizedKernel<LutKernel>;
