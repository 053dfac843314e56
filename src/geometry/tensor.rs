use std::f64::consts::PI;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::Neg;
use std::ops::Sub;
use std::ops::SubAssign;

use serde::Deserialize;
use serde::Serialize;

use crate::geometry::Vector;
use crate::prelude::Float;

/// General second-order tensor, stored as three row vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    rows: [Vector; 3],
}

impl Tensor {
    pub const ZERO: Self = Self {
        rows: [Vector::ZERO; 3],
    };

    pub fn new(rows: [Vector; 3]) -> Self {
        Self { rows }
    }

    pub fn identity() -> Self {
        Self {
            rows: [
                Vector::new(1.0, 0.0, 0.0),
                Vector::new(0.0, 1.0, 0.0),
                Vector::new(0.0, 0.0, 1.0),
            ],
        }
    }

    /// Outer product `a ⊗ b`.
    pub fn outer(a: Vector, b: Vector) -> Self {
        Self {
            rows: [b * a.x(), b * a.y(), b * a.z()],
        }
    }

    pub fn row(&self, i: usize) -> Vector {
        self.rows[i]
    }

    pub fn component(&self, i: usize, j: usize) -> Float {
        self.rows[i][j]
    }

    pub fn transpose(&self) -> Self {
        let mut result = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                result.rows[i][j] = self.rows[j][i];
            }
        }
        result
    }

    pub fn trace(&self) -> Float {
        self.rows[0].x() + self.rows[1].y() + self.rows[2].z()
    }

    pub fn determinant(&self) -> Float {
        self.rows[0].dot(self.rows[1].cross(self.rows[2]))
    }

    /// Principal invariants `(I1, I2, I3)` of the tensor.
    pub fn invariants(&self) -> (Float, Float, Float) {
        let i1 = self.trace();
        let sqr = *self * *self;
        let i2 = 0.5 * (i1 * i1 - sqr.trace());
        (i1, i2, self.determinant())
    }

    pub fn ddot(&self, other: &Self) -> Float {
        self.rows[0].dot(other.rows[0])
            + self.rows[1].dot(other.rows[1])
            + self.rows[2].dot(other.rows[2])
    }

    pub fn apply(&self, v: Vector) -> Vector {
        Vector::new(self.rows[0].dot(v), self.rows[1].dot(v), self.rows[2].dot(v))
    }

    /// Symmetric part `(T + Tᵀ)/2`.
    pub fn symmetrize(&self) -> SymTensor {
        SymTensor::new(
            Vector::new(self.rows[0].x(), self.rows[1].y(), self.rows[2].z()),
            Vector::new(
                0.5 * (self.rows[0].y() + self.rows[1].x()),
                0.5 * (self.rows[0].z() + self.rows[2].x()),
                0.5 * (self.rows[1].z() + self.rows[2].y()),
            ),
        )
    }

    /// Antisymmetric part `(T - Tᵀ)/2`.
    pub fn antisymmetrize(&self) -> Self {
        (*self - self.transpose()) * 0.5
    }

    pub fn is_finite(&self) -> bool {
        self.rows.iter().all(|r| r.is_finite())
    }
}

impl Add for Tensor {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            rows: [
                self.rows[0] + other.rows[0],
                self.rows[1] + other.rows[1],
                self.rows[2] + other.rows[2],
            ],
        }
    }
}

impl Sub for Tensor {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            rows: [
                self.rows[0] - other.rows[0],
                self.rows[1] - other.rows[1],
                self.rows[2] - other.rows[2],
            ],
        }
    }
}

impl Mul<Float> for Tensor {
    type Output = Self;

    fn mul(self, factor: Float) -> Self {
        Self {
            rows: [
                self.rows[0] * factor,
                self.rows[1] * factor,
                self.rows[2] * factor,
            ],
        }
    }
}

/// Matrix product.
impl Mul<Tensor> for Tensor {
    type Output = Tensor;

    fn mul(self, other: Tensor) -> Tensor {
        let t = other.transpose();
        let mut result = Tensor::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                result.rows[i][j] = self.rows[i].dot(t.rows[j]);
            }
        }
        result
    }
}

impl AddAssign for Tensor {
    fn add_assign(&mut self, other: Self) {
        for i in 0..3 {
            self.rows[i] += other.rows[i];
        }
    }
}

/// Symmetric second-order tensor, stored as the diagonal and the
/// off-diagonal components `(xy, xz, yz)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SymTensor {
    diag: Vector,
    off: Vector,
}

impl SymTensor {
    pub const ZERO: Self = Self {
        diag: Vector::ZERO,
        off: Vector::ZERO,
    };

    pub fn new(diag: Vector, off: Vector) -> Self {
        Self { diag, off }
    }

    pub fn identity() -> Self {
        Self {
            diag: Vector::new(1.0, 1.0, 1.0),
            off: Vector::ZERO,
        }
    }

    /// Symmetrized outer product `(a ⊗ b + b ⊗ a)/2`.
    pub fn outer(a: Vector, b: Vector) -> Self {
        Self {
            diag: Vector::new(a.x() * b.x(), a.y() * b.y(), a.z() * b.z()),
            off: Vector::new(
                0.5 * (a.x() * b.y() + a.y() * b.x()),
                0.5 * (a.x() * b.z() + a.z() * b.x()),
                0.5 * (a.y() * b.z() + a.z() * b.y()),
            ),
        }
    }

    pub fn diagonal(&self) -> Vector {
        self.diag
    }

    pub fn off_diagonal(&self) -> Vector {
        self.off
    }

    pub fn component(&self, i: usize, j: usize) -> Float {
        if i == j {
            self.diag[i]
        } else {
            // map (0,1)->xy, (0,2)->xz, (1,2)->yz
            self.off[i + j - 1]
        }
    }

    pub fn trace(&self) -> Float {
        self.diag.x() + self.diag.y() + self.diag.z()
    }

    pub fn determinant(&self) -> Float {
        let (d, o) = (self.diag, self.off);
        d.x() * (d.y() * d.z() - o.z() * o.z()) - o.x() * (o.x() * d.z() - o.z() * o.y())
            + o.y() * (o.x() * o.z() - d.y() * o.y())
    }

    pub fn ddot(&self, other: &Self) -> Float {
        self.diag.dot(other.diag) + 2.0 * self.off.dot(other.off)
    }

    pub fn apply(&self, v: Vector) -> Vector {
        Vector::new(
            self.diag.x() * v.x() + self.off.x() * v.y() + self.off.y() * v.z(),
            self.off.x() * v.x() + self.diag.y() * v.y() + self.off.z() * v.z(),
            self.off.y() * v.x() + self.off.z() * v.y() + self.diag.z() * v.z(),
        )
    }

    /// Principal invariants `(I1, I2, I3)`.
    pub fn invariants(&self) -> (Float, Float, Float) {
        let i1 = self.trace();
        let i2 = self.diag.x() * self.diag.y() + self.diag.x() * self.diag.z()
            + self.diag.y() * self.diag.z()
            - self.off.length_sqr();
        (i1, i2, self.determinant())
    }

    /// Eigenvalues in descending order, computed analytically from the
    /// characteristic polynomial (Cardano). Exact for exactly diagonal
    /// input, stable for the nearly-singular tensors produced by damaged
    /// particles.
    pub fn eigenvalues(&self) -> [Float; 3] {
        let (i1, i2, _) = self.invariants();
        if self.off.length_sqr() < 1.0e-30 * (1.0 + self.diag.length_sqr()) {
            let mut eigen = [self.diag.x(), self.diag.y(), self.diag.z()];
            eigen.sort_by(|a, b| b.partial_cmp(a).unwrap());
            return eigen;
        }
        // shift by the mean to get a traceless tensor with p q from Cardano
        let mean = i1 / 3.0;
        let p = (i1 * i1 / 3.0 - i2).max(0.0);
        let shifted = *self - SymTensor::identity() * mean;
        let q = shifted.determinant();
        let sqrt_p = (p / 3.0).sqrt().max(Float::MIN_POSITIVE);
        let arg = (1.5 * q / (p * sqrt_p)).clamp(-1.0, 1.0);
        let phi = arg.acos() / 3.0;
        let e1 = mean + 2.0 * sqrt_p * phi.cos();
        let e3 = mean + 2.0 * sqrt_p * (phi + 2.0 * PI / 3.0).cos();
        let e2 = 3.0 * mean - e1 - e3;
        let mut eigen = [e1, e2, e3];
        eigen.sort_by(|a, b| b.partial_cmp(a).unwrap());
        eigen
    }

    pub fn max_eigenvalue(&self) -> Float {
        self.eigenvalues()[0]
    }

    pub fn is_finite(&self) -> bool {
        self.diag.is_finite() && self.off.is_finite()
    }
}

impl Add for SymTensor {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            diag: self.diag + other.diag,
            off: self.off + other.off,
        }
    }
}

impl Sub for SymTensor {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            diag: self.diag - other.diag,
            off: self.off - other.off,
        }
    }
}

impl Mul<Float> for SymTensor {
    type Output = Self;

    fn mul(self, factor: Float) -> Self {
        Self {
            diag: self.diag * factor,
            off: self.off * factor,
        }
    }
}

impl AddAssign for SymTensor {
    fn add_assign(&mut self, other: Self) {
        self.diag += other.diag;
        self.off += other.off;
    }
}

impl SubAssign for SymTensor {
    fn sub_assign(&mut self, other: Self) {
        self.diag -= other.diag;
        self.off -= other.off;
    }
}

impl Neg for SymTensor {
    type Output = Self;

    fn neg(self) -> Self {
        self * -1.0
    }
}

impl From<SymTensor> for Tensor {
    fn from(t: SymTensor) -> Tensor {
        Tensor::new([
            Vector::new(t.diag.x(), t.off.x(), t.off.y()),
            Vector::new(t.off.x(), t.diag.y(), t.off.z()),
            Vector::new(t.off.y(), t.off.z(), t.diag.z()),
        ])
    }
}

/// Symmetric traceless second-order tensor. Only five independent
/// components are stored; `zz` is reconstructed as `-xx - yy`, which
/// keeps `trace = 0` as a representation invariant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TracelessTensor {
    xx: Float,
    yy: Float,
    xy: Float,
    xz: Float,
    yz: Float,
}

impl TracelessTensor {
    pub const ZERO: Self = Self {
        xx: 0.0,
        yy: 0.0,
        xy: 0.0,
        xz: 0.0,
        yz: 0.0,
    };

    pub fn new(xx: Float, yy: Float, xy: Float, xz: Float, yz: Float) -> Self {
        Self { xx, yy, xy, xz, yz }
    }

    /// Projects a symmetric tensor onto its traceless part.
    pub fn traceless_part(t: SymTensor) -> Self {
        let third = t.trace() / 3.0;
        Self {
            xx: t.diagonal().x() - third,
            yy: t.diagonal().y() - third,
            xy: t.off_diagonal().x(),
            xz: t.off_diagonal().y(),
            yz: t.off_diagonal().z(),
        }
    }

    pub fn diagonal(&self) -> Vector {
        Vector::new(self.xx, self.yy, -self.xx - self.yy)
    }

    pub fn off_diagonal(&self) -> Vector {
        Vector::new(self.xy, self.xz, self.yz)
    }

    pub fn component(&self, i: usize, j: usize) -> Float {
        if i == j {
            self.diagonal()[i]
        } else {
            self.off_diagonal()[i + j - 1]
        }
    }

    pub fn ddot(&self, other: &Self) -> Float {
        self.diagonal().dot(other.diagonal())
            + 2.0 * self.off_diagonal().dot(other.off_diagonal())
    }

    pub fn apply(&self, v: Vector) -> Vector {
        SymTensor::from(*self).apply(v)
    }

    pub fn eigenvalues(&self) -> [Float; 3] {
        SymTensor::from(*self).eigenvalues()
    }

    /// Second invariant `J₂ = ½ S:S` of a deviatoric stress.
    pub fn second_invariant(&self) -> Float {
        0.5 * self.ddot(self)
    }

    pub fn max_abs_element(&self) -> Float {
        self.diagonal()
            .abs()
            .max_element()
            .max(self.off_diagonal().abs().max_element())
    }

    pub fn is_finite(&self) -> bool {
        self.xx.is_finite()
            && self.yy.is_finite()
            && self.xy.is_finite()
            && self.xz.is_finite()
            && self.yz.is_finite()
    }
}

impl Add for TracelessTensor {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            xx: self.xx + other.xx,
            yy: self.yy + other.yy,
            xy: self.xy + other.xy,
            xz: self.xz + other.xz,
            yz: self.yz + other.yz,
        }
    }
}

impl Sub for TracelessTensor {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + other * -1.0
    }
}

impl Mul<Float> for TracelessTensor {
    type Output = Self;

    fn mul(self, factor: Float) -> Self {
        Self {
            xx: self.xx * factor,
            yy: self.yy * factor,
            xy: self.xy * factor,
            xz: self.xz * factor,
            yz: self.yz * factor,
        }
    }
}

impl AddAssign for TracelessTensor {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl From<TracelessTensor> for SymTensor {
    fn from(t: TracelessTensor) -> SymTensor {
        SymTensor::new(t.diagonal(), t.off_diagonal())
    }
}
