use std::iter::Sum;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Div;
use std::ops::DivAssign;
use std::ops::Index;
use std::ops::IndexMut;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::Neg;
use std::ops::Sub;
use std::ops::SubAssign;

use derive_more::From;
use derive_more::Into;
use glam::DVec4;
use serde::Deserialize;
use serde::Serialize;

use crate::prelude::Float;

/// Index of the smoothing length within a position vector.
pub const H: usize = 3;

/// Four-component vector of an SPH particle. The first three components
/// are the Cartesian coordinates, the fourth carries the smoothing
/// length `h` for position vectors and zero otherwise.
///
/// Linear arithmetic acts on all four lanes, so the smoothing length is
/// advected together with the position by any integrator that only ever
/// forms linear combinations of vectors. Geometric operations (dot
/// product, length, distance) act on the spatial part only.
#[derive(Clone, Copy, Debug, Default, PartialEq, From, Into, Serialize, Deserialize)]
pub struct Vector(pub(crate) DVec4);

impl Vector {
    pub const ZERO: Self = Self(DVec4::ZERO);

    pub fn new(x: Float, y: Float, z: Float) -> Self {
        Self(DVec4::new(x, y, z, 0.0))
    }

    pub fn with_h(x: Float, y: Float, z: Float, h: Float) -> Self {
        Self(DVec4::new(x, y, z, h))
    }

    pub fn splat(v: Float) -> Self {
        Self(DVec4::new(v, v, v, 0.0))
    }

    pub fn unit(axis: usize) -> Self {
        let mut v = Self::ZERO;
        v[axis] = 1.0;
        v
    }

    pub fn x(&self) -> Float {
        self.0.x
    }

    pub fn y(&self) -> Float {
        self.0.y
    }

    pub fn z(&self) -> Float {
        self.0.z
    }

    /// The smoothing length carried in the fourth component.
    pub fn h(&self) -> Float {
        self.0.w
    }

    pub fn set_h(&mut self, h: Float) {
        self.0.w = h;
    }

    /// Dot product over the spatial components.
    pub fn dot(&self, other: Self) -> Float {
        self.0.truncate().dot(other.0.truncate())
    }

    pub fn cross(&self, other: Self) -> Self {
        let c = self.0.truncate().cross(other.0.truncate());
        Self::new(c.x, c.y, c.z)
    }

    pub fn length_sqr(&self) -> Float {
        self.dot(*self)
    }

    pub fn length(&self) -> Float {
        self.length_sqr().sqrt()
    }

    pub fn distance_sqr(&self, other: Self) -> Float {
        (*self - other).length_sqr()
    }

    pub fn distance(&self, other: Self) -> Float {
        self.distance_sqr(other).sqrt()
    }

    pub fn normalized(&self) -> Self {
        debug_assert!(self.length() > 0.0);
        *self / self.length()
    }

    /// Componentwise minimum over all four lanes.
    pub fn min(&self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Componentwise maximum over all four lanes.
    pub fn max(&self, other: Self) -> Self {
        Self(self.0.max(other.0))
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn max_element(&self) -> Float {
        self.x().max(self.y()).max(self.z())
    }

    pub fn min_element(&self) -> Float {
        self.x().min(self.y()).min(self.z())
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }

    /// Componentwise product over the spatial lanes.
    pub fn volume(&self) -> Float {
        self.x() * self.y() * self.z()
    }
}

impl Index<usize> for Vector {
    type Output = Float;

    fn index(&self, index: usize) -> &Float {
        &self.0[index]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, index: usize) -> &mut Float {
        &mut self.0[index]
    }
}

impl Add for Vector {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Vector {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Neg for Vector {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Mul<Float> for Vector {
    type Output = Self;

    fn mul(self, factor: Float) -> Self {
        Self(self.0 * factor)
    }
}

impl Mul<Vector> for Float {
    type Output = Vector;

    fn mul(self, vector: Vector) -> Vector {
        Vector(vector.0 * self)
    }
}

impl Div<Float> for Vector {
    type Output = Self;

    fn div(self, factor: Float) -> Self {
        Self(self.0 / factor)
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl SubAssign for Vector {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl MulAssign<Float> for Vector {
    fn mul_assign(&mut self, factor: Float) {
        self.0 *= factor;
    }
}

impl DivAssign<Float> for Vector {
    fn div_assign(&mut self, factor: Float) {
        self.0 /= factor;
    }
}

impl Sum for Vector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_float_is_close;

    #[test]
    fn dot_product_ignores_smoothing_length() {
        let a = Vector::with_h(1.0, 2.0, 3.0, 10.0);
        let b = Vector::with_h(4.0, 5.0, 6.0, 20.0);
        assert_float_is_close(a.dot(b), 32.0);
        assert_float_is_close(a.length_sqr(), 14.0);
    }

    #[test]
    fn arithmetic_advects_smoothing_length() {
        let r = Vector::with_h(1.0, 0.0, 0.0, 2.0);
        let v = Vector::with_h(0.0, 1.0, 0.0, -0.5);
        let advanced = r + v * 2.0;
        assert_float_is_close(advanced.h(), 1.0);
        assert_float_is_close(advanced.y(), 2.0);
    }

    #[test]
    fn cross_product() {
        let a = Vector::new(1.0, 0.0, 0.0);
        let b = Vector::new(0.0, 1.0, 0.0);
        let c = a.cross(b);
        assert_float_is_close(c.z(), 1.0);
        assert_float_is_close(c.x(), 0.0);
    }
}
