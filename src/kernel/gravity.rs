use std::f64::consts::PI;

use crate::kernel::Kernel;
use crate::prelude::Float;

const LUT_SIZE: usize = 4096;

/// Softened gravity kernel derived from an SPH kernel: the point mass
/// is smeared over the kernel support, which removes the `1/r²`
/// singularity while keeping the exact Newtonian form beyond `κh`.
///
/// Both tables are continuous and differentiable across the support
/// boundary: the enclosed-mass fraction reaches one and the potential
/// matches `-1/r` there.
#[derive(Clone)]
pub struct GravityLutKernel {
    radius: Float,
    /// Fraction of the smeared mass enclosed within `q`, `M̂(q)`.
    enclosed_mass: Vec<Float>,
    /// Dimensionless potential `ψ(q)` with `φ(r) = G m ψ(q)/h`.
    potential: Vec<Float>,
}

impl GravityLutKernel {
    pub fn new(kernel: impl Kernel) -> Self {
        let radius = kernel.radius();
        let dq = radius / (LUT_SIZE - 1) as Float;
        // M̂(q) = 4π ∫₀^q w(s) s² ds by the midpoint rule
        let mut enclosed_mass = Vec::with_capacity(LUT_SIZE);
        let mut running = 0.0;
        enclosed_mass.push(0.0);
        for i in 1..LUT_SIZE {
            let s = (i as Float - 0.5) * dq;
            running += 4.0 * PI * kernel.value_impl(s * s) * s * s * dq;
            enclosed_mass.push(running);
        }
        let total = *enclosed_mass.last().unwrap();
        debug_assert!((total - 1.0).abs() < 1.0e-2);
        for value in &mut enclosed_mass {
            *value /= total;
        }
        // ψ(q) = -M̂(q)/q - 4π ∫_q^R w(s) s ds
        let mut outer = 0.0;
        let mut potential = vec![0.0; LUT_SIZE];
        potential[LUT_SIZE - 1] = -1.0 / radius;
        for i in (0..LUT_SIZE - 1).rev() {
            let s = (i as Float + 0.5) * dq;
            outer += 4.0 * PI * kernel.value_impl(s * s) * s * dq / total;
            let q = i as Float * dq;
            let inner = if q > 0.0 { enclosed_mass[i] / q } else { 0.0 };
            potential[i] = -inner - outer;
        }
        Self {
            radius,
            enclosed_mass,
            potential,
        }
    }

    pub fn radius(&self) -> Float {
        self.radius
    }

    fn interpolate(table: &[Float], q: Float, radius: Float) -> Float {
        let floor = q / radius * (LUT_SIZE - 1) as Float;
        let index = floor as usize;
        if index + 1 >= table.len() {
            return table[table.len() - 1];
        }
        let weight = floor - index as Float;
        table[index] * (1.0 - weight) + table[index + 1] * weight
    }

    /// Potential per unit `G m`: `φ(r) = G m · value(r, h)`.
    pub fn value(&self, r: Float, h: Float) -> Float {
        debug_assert!(h > 0.0 && r >= 0.0);
        let q = r / h;
        if q >= self.radius {
            return -1.0 / r;
        }
        Self::interpolate(&self.potential, q, self.radius) / h
    }

    /// Acceleration factor: `a = -G m (r_i - r_j) · grad(r, h)`, which
    /// reduces to `1/r³` outside the support.
    pub fn grad(&self, r: Float, h: Float) -> Float {
        debug_assert!(h > 0.0);
        let q = r / h;
        if q >= self.radius {
            return 1.0 / (r * r * r);
        }
        if r <= 0.0 {
            return 0.0;
        }
        Self::interpolate(&self.enclosed_mass, q, self.radius) / (r * r * r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::CubicSpline;

    #[test]
    fn newtonian_outside_the_support() {
        let kernel = GravityLutKernel::new(CubicSpline);
        let r = 5.0;
        assert!((kernel.value(r, 1.0) + 1.0 / r).abs() < 1.0e-12);
        assert!((kernel.grad(r, 1.0) - 1.0 / (r * r * r)).abs() < 1.0e-12);
    }

    #[test]
    fn continuous_across_the_boundary() {
        let kernel = GravityLutKernel::new(CubicSpline);
        let r = kernel.radius() - 1.0e-9;
        assert!((kernel.value(r, 1.0) + 1.0 / kernel.radius()).abs() < 1.0e-3);
        assert!(
            (kernel.grad(r, 1.0) - 1.0 / (r * r * r)).abs() < 1.0e-3,
            "enclosed mass must reach one at the support boundary"
        );
    }

    #[test]
    fn finite_at_the_origin() {
        let kernel = GravityLutKernel::new(CubicSpline);
        assert_eq!(kernel.grad(0.0, 1.0), 0.0);
        assert!(kernel.value(0.0, 1.0).is_finite());
        assert!(kernel.value(0.0, 1.0) < 0.0);
    }
}
