use std::ops::AddAssign;

use crate::geometry::SymTensor;
use crate::geometry::Vector;
use crate::prelude::Float;

/// Highest multipole order carried by a tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultipoleOrder {
    Monopole,
    Quadrupole,
}

/// Mass moments of a cluster of particles: total mass, center of mass
/// and the traceless quadrupole `Q_jk = Σ m (3 x_j x_k - r² δ_jk)`
/// about the center of mass.
#[derive(Clone, Debug, Default)]
pub struct MassMoments {
    total: Float,
    weighted_position_sum: Vector,
    /// Σ m (x ⊗ x) in world coordinates; shifted to the center of mass
    /// only when the quadrupole is requested.
    second_moment: SymTensor,
    count: usize,
}

impl MassMoments {
    pub fn total(&self) -> Float {
        self.total
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn center_of_mass(&self) -> Vector {
        if self.count == 0 {
            return Vector::ZERO;
        }
        self.weighted_position_sum / self.total
    }

    pub fn add_mass_at(&mut self, pos: &Vector, mass: Float) {
        self.count += 1;
        self.total += mass;
        self.weighted_position_sum += *pos * mass;
        self.second_moment += SymTensor::outer(*pos, *pos) * mass;
    }

    /// Traceless quadrupole about the center of mass.
    pub fn quadrupole(&self) -> SymTensor {
        if self.count == 0 || self.total == 0.0 {
            return SymTensor::ZERO;
        }
        let com = self.center_of_mass();
        // parallel-axis shift of the raw second moment
        let shifted = self.second_moment - SymTensor::outer(com, com) * self.total;
        let trace = shifted.trace();
        shifted * 3.0 - SymTensor::identity() * trace
    }

    /// Acceleration at `pos` from the multipole expansion of the
    /// cluster, per unit gravitational constant.
    pub fn evaluate(&self, pos: &Vector, order: MultipoleOrder) -> Vector {
        if self.count == 0 {
            return Vector::ZERO;
        }
        let dr = *pos - self.center_of_mass();
        let dist_sqr = dr.length_sqr();
        debug_assert!(dist_sqr > 0.0);
        let dist = dist_sqr.sqrt();
        let mut acc = dr * (-self.total / (dist_sqr * dist));
        if order == MultipoleOrder::Quadrupole {
            let q = self.quadrupole();
            let q_dr = q.apply(dr);
            let dr_q_dr = dr.dot(q_dr);
            let r5 = dist_sqr * dist_sqr * dist;
            let r7 = r5 * dist_sqr;
            acc += q_dr * (1.0 / r5) - dr * (2.5 * dr_q_dr / r7);
        }
        acc
    }
}

impl AddAssign<&MassMoments> for MassMoments {
    fn add_assign(&mut self, other: &MassMoments) {
        self.count += other.count;
        self.total += other.total;
        self.weighted_position_sum += other.weighted_position_sum;
        self.second_moment += other.second_moment;
    }
}

impl std::fmt::Display for MassMoments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Moments({:.3e} kg @ {:.3?})",
            self.total(),
            self.center_of_mass()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_mass_of_two_points() {
        let mut moments = MassMoments::default();
        moments.add_mass_at(&Vector::new(0.0, 0.0, 0.0), 1.0);
        moments.add_mass_at(&Vector::new(2.0, 0.0, 0.0), 3.0);
        let com = moments.center_of_mass();
        assert!((com.x() - 1.5).abs() < 1.0e-12);
        assert_eq!(moments.total(), 4.0);
    }

    #[test]
    fn quadrupole_of_a_point_mass_vanishes() {
        let mut moments = MassMoments::default();
        moments.add_mass_at(&Vector::new(1.0, 2.0, 3.0), 5.0);
        let q = moments.quadrupole();
        assert!(q.ddot(&q) < 1.0e-20);
    }

    #[test]
    fn quadrupole_improves_far_field() {
        // an elongated pair evaluated at a moderate distance: the
        // quadrupole correction must land closer to the exact force
        let mut moments = MassMoments::default();
        moments.add_mass_at(&Vector::new(-1.0, 0.0, 0.0), 1.0);
        moments.add_mass_at(&Vector::new(1.0, 0.0, 0.0), 1.0);
        let pos = Vector::new(0.0, 4.0, 0.0);
        let exact = {
            let a = pos - Vector::new(-1.0, 0.0, 0.0);
            let b = pos - Vector::new(1.0, 0.0, 0.0);
            a * (-1.0 / a.length().powi(3)) + b * (-1.0 / b.length().powi(3))
        };
        let mono = moments.evaluate(&pos, MultipoleOrder::Monopole);
        let quad = moments.evaluate(&pos, MultipoleOrder::Quadrupole);
        let mono_error = (mono - exact).length();
        let quad_error = (quad - exact).length();
        assert!(
            quad_error < 0.5 * mono_error,
            "{} vs {}",
            quad_error,
            mono_error
        );
    }
}
