use std::any::Any;

use crate::equations::derivative::Accumulated;
use crate::equations::derivative::BufferKind;
use crate::equations::derivative::Derivative;
use crate::equations::derivative::Phase;
use crate::finders::NeighborRecord;
use crate::geometry::Tensor;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// `∇·v` summed over all neighbors; the compression measure used by
/// the artificial viscosities, the Balsara switch and the adaptive
/// smoothing length. Asymmetric: evaluated per particle over its full
/// neighbor list during the precompute phase.
#[derive(PartialEq)]
pub struct VelocityDivergence;

impl Derivative for VelocityDivergence {
    fn phase(&self) -> Phase {
        Phase::Precompute
    }

    fn symmetric(&self) -> bool {
        false
    }

    fn create(&self, results: &mut Accumulated) {
        results.insert::<Float>(
            QuantityId::VelocityDivergence,
            OrderEnum::Zero,
            BufferKind::Unique,
            Phase::Precompute,
        );
    }

    fn eval(
        &self,
        input: &Storage,
        results: &mut Accumulated,
        i: usize,
        neighs: &[NeighborRecord],
        grads: &[Float],
    ) {
        let r = input.values::<Vector>(QuantityId::Position);
        let v = input.dt::<Vector>(QuantityId::Position);
        let m = input.values::<Float>(QuantityId::Mass);
        let rho = input.values::<Float>(QuantityId::Density);
        let divv = results.values_mut::<Float>(QuantityId::VelocityDivergence);

        for (neigh, &grad) in neighs.iter().zip(grads) {
            let j = neigh.index;
            divv[i] += m[j] / rho[j] * (v[j] - v[i]).dot((r[i] - r[j]) * grad);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Derivative) -> bool {
        other.as_any().downcast_ref::<Self>().is_some()
    }
}

/// `∇×v`, needed by the Balsara switch to detect shear flows.
#[derive(PartialEq)]
pub struct VelocityRotation;

impl Derivative for VelocityRotation {
    fn phase(&self) -> Phase {
        Phase::Precompute
    }

    fn symmetric(&self) -> bool {
        false
    }

    fn create(&self, results: &mut Accumulated) {
        results.insert::<Vector>(
            QuantityId::VelocityRotation,
            OrderEnum::Zero,
            BufferKind::Unique,
            Phase::Precompute,
        );
    }

    fn eval(
        &self,
        input: &Storage,
        results: &mut Accumulated,
        i: usize,
        neighs: &[NeighborRecord],
        grads: &[Float],
    ) {
        let r = input.values::<Vector>(QuantityId::Position);
        let v = input.dt::<Vector>(QuantityId::Position);
        let m = input.values::<Float>(QuantityId::Mass);
        let rho = input.values::<Float>(QuantityId::Density);
        let rotv = results.values_mut::<Vector>(QuantityId::VelocityRotation);

        for (neigh, &grad) in neighs.iter().zip(grads) {
            let j = neigh.index;
            rotv[i] += (v[j] - v[i]).cross((r[i] - r[j]) * grad) * (m[j] / rho[j]);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Derivative) -> bool {
        other.as_any().downcast_ref::<Self>().is_some()
    }
}

/// Full velocity gradient tensor, the input of the strain-rate and
/// rotation-rate terms of the stress evolution.
#[derive(PartialEq)]
pub struct VelocityGradient;

impl Derivative for VelocityGradient {
    fn phase(&self) -> Phase {
        Phase::Precompute
    }

    fn symmetric(&self) -> bool {
        false
    }

    fn create(&self, results: &mut Accumulated) {
        results.insert::<Tensor>(
            QuantityId::VelocityGradient,
            OrderEnum::Zero,
            BufferKind::Unique,
            Phase::Precompute,
        );
    }

    fn eval(
        &self,
        input: &Storage,
        results: &mut Accumulated,
        i: usize,
        neighs: &[NeighborRecord],
        grads: &[Float],
    ) {
        let r = input.values::<Vector>(QuantityId::Position);
        let v = input.dt::<Vector>(QuantityId::Position);
        let m = input.values::<Float>(QuantityId::Mass);
        let rho = input.values::<Float>(QuantityId::Density);
        let gradv = results.values_mut::<Tensor>(QuantityId::VelocityGradient);

        for (neigh, &grad) in neighs.iter().zip(grads) {
            let j = neigh.index;
            let grad_ij = (r[i] - r[j]) * grad;
            gradv[i] += Tensor::outer((v[j] - v[i]) * (m[j] / rho[j]), grad_ij);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Derivative) -> bool {
        other.as_any().downcast_ref::<Self>().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::derivative::PHASES;
    use crate::test_utils::gas_lattice_storage;
    use crate::test_utils::run_single_derivative;

    #[test]
    fn diverging_flow_has_positive_divergence() {
        let mut storage = gas_lattice_storage(5, 1.0);
        storage
            .insert(QuantityId::VelocityDivergence, OrderEnum::Zero, 0.0)
            .unwrap();
        let r = storage.values::<Vector>(QuantityId::Position).to_vec();
        for (v, pos) in storage
            .dt_mut::<Vector>(QuantityId::Position)
            .iter_mut()
            .zip(&r)
        {
            *v = *pos * 0.5;
            v.set_h(0.0);
        }
        run_single_derivative(&mut storage, Box::new(VelocityDivergence), PHASES[0]);
        let divv = storage.values::<Float>(QuantityId::VelocityDivergence);
        // v = 0.5 r has divergence 1.5 everywhere; the SPH estimate is
        // noisy at the lattice boundary but solid in the interior
        let center = divv[divv.len() / 2];
        assert!((center - 1.5).abs() < 0.3, "divv = {}", center);
    }

    #[test]
    fn rigid_rotation_has_no_divergence_but_curl() {
        let mut storage = gas_lattice_storage(5, 1.0);
        storage
            .insert(QuantityId::VelocityDivergence, OrderEnum::Zero, 0.0)
            .unwrap();
        storage
            .insert(QuantityId::VelocityRotation, OrderEnum::Zero, Vector::ZERO)
            .unwrap();
        let r = storage.values::<Vector>(QuantityId::Position).to_vec();
        let omega = Vector::new(0.0, 0.0, 1.0);
        for (v, pos) in storage
            .dt_mut::<Vector>(QuantityId::Position)
            .iter_mut()
            .zip(&r)
        {
            *v = omega.cross(*pos);
        }
        run_single_derivative(&mut storage, Box::new(VelocityDivergence), PHASES[0]);
        run_single_derivative(&mut storage, Box::new(VelocityRotation), PHASES[0]);
        let divv = storage.values::<Float>(QuantityId::VelocityDivergence);
        let rotv = storage.values::<Vector>(QuantityId::VelocityRotation);
        let center = divv.len() / 2;
        assert!(divv[center].abs() < 0.1);
        assert!(rotv[center].length() > 1.0);
    }
}
