use std::any::Any;

use crate::equations::derivative::Accumulated;
use crate::equations::derivative::BufferKind;
use crate::equations::derivative::Derivative;
use crate::equations::derivative::DerivativeHolder;
use crate::equations::derivative::Phase;
use crate::equations::EquationTerm;
use crate::error::Error;
use crate::finders::NeighborRecord;
use crate::geometry::Vector;
use crate::materials::Material;
use crate::prelude::Float;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Acceleration from the pressure gradient plus the matching specific
/// energy rate,
///
/// `dv_i/dt -= Σ_j m_j (p_i/ρ_i² + p_j/ρ_j²) ∇W_ij`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PressureForce;

#[derive(PartialEq)]
struct PressureGradient;

impl Derivative for PressureGradient {
    fn create(&self, results: &mut Accumulated) {
        results.insert::<Vector>(
            QuantityId::Position,
            OrderEnum::Second,
            BufferKind::Shared,
            Phase::Evaluate,
        );
        results.insert::<Float>(
            QuantityId::Energy,
            OrderEnum::First,
            BufferKind::Shared,
            Phase::Evaluate,
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
        let p = input.values::<Float>(QuantityId::Pressure);
        let (dv, du) = results.two_mut::<Vector, Float>(QuantityId::Position, QuantityId::Energy);

        let p_rho_i = p[i] / (rho[i] * rho[i]);
        for (neigh, &grad) in neighs.iter().zip(grads) {
            let j = neigh.index;
            let grad_ij = (r[i] - r[j]) * grad;
            let p_rho_j = p[j] / (rho[j] * rho[j]);
            let force = grad_ij * (p_rho_i + p_rho_j);
            dv[i] -= force * m[j];
            dv[j] += force * m[i];
            let heating = (v[i] - v[j]).dot(grad_ij);
            du[i] += p_rho_i * m[j] * heating;
            du[j] += p_rho_j * m[i] * heating;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Derivative) -> bool {
        other.as_any().downcast_ref::<Self>().is_some()
    }
}

impl EquationTerm for PressureForce {
    fn set_derivatives(&self, derivatives: &mut DerivativeHolder) {
        derivatives.require(Box::new(PressureGradient));
    }

    fn create(&self, storage: &mut Storage, material: &dyn Material) -> Result<(), Error> {
        if material.eos().is_none() {
            return Err(Error::InvalidSetup(
                "the pressure force needs a material with an equation of state".to_owned(),
            ));
        }
        // pressure and energy themselves are requested by the material
        debug_assert!(storage.has(QuantityId::Pressure));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::derivative::PHASES;
    use crate::test_utils::gas_lattice_storage;
    use crate::test_utils::run_single_derivative;

    #[test]
    fn uniform_pressure_field_yields_no_net_force() {
        // particles of a uniform lattice with equal pressure: every
        // interior particle must feel a negligible acceleration
        let mut storage = gas_lattice_storage(5, 1.0);
        storage.values_mut::<Float>(QuantityId::Pressure).fill(1.0);
        run_single_derivative(&mut storage, Box::new(PressureGradient), PHASES[1]);
        let dv = storage.d2t::<Vector>(QuantityId::Position);
        let center = dv[dv.len() / 2];
        // lattice center is symmetric, forces cancel
        assert!(center.length() < 1.0e-9, "residual force {:?}", center);
    }

    #[test]
    fn momentum_is_conserved_pairwise() {
        let mut storage = gas_lattice_storage(4, 1.0);
        // random-ish pressure field
        for (i, p) in storage
            .values_mut::<Float>(QuantityId::Pressure)
            .iter_mut()
            .enumerate()
        {
            *p = 1.0 + 0.1 * (i as Float).sin();
        }
        run_single_derivative(&mut storage, Box::new(PressureGradient), PHASES[1]);
        let m = storage.values::<Float>(QuantityId::Mass).to_vec();
        let dv = storage.d2t::<Vector>(QuantityId::Position);
        let total: Vector = dv
            .iter()
            .zip(&m)
            .map(|(a, &mass)| *a * mass)
            .sum();
        assert!(total.length() < 1.0e-10, "net momentum rate {:?}", total);
    }
}
