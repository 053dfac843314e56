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

/// Density evolution `dρ/dt = -ρ ∇·v`, evaluated symmetrically over
/// neighbor pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContinuityEquation;

#[derive(PartialEq)]
struct DensityRate;

impl Derivative for DensityRate {
    fn create(&self, results: &mut Accumulated) {
        results.insert::<Float>(
            QuantityId::Density,
            OrderEnum::First,
            BufferKind::Unique,
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
        let drho = results.values_mut::<Float>(QuantityId::Density);

        for (neigh, &grad) in neighs.iter().zip(grads) {
            let j = neigh.index;
            let proj = (v[i] - v[j]).dot((r[i] - r[j]) * grad);
            drho[i] += m[j] * proj;
            drho[j] += m[i] * proj;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Derivative) -> bool {
        other.as_any().downcast_ref::<Self>().is_some()
    }
}

impl EquationTerm for ContinuityEquation {
    fn set_derivatives(&self, derivatives: &mut DerivativeHolder) {
        derivatives.require(Box::new(DensityRate));
    }

    fn create(&self, storage: &mut Storage, _material: &dyn Material) -> Result<(), Error> {
        if !storage.has(QuantityId::Density) {
            return Err(Error::InvalidSetup(
                "the continuity equation needs a density quantity".to_owned(),
            ));
        }
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
    fn static_field_keeps_density_constant() {
        let mut storage = gas_lattice_storage(4, 1.0);
        run_single_derivative(&mut storage, Box::new(DensityRate), PHASES[1]);
        for &drho in storage.dt::<Float>(QuantityId::Density) {
            assert_eq!(drho, 0.0);
        }
    }

    #[test]
    fn compression_raises_density() {
        let mut storage = gas_lattice_storage(4, 1.0);
        // radially converging velocity field
        let r = storage.values::<Vector>(QuantityId::Position).to_vec();
        for (v, pos) in storage
            .dt_mut::<Vector>(QuantityId::Position)
            .iter_mut()
            .zip(&r)
        {
            *v = *pos * -0.1;
            v.set_h(0.0);
        }
        run_single_derivative(&mut storage, Box::new(DensityRate), PHASES[1]);
        let drho = storage.dt::<Float>(QuantityId::Density);
        // interior particles get denser
        assert!(drho[drho.len() / 2] > 0.0);
    }
}
