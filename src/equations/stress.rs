use std::any::Any;

use crate::equations::derivative::Accumulated;
use crate::equations::derivative::BufferKind;
use crate::equations::derivative::Derivative;
use crate::equations::derivative::DerivativeHolder;
use crate::equations::derivative::Phase;
use crate::equations::divergence::VelocityGradient;
use crate::equations::EquationTerm;
use crate::error::Error;
use crate::finders::NeighborRecord;
use crate::geometry::SymTensor;
use crate::geometry::Tensor;
use crate::geometry::TracelessTensor;
use crate::geometry::Vector;
use crate::materials::keys;
use crate::materials::Material;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Acceleration from the divergence of the deviatoric stress, plus the
/// stress evolution itself: Hooke's law applied to the strain rate and
/// the Jaumann corotational rotation, with the yield clamp left to the
/// material rheology.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolidStressForce;

#[derive(PartialEq)]
struct StressDivergence;

impl Derivative for StressDivergence {
    fn create(&self, results: &mut Accumulated) {
        results.insert::<Vector>(
            QuantityId::Position,
            OrderEnum::Second,
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
        let m = input.values::<Float>(QuantityId::Mass);
        let rho = input.values::<Float>(QuantityId::Density);
        let s = input.values::<TracelessTensor>(QuantityId::DeviatoricStress);
        let dv = results.values_mut::<Vector>(QuantityId::Position);

        let s_rho_i = s[i] * (1.0 / (rho[i] * rho[i]));
        for (neigh, &grad) in neighs.iter().zip(grads) {
            let j = neigh.index;
            let grad_ij = (r[i] - r[j]) * grad;
            let s_rho_j = s[j] * (1.0 / (rho[j] * rho[j]));
            let force = (s_rho_i + s_rho_j).apply(grad_ij);
            dv[i] += force * m[j];
            dv[j] -= force * m[i];
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Derivative) -> bool {
        other.as_any().downcast_ref::<Self>().is_some()
    }
}

impl EquationTerm for SolidStressForce {
    fn set_derivatives(&self, derivatives: &mut DerivativeHolder) {
        derivatives.require(Box::new(StressDivergence));
        derivatives.require(Box::new(VelocityGradient));
    }

    fn finalize(
        &self,
        _scheduler: &Scheduler,
        storage: &mut Storage,
        _t: Float,
    ) -> Result<(), Error> {
        storage.for_each_material(|material, sequence, storage| {
            let shear = material.params().get_float_or(keys::SHEAR_MODULUS, 0.0)?;
            if sequence.is_empty() {
                return Ok(());
            }
            let gradv: Vec<Tensor> =
                storage.values::<Tensor>(QuantityId::VelocityGradient)[sequence.clone()].to_vec();
            let rho: Vec<Float> =
                storage.values::<Float>(QuantityId::Density)[sequence.clone()].to_vec();
            let s: Vec<TracelessTensor> = storage
                .values::<TracelessTensor>(QuantityId::DeviatoricStress)[sequence.clone()]
                .to_vec();

            // energy from plastic/elastic work, S : ε̇ / ρ
            {
                let du = storage.dt_mut::<Float>(QuantityId::Energy);
                for (local, i) in sequence.clone().enumerate() {
                    let strain_rate = gradv[local].symmetrize();
                    du[i] += SymTensor::from(s[local]).ddot(&strain_rate) / rho[local];
                }
            }

            // Hooke + Jaumann corotational terms
            let ds = storage.dt_mut::<TracelessTensor>(QuantityId::DeviatoricStress);
            for (local, i) in sequence.clone().enumerate() {
                let strain_rate = gradv[local].symmetrize();
                let rotation = gradv[local].antisymmetrize();
                let hooke =
                    TracelessTensor::traceless_part(strain_rate) * (2.0 * shear);
                let full: Tensor = SymTensor::from(s[local]).into();
                let corotation = rotation * full - full * rotation;
                ds[i] += hooke
                    + TracelessTensor::traceless_part(corotation.symmetrize());
            }
            Ok(())
        })
    }

    fn create(&self, storage: &mut Storage, material: &dyn Material) -> Result<(), Error> {
        if material.params().get(keys::SHEAR_MODULUS).is_none() {
            return Err(Error::InvalidSetup(
                "the stress force needs a material with a shear modulus".to_owned(),
            ));
        }
        storage.insert(QuantityId::VelocityGradient, OrderEnum::Zero, Tensor::ZERO)?;
        debug_assert!(storage.has(QuantityId::DeviatoricStress));
        Ok(())
    }
}
