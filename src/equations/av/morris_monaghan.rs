use crate::equations::av::AvForce;
use crate::equations::av::AvInput;
use crate::equations::av::PairwiseAv;
use crate::equations::derivative::DerivativeHolder;
use crate::equations::divergence::VelocityDivergence;
use crate::equations::EquationTerm;
use crate::error::Error;
use crate::geometry::Interval;
use crate::geometry::Vector;
use crate::materials::Material;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

const AV_EPS: Float = 1.0e-2;

/// Decay timescale factor: `τ = h / (ε c_s)`.
const DECAY_EPS: Float = 0.1;

/// Time-dependent artificial viscosity (Morris & Monaghan 1997). Each
/// particle carries its own coefficient `α_i` which relaxes toward a
/// floor on the timescale `h/c_s` and spikes in compressions, so the
/// dissipation is large only where shocks are.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MorrisMonaghanAV {
    pub alpha_min: Float,
    pub alpha_max: Float,
    pub balsara: bool,
}

impl Default for MorrisMonaghanAV {
    fn default() -> Self {
        Self {
            alpha_min: 0.1,
            alpha_max: 1.5,
            balsara: false,
        }
    }
}

impl MorrisMonaghanAV {
    pub fn new(alpha_min: Float, alpha_max: Float) -> Self {
        assert!(0.0 < alpha_min && alpha_min < alpha_max);
        Self {
            alpha_min,
            alpha_max,
            balsara: false,
        }
    }

    pub fn with_balsara(mut self) -> Self {
        self.balsara = true;
        self
    }
}

#[derive(Clone, Copy, PartialEq)]
pub(crate) struct MorrisMonaghanPair;

impl PairwiseAv for MorrisMonaghanPair {
    const NEEDS_ALPHA: bool = true;

    fn pi(&self, input: &AvInput, i: usize, j: usize) -> Float {
        let dvdr = (input.v[i] - input.v[j]).dot(input.r[i] - input.r[j]);
        if dvdr >= 0.0 {
            return 0.0;
        }
        let alpha = input.alpha.expect("per-particle viscosity coefficient");
        let alpha_bar = 0.5 * (alpha[i] + alpha[j]);
        // beta tracks alpha with the usual factor of two
        let beta_bar = 2.0 * alpha_bar;
        let h_bar = 0.5 * (input.r[i].h() + input.r[j].h());
        let rho_bar = 0.5 * (input.rho[i] + input.rho[j]);
        let cs_bar = 0.5 * (input.cs[i] + input.cs[j]);
        let dist_sqr = (input.r[i] - input.r[j]).length_sqr();
        let mu = h_bar * dvdr / (dist_sqr + AV_EPS * h_bar * h_bar);
        (-alpha_bar * cs_bar * mu + beta_bar * mu * mu) / rho_bar
    }
}

impl EquationTerm for MorrisMonaghanAV {
    fn set_derivatives(&self, derivatives: &mut DerivativeHolder) {
        derivatives.require(Box::new(AvForce::new(MorrisMonaghanPair, self.balsara)));
        derivatives.require(Box::new(VelocityDivergence));
        if self.balsara {
            derivatives.require(Box::new(crate::equations::divergence::VelocityRotation));
        }
    }

    /// Evolves the per-particle coefficient: decay toward the floor,
    /// source term in compressions.
    fn finalize(
        &self,
        _scheduler: &Scheduler,
        storage: &mut Storage,
        _t: Float,
    ) -> Result<(), Error> {
        let r: Vec<Vector> = storage.values::<Vector>(QuantityId::Position).to_vec();
        let cs: Vec<Float> = storage.values::<Float>(QuantityId::SoundSpeed).to_vec();
        let divv: Vec<Float> = storage.values::<Float>(QuantityId::VelocityDivergence).to_vec();
        let alpha: Vec<Float> = storage.values::<Float>(QuantityId::AvAlpha).to_vec();
        let dalpha = storage.dt_mut::<Float>(QuantityId::AvAlpha);
        for i in 0..r.len() {
            if cs[i] <= 0.0 {
                dalpha[i] = 0.0;
                continue;
            }
            let tau = r[i].h() / (DECAY_EPS * cs[i]);
            let decay = -(alpha[i] - self.alpha_min) / tau;
            let source = (-divv[i]).max(0.0) * (self.alpha_max - alpha[i]);
            dalpha[i] = decay + source;
        }
        Ok(())
    }

    fn create(&self, storage: &mut Storage, _material: &dyn Material) -> Result<(), Error> {
        storage.insert(QuantityId::AvAlpha, OrderEnum::First, self.alpha_min)?;
        storage.set_range(
            QuantityId::AvAlpha,
            Interval::new(self.alpha_min, self.alpha_max),
        );
        storage.insert(QuantityId::VelocityDivergence, OrderEnum::Zero, 0.0)?;
        if self.balsara {
            storage.insert(QuantityId::VelocityRotation, OrderEnum::Zero, Vector::ZERO)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::NullMaterial;
    use crate::test_utils::gas_lattice_storage;

    #[test]
    fn alpha_decays_without_compression_and_spikes_with_it() {
        let mut storage = gas_lattice_storage(2, 1.0);
        let term = MorrisMonaghanAV::default();
        term.create(&mut storage, &NullMaterial::new()).unwrap();
        storage.values_mut::<Float>(QuantityId::SoundSpeed).fill(1.0);
        storage.values_mut::<Float>(QuantityId::AvAlpha).fill(1.0);

        // no compression: alpha relaxes toward the floor
        term.finalize(&Scheduler::sequential(), &mut storage, 0.0)
            .unwrap();
        assert!(storage.dt::<Float>(QuantityId::AvAlpha)[0] < 0.0);

        // strong compression: the source term dominates
        storage
            .values_mut::<Float>(QuantityId::VelocityDivergence)
            .fill(-100.0);
        term.finalize(&Scheduler::sequential(), &mut storage, 0.0)
            .unwrap();
        assert!(storage.dt::<Float>(QuantityId::AvAlpha)[0] > 0.0);
    }
}
