use crate::config::NUM_DIMENSIONS;
use crate::equations::derivative::DerivativeHolder;
use crate::equations::divergence::VelocityDivergence;
use crate::equations::EquationTerm;
use crate::error::Error;
use crate::geometry::Vector;
use crate::materials::Material;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Evolves the smoothing length with the local expansion rate,
/// `dh/dt = (h/D) ∇·v`, so the kernel support follows the density:
/// particles in compressions shrink their support, particles in
/// expansions grow it. The rate rides in the fourth lane of the
/// velocity, so every integrator advances it for free.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveSmoothingLength {
    /// Lower bound enforced after each step.
    pub minimal: Float,
}

impl AdaptiveSmoothingLength {
    pub fn new(minimal: Float) -> Self {
        assert!(minimal > 0.0);
        Self { minimal }
    }
}

impl EquationTerm for AdaptiveSmoothingLength {
    fn set_derivatives(&self, derivatives: &mut DerivativeHolder) {
        derivatives.require(Box::new(VelocityDivergence));
    }

    fn finalize(
        &self,
        _scheduler: &Scheduler,
        storage: &mut Storage,
        _t: Float,
    ) -> Result<(), Error> {
        let divv: Vec<Float> = storage
            .values::<Float>(QuantityId::VelocityDivergence)
            .to_vec();
        let h: Vec<Float> = storage
            .values::<Vector>(QuantityId::Position)
            .iter()
            .map(|r| r.h())
            .collect();
        let v = storage.dt_mut::<Vector>(QuantityId::Position);
        for i in 0..v.len() {
            v[i].set_h(h[i] / NUM_DIMENSIONS as Float * divv[i]);
        }
        // enforce the lower bound on the current values
        for r in storage.values_mut::<Vector>(QuantityId::Position) {
            if r.h() < self.minimal {
                r.set_h(self.minimal);
            }
        }
        Ok(())
    }

    fn create(&self, storage: &mut Storage, _material: &dyn Material) -> Result<(), Error> {
        storage.insert(QuantityId::VelocityDivergence, OrderEnum::Zero, 0.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::gas_lattice_storage;

    #[test]
    fn compression_shrinks_the_smoothing_length() {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage
            .insert(QuantityId::VelocityDivergence, OrderEnum::Zero, -2.0)
            .unwrap();
        let term = AdaptiveSmoothingLength::new(1.0e-6);
        term.finalize(&Scheduler::sequential(), &mut storage, 0.0)
            .unwrap();
        let v = storage.dt::<Vector>(QuantityId::Position);
        let h = storage.values::<Vector>(QuantityId::Position)[0].h();
        // dh/dt = h/3 * divv < 0 in compression
        assert!((v[0].h() - h / 3.0 * -2.0).abs() < 1.0e-12);
        assert!(v[0].h() < 0.0);
    }

    #[test]
    fn lower_bound_is_enforced() {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage
            .insert(QuantityId::VelocityDivergence, OrderEnum::Zero, 0.0)
            .unwrap();
        for r in storage.values_mut::<Vector>(QuantityId::Position) {
            r.set_h(1.0e-12);
        }
        let term = AdaptiveSmoothingLength::new(0.5);
        term.finalize(&Scheduler::sequential(), &mut storage, 0.0)
            .unwrap();
        for r in storage.values::<Vector>(QuantityId::Position) {
            assert_eq!(r.h(), 0.5);
        }
    }
}
