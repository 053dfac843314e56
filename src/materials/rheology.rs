use std::ops::Range;

use crate::error::Error;
use crate::geometry::Interval;
use crate::geometry::TracelessTensor;
use crate::materials::keys;
use crate::prelude::Float;
use crate::settings::Settings;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

const EPS: Float = 1.0e-30;

/// Constitutive response of a solid material: after the stress update
/// of a sub-step, the deviatoric stress is pulled back onto the yield
/// surface.
pub trait Rheology: Send + Sync {
    /// Requests the quantities the rheology needs, at
    /// initial-conditions time.
    fn create(&self, storage: &mut Storage) -> Result<(), Error>;

    /// Applies the yield criterion to the particles of the material
    /// sequence.
    fn finalize(&self, storage: &mut Storage, sequence: Range<usize>);
}

/// Von Mises yielding with an energy-scaled yield limit: the material
/// weakens as the internal energy approaches the melt energy.
pub struct VonMises {
    limit: Float,
    melt_energy: Float,
}

impl VonMises {
    pub fn from_params(params: &Settings) -> Result<Self, Error> {
        let limit = params.get_float(keys::ELASTICITY_LIMIT)?;
        if limit <= 0.0 {
            return Err(Error::InvalidSetup(format!(
                "elasticity limit must be positive, got {}",
                limit
            )));
        }
        Ok(Self {
            limit,
            melt_energy: params.get_float_or(keys::MELT_ENERGY, 3.4e6)?,
        })
    }

    fn yield_stress(&self, energy: Float) -> Float {
        let unorm = energy / self.melt_energy;
        if unorm < 1.0e-5 {
            self.limit
        } else {
            self.limit * (1.0 - unorm).max(0.0)
        }
    }
}

/// Rescales `S` so that `J₂ = ½S:S` does not exceed `Y²/3`.
fn reduce_stress(
    stress: &mut TracelessTensor,
    reducing: &mut Float,
    yield_stress: Float,
    damage: Float,
) {
    if yield_stress < EPS {
        *reducing = 0.0;
        *stress = TracelessTensor::ZERO;
        return;
    }
    let tried = *stress * (1.0 - damage);
    let inv = 0.5 * tried.ddot(&tried) / (yield_stress * yield_stress) + EPS;
    debug_assert!(inv.is_finite() && inv > 0.0);
    let reduce = (1.0 / (3.0 * inv)).sqrt().min(1.0);
    *reducing = reduce;
    *stress = *stress * reduce;
    debug_assert!(stress.is_finite());
}

impl Rheology for VonMises {
    fn create(&self, storage: &mut Storage) -> Result<(), Error> {
        storage.insert(QuantityId::StressReducing, OrderEnum::Zero, 1.0)?;
        storage.set_range(QuantityId::StressReducing, Interval::new(0.0, 1.0));
        Ok(())
    }

    fn finalize(&self, storage: &mut Storage, sequence: Range<usize>) {
        let energy: Vec<Float> = storage.values::<Float>(QuantityId::Energy)[sequence.clone()]
            .to_vec();
        let damage: Option<Vec<Float>> = storage
            .try_values::<Float>(QuantityId::Damage)
            .ok()
            .map(|damage| damage[sequence.clone()].to_vec());
        let mut reducing: Vec<Float> =
            storage.values::<Float>(QuantityId::StressReducing)[sequence.clone()].to_vec();
        let stress = storage.values_mut::<TracelessTensor>(QuantityId::DeviatoricStress);
        for (local, i) in sequence.clone().enumerate() {
            let d = damage
                .as_ref()
                .map(|damage| damage[local].powi(3))
                .unwrap_or(0.0);
            reduce_stress(
                &mut stress[i],
                &mut reducing[local],
                self.yield_stress(energy[local]),
                d,
            );
        }
        storage.values_mut::<Float>(QuantityId::StressReducing)[sequence]
            .copy_from_slice(&reducing);
    }
}

/// Drucker-Prager yielding: pressure-dependent yield surface with a
/// dry-friction branch for fully damaged material, blended by the cube
/// of the damage.
pub struct DruckerPrager {
    cohesion: Float,
    internal_friction: Float,
    limit: Float,
    dry_friction: Float,
}

impl DruckerPrager {
    pub fn from_params(params: &Settings) -> Result<Self, Error> {
        let cohesion = params.get_float(keys::COHESION)?;
        let limit = params.get_float(keys::ELASTICITY_LIMIT)?;
        if limit <= cohesion {
            return Err(Error::InvalidSetup(
                "the elasticity limit must exceed the cohesion".to_owned(),
            ));
        }
        Ok(Self {
            cohesion,
            internal_friction: params.get_float_or(keys::INTERNAL_FRICTION, 2.0)?,
            limit,
            dry_friction: params.get_float_or(keys::DRY_FRICTION, 0.8)?,
        })
    }

    fn yield_stress(&self, pressure: Float, damage: Float) -> Float {
        let intact = self.cohesion
            + self.internal_friction * pressure
                / (1.0 + self.internal_friction * pressure / (self.limit - self.cohesion));
        let intact = intact.max(0.0);
        let damaged = (self.dry_friction * pressure).max(0.0);
        if damaged > intact {
            // above this pressure the shear strength no longer depends
            // on the damage
            intact
        } else {
            let d = damage * damage * damage;
            (1.0 - d) * intact + d * damaged
        }
    }
}

impl Rheology for DruckerPrager {
    fn create(&self, storage: &mut Storage) -> Result<(), Error> {
        storage.insert(QuantityId::StressReducing, OrderEnum::Zero, 1.0)?;
        storage.set_range(QuantityId::StressReducing, Interval::new(0.0, 1.0));
        Ok(())
    }

    fn finalize(&self, storage: &mut Storage, sequence: Range<usize>) {
        let pressure: Vec<Float> =
            storage.values::<Float>(QuantityId::Pressure)[sequence.clone()].to_vec();
        let damage: Option<Vec<Float>> = storage
            .try_values::<Float>(QuantityId::Damage)
            .ok()
            .map(|damage| damage[sequence.clone()].to_vec());
        let mut reducing: Vec<Float> =
            storage.values::<Float>(QuantityId::StressReducing)[sequence.clone()].to_vec();
        let stress = storage.values_mut::<TracelessTensor>(QuantityId::DeviatoricStress);
        for (local, i) in sequence.clone().enumerate() {
            let d = damage.as_ref().map(|damage| damage[local]).unwrap_or(0.0);
            let yield_stress = self.yield_stress(pressure[local], d);
            reduce_stress(&mut stress[i], &mut reducing[local], yield_stress, 0.0);
        }
        storage.values_mut::<Float>(QuantityId::StressReducing)[sequence]
            .copy_from_slice(&reducing);
    }
}
