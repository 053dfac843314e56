mod eos;
mod rheology;

use std::ops::Range;

pub use eos::eos_from_params;
pub use eos::Eos;
pub use eos::IdealGasEos;
pub use eos::MurnaghanEos;
pub use eos::TillotsonEos;
pub use rheology::DruckerPrager;
pub use rheology::Rheology;
pub use rheology::VonMises;

use crate::error::Error;
use crate::geometry::Interval;
use crate::geometry::TracelessTensor;
use crate::prelude::Float;
use crate::settings::Settings;
use crate::settings::Value;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Names of the material parameters. These strings appear in body
/// configuration files and in the material blocks of binary snapshots.
pub mod keys {
    pub const EOS: &str = "eos";
    pub const RHEOLOGY: &str = "rheology";
    pub const DENSITY: &str = "density";
    pub const ENERGY: &str = "energy";
    pub const ENERGY_MIN: &str = "energy_min";
    pub const DENSITY_RANGE: &str = "density_range";
    pub const ENERGY_RANGE: &str = "energy_range";
    pub const ADIABATIC_INDEX: &str = "adiabatic_index";
    pub const BULK_MODULUS: &str = "bulk_modulus";
    pub const SHEAR_MODULUS: &str = "shear_modulus";
    pub const ELASTICITY_LIMIT: &str = "elasticity_limit";
    pub const MELT_ENERGY: &str = "melt_energy";
    pub const COHESION: &str = "cohesion";
    pub const INTERNAL_FRICTION: &str = "internal_friction";
    pub const DRY_FRICTION: &str = "dry_friction";
    pub const TILLOTSON_SUBLIMATION: &str = "tillotson_sublimation";
    pub const TILLOTSON_ENERGY_IV: &str = "tillotson_energy_iv";
    pub const TILLOTSON_ENERGY_CV: &str = "tillotson_energy_cv";
    pub const TILLOTSON_SMALL_A: &str = "tillotson_small_a";
    pub const TILLOTSON_SMALL_B: &str = "tillotson_small_b";
    pub const TILLOTSON_NONLINEAR_B: &str = "tillotson_nonlinear_b";
    pub const TILLOTSON_ALPHA: &str = "tillotson_alpha";
    pub const TILLOTSON_BETA: &str = "tillotson_beta";
    pub const WEIBULL_COEFFICIENT: &str = "weibull_coefficient";
    pub const WEIBULL_EXPONENT: &str = "weibull_exponent";
    pub const RAYLEIGH_SOUND_SPEED: &str = "rayleigh_sound_speed";
}

/// A material of one body: parameter values plus the constitutive
/// models derived from them. Created once per body at
/// initial-conditions time, owned by the storage, alive for the whole
/// run.
pub trait Material: Send + Sync {
    fn params(&self) -> &Settings;

    fn eos(&self) -> Option<&dyn Eos> {
        None
    }

    /// Allowed interval per quantity; values are clamped into these
    /// after every step.
    fn ranges(&self) -> Vec<(QuantityId, Interval)> {
        vec![]
    }

    /// Reference value of a quantity, used as the scale of the
    /// derivative-ratio step criterion.
    fn minimal(&self, _id: QuantityId) -> Float {
        0.0
    }

    /// Requests the quantities of this material from the storage, at
    /// initial-conditions time.
    fn create(&self, storage: &mut Storage) -> Result<(), Error>;

    /// Called before each sub-step over the material's particle
    /// sequence; recomputes derived quantities (pressure, sound speed).
    fn initialize(&self, storage: &mut Storage, sequence: Range<usize>) -> Result<(), Error>;

    /// Called after the derivative evaluation; applies constitutive
    /// clamps (yield surface).
    fn finalize(&self, storage: &mut Storage, sequence: Range<usize>) -> Result<(), Error>;
}

/// Material carrying parameter values but no constitutive models.
/// Snapshots of runs with custom materials fall back to this on load.
pub struct PlainMaterial {
    params: Settings,
}

impl PlainMaterial {
    pub fn new(params: Settings) -> Self {
        Self { params }
    }
}

impl Material for PlainMaterial {
    fn params(&self) -> &Settings {
        &self.params
    }

    fn create(&self, _storage: &mut Storage) -> Result<(), Error> {
        Ok(())
    }

    fn initialize(&self, _storage: &mut Storage, _sequence: Range<usize>) -> Result<(), Error> {
        Ok(())
    }

    fn finalize(&self, _storage: &mut Storage, _sequence: Range<usize>) -> Result<(), Error> {
        Ok(())
    }
}

/// Reconstructs the most specific material the parameters describe:
/// solids need a shear modulus and a yield limit, fluids an equation of
/// state; anything else keeps its parameters only.
pub fn material_from_params(params: Settings) -> Result<Box<dyn Material>, Error> {
    if params.is_empty() {
        return Ok(Box::new(NullMaterial::new()));
    }
    let solid = params.get(keys::SHEAR_MODULUS).is_some()
        && params.get(keys::ELASTICITY_LIMIT).is_some();
    if solid {
        return Ok(Box::new(SolidMaterial::from_params(params)?));
    }
    if params.get(keys::DENSITY).is_some() {
        return Ok(Box::new(EosMaterial::from_params(params)?));
    }
    Ok(Box::new(PlainMaterial::new(params)))
}

/// Material with no equation of state, used by pure N-body runs and in
/// tests.
pub struct NullMaterial {
    params: Settings,
}

impl NullMaterial {
    pub fn new() -> Self {
        Self {
            params: Settings::new(),
        }
    }
}

impl Default for NullMaterial {
    fn default() -> Self {
        Self::new()
    }
}

impl Material for NullMaterial {
    fn params(&self) -> &Settings {
        &self.params
    }

    fn create(&self, _storage: &mut Storage) -> Result<(), Error> {
        Ok(())
    }

    fn initialize(&self, _storage: &mut Storage, _sequence: Range<usize>) -> Result<(), Error> {
        Ok(())
    }

    fn finalize(&self, _storage: &mut Storage, _sequence: Range<usize>) -> Result<(), Error> {
        Ok(())
    }
}

fn eos_ranges(params: &Settings) -> Result<Vec<(QuantityId, Interval)>, Error> {
    let density_range = match params.get(keys::DENSITY_RANGE) {
        Some(Value::Interval(range)) => *range,
        _ => Interval::at_least(1.0e-30),
    };
    let energy_range = match params.get(keys::ENERGY_RANGE) {
        Some(Value::Interval(range)) => *range,
        _ => Interval::at_least(params.get_float_or(keys::ENERGY_MIN, 0.0)?),
    };
    Ok(vec![
        (QuantityId::Density, density_range),
        (QuantityId::Energy, energy_range),
    ])
}

fn evaluate_eos(eos: &dyn Eos, storage: &mut Storage, sequence: Range<usize>) {
    let density: Vec<Float> =
        storage.values::<Float>(QuantityId::Density)[sequence.clone()].to_vec();
    let energy: Vec<Float> =
        storage.values::<Float>(QuantityId::Energy)[sequence.clone()].to_vec();
    let mut pressure = vec![0.0; sequence.len()];
    let mut sound_speed = vec![0.0; sequence.len()];
    for local in 0..sequence.len() {
        let (p, cs) = eos.evaluate(density[local], energy[local]);
        pressure[local] = p;
        sound_speed[local] = cs;
    }
    storage.values_mut::<Float>(QuantityId::Pressure)[sequence.clone()]
        .copy_from_slice(&pressure);
    storage.values_mut::<Float>(QuantityId::SoundSpeed)[sequence].copy_from_slice(&sound_speed);
}

/// Fluid material: density, energy, pressure and sound speed from an
/// equation of state.
pub struct EosMaterial {
    params: Settings,
    eos: Box<dyn Eos>,
    ranges: Vec<(QuantityId, Interval)>,
}

impl EosMaterial {
    pub fn from_params(params: Settings) -> Result<Self, Error> {
        let eos = eos_from_params(&params)?;
        let ranges = eos_ranges(&params)?;
        Ok(Self {
            params,
            eos,
            ranges,
        })
    }
}

impl Material for EosMaterial {
    fn params(&self) -> &Settings {
        &self.params
    }

    fn eos(&self) -> Option<&dyn Eos> {
        Some(&*self.eos)
    }

    fn ranges(&self) -> Vec<(QuantityId, Interval)> {
        self.ranges.clone()
    }

    fn minimal(&self, id: QuantityId) -> Float {
        match id {
            QuantityId::Density => self.params.get_float(keys::DENSITY).unwrap_or(0.0) * 1.0e-3,
            _ => 0.0,
        }
    }

    fn create(&self, storage: &mut Storage) -> Result<(), Error> {
        let density = self.params.get_float(keys::DENSITY)?;
        let energy = self.params.get_float_or(keys::ENERGY, 0.0)?;
        storage.insert(QuantityId::Density, OrderEnum::First, density)?;
        storage.insert(QuantityId::Energy, OrderEnum::First, energy)?;
        storage.insert(QuantityId::Pressure, OrderEnum::Zero, 0.0)?;
        storage.insert(QuantityId::SoundSpeed, OrderEnum::Zero, 0.0)?;
        for (id, range) in &self.ranges {
            storage.set_range(*id, *range);
        }
        Ok(())
    }

    fn initialize(&self, storage: &mut Storage, sequence: Range<usize>) -> Result<(), Error> {
        evaluate_eos(&*self.eos, storage, sequence);
        Ok(())
    }

    fn finalize(&self, _storage: &mut Storage, _sequence: Range<usize>) -> Result<(), Error> {
        Ok(())
    }
}

/// Solid material: everything the fluid material has, plus deviatoric
/// stress evolved with the velocity field and clamped by a yielding
/// rheology.
pub struct SolidMaterial {
    params: Settings,
    eos: Box<dyn Eos>,
    rheology: Box<dyn Rheology>,
    ranges: Vec<(QuantityId, Interval)>,
}

impl SolidMaterial {
    pub fn from_params(params: Settings) -> Result<Self, Error> {
        let eos = eos_from_params(&params)?;
        let rheology: Box<dyn Rheology> = match params.get(keys::RHEOLOGY) {
            None => Box::new(VonMises::from_params(&params)?),
            Some(Value::Str(name)) => match name.as_str() {
                "von_mises" => Box::new(VonMises::from_params(&params)?),
                "drucker_prager" => Box::new(DruckerPrager::from_params(&params)?),
                other => {
                    return Err(Error::InvalidSetup(format!(
                        "unknown rheology \"{}\"",
                        other
                    )))
                }
            },
            Some(_) => {
                return Err(Error::InvalidSetup(
                    "the \"rheology\" key must be a string".to_owned(),
                ))
            }
        };
        let ranges = eos_ranges(&params)?;
        Ok(Self {
            params,
            eos,
            rheology,
            ranges,
        })
    }

    pub fn shear_modulus(&self) -> Float {
        self.params.get_float(keys::SHEAR_MODULUS).unwrap_or(0.0)
    }
}

impl Material for SolidMaterial {
    fn params(&self) -> &Settings {
        &self.params
    }

    fn eos(&self) -> Option<&dyn Eos> {
        Some(&*self.eos)
    }

    fn ranges(&self) -> Vec<(QuantityId, Interval)> {
        self.ranges.clone()
    }

    fn minimal(&self, id: QuantityId) -> Float {
        match id {
            QuantityId::Density => self.params.get_float(keys::DENSITY).unwrap_or(0.0) * 1.0e-3,
            _ => 0.0,
        }
    }

    fn create(&self, storage: &mut Storage) -> Result<(), Error> {
        let density = self.params.get_float(keys::DENSITY)?;
        let energy = self.params.get_float_or(keys::ENERGY, 0.0)?;
        storage.insert(QuantityId::Density, OrderEnum::First, density)?;
        storage.insert(QuantityId::Energy, OrderEnum::First, energy)?;
        storage.insert(QuantityId::Pressure, OrderEnum::Zero, 0.0)?;
        storage.insert(QuantityId::SoundSpeed, OrderEnum::Zero, 0.0)?;
        storage.insert(
            QuantityId::DeviatoricStress,
            OrderEnum::First,
            TracelessTensor::ZERO,
        )?;
        self.rheology.create(storage)?;
        for (id, range) in &self.ranges {
            storage.set_range(*id, *range);
        }
        Ok(())
    }

    fn initialize(&self, storage: &mut Storage, sequence: Range<usize>) -> Result<(), Error> {
        evaluate_eos(&*self.eos, storage, sequence);
        Ok(())
    }

    fn finalize(&self, storage: &mut Storage, sequence: Range<usize>) -> Result<(), Error> {
        self.rheology.finalize(storage, sequence);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector;

    #[test]
    fn eos_material_computes_pressure_on_initialize() {
        let mut params = Settings::new();
        params.set(keys::EOS, Value::Str("ideal_gas".to_owned()));
        params.set(keys::ADIABATIC_INDEX, Value::Float(5.0 / 3.0));
        params.set(keys::DENSITY, Value::Float(1.0));
        params.set(keys::ENERGY, Value::Float(1.5));
        let material = EosMaterial::from_params(params).unwrap();
        let mut storage = Storage::new();
        storage
            .insert_with_values(
                QuantityId::Position,
                OrderEnum::Second,
                vec![Vector::with_h(0.0, 0.0, 0.0, 1.0); 8],
            )
            .unwrap();
        material.create(&mut storage).unwrap();
        material.initialize(&mut storage, 0..8).unwrap();
        let pressure = storage.values::<Float>(QuantityId::Pressure);
        assert!((pressure[3] - 1.0).abs() < 1.0e-12);
        assert!(storage.values::<Float>(QuantityId::SoundSpeed)[0] > 0.0);
    }

    #[test]
    fn solid_material_requests_stress() {
        let mut params = Settings::new();
        params.set(keys::DENSITY, Value::Float(2700.0));
        params.set(keys::BULK_MODULUS, Value::Float(2.67e10));
        params.set(keys::SHEAR_MODULUS, Value::Float(2.27e10));
        params.set(keys::ELASTICITY_LIMIT, Value::Float(3.5e9));
        params.set(keys::EOS, Value::Str("tillotson".to_owned()));
        let material = SolidMaterial::from_params(params).unwrap();
        let mut storage = Storage::new();
        storage
            .insert_with_values(
                QuantityId::Position,
                OrderEnum::Second,
                vec![Vector::with_h(0.0, 0.0, 0.0, 1.0); 4],
            )
            .unwrap();
        material.create(&mut storage).unwrap();
        assert!(storage.has(QuantityId::DeviatoricStress));
        assert!(storage.has(QuantityId::StressReducing));
    }
}
