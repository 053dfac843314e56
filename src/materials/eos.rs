use crate::error::Error;
use crate::materials::keys;
use crate::prelude::Float;
use crate::settings::Settings;

/// Equation of state: pressure and sound speed as a function of
/// density and specific internal energy.
pub trait Eos: Send + Sync {
    /// Returns `(pressure, sound_speed)`.
    fn evaluate(&self, density: Float, energy: Float) -> (Float, Float);

    /// Inverts the equation of state for the specific energy at a given
    /// pressure. Used when setting up initial conditions.
    fn internal_energy(&self, density: Float, pressure: Float) -> Float;
}

#[derive(Clone, Debug)]
pub struct IdealGasEos {
    gamma: Float,
}

impl IdealGasEos {
    pub fn new(gamma: Float) -> Self {
        assert!(gamma > 1.0);
        Self { gamma }
    }

    pub fn from_params(params: &Settings) -> Result<Self, Error> {
        let gamma = params.get_float_or(keys::ADIABATIC_INDEX, 5.0 / 3.0)?;
        if gamma <= 1.0 {
            return Err(Error::InvalidSetup(format!(
                "adiabatic index must exceed one, got {}",
                gamma
            )));
        }
        Ok(Self::new(gamma))
    }
}

impl Eos for IdealGasEos {
    fn evaluate(&self, density: Float, energy: Float) -> (Float, Float) {
        let pressure = (self.gamma - 1.0) * energy * density;
        (pressure, (self.gamma * pressure / density).max(0.0).sqrt())
    }

    fn internal_energy(&self, density: Float, pressure: Float) -> Float {
        pressure / ((self.gamma - 1.0) * density)
    }
}

/// Tillotson (1962) equation of state for impact physics: a compressed
/// or cold branch, an expanded hot branch and an interpolation zone in
/// between, selected by density and energy.
#[derive(Clone, Debug)]
pub struct TillotsonEos {
    u0: Float,
    u_iv: Float,
    u_cv: Float,
    a: Float,
    b: Float,
    rho0: Float,
    big_a: Float,
    big_b: Float,
    alpha: Float,
    beta: Float,
}

impl TillotsonEos {
    pub fn from_params(params: &Settings) -> Result<Self, Error> {
        Ok(Self {
            u0: params.get_float_or(keys::TILLOTSON_SUBLIMATION, 4.87e8)?,
            u_iv: params.get_float_or(keys::TILLOTSON_ENERGY_IV, 4.72e6)?,
            u_cv: params.get_float_or(keys::TILLOTSON_ENERGY_CV, 1.82e7)?,
            a: params.get_float_or(keys::TILLOTSON_SMALL_A, 0.5)?,
            b: params.get_float_or(keys::TILLOTSON_SMALL_B, 1.5)?,
            rho0: params.get_float(keys::DENSITY)?,
            big_a: params.get_float(keys::BULK_MODULUS)?,
            big_b: params.get_float_or(keys::TILLOTSON_NONLINEAR_B, 2.67e10)?,
            alpha: params.get_float_or(keys::TILLOTSON_ALPHA, 5.0)?,
            beta: params.get_float_or(keys::TILLOTSON_BETA, 5.0)?,
        })
    }
}

impl Eos for TillotsonEos {
    fn evaluate(&self, density: Float, energy: Float) -> (Float, Float) {
        let eta = density / self.rho0;
        let mu = eta - 1.0;
        let denom = energy / (self.u0 * eta * eta) + 1.0;
        debug_assert!(denom.is_finite() && eta.is_finite());

        // compressed or cold phase
        let p_compressed =
            (self.a + self.b / denom) * density * energy + self.big_a * mu + self.big_b * mu * mu;
        let dpdu = self.a * density + self.b * density / (denom * denom);
        let dpdrho = self.a * energy
            + self.b * energy * (3.0 * denom - 2.0) / (denom * denom)
            + self.big_a / self.rho0
            + 2.0 * self.big_b * mu / self.rho0;
        let cs_sqr_compressed =
            dpdrho + dpdu * p_compressed / (density * density);

        // expanded hot phase
        let rho_exp = self.rho0 / density - 1.0;
        let beta_exp = (-self.beta * rho_exp).min(70.0).exp();
        let alpha_exp = (-self.alpha * rho_exp * rho_exp).min(70.0).exp();
        let p_expanded = self.a * density * energy
            + (self.b * density * energy / denom + self.big_a * mu * beta_exp) * alpha_exp;
        let dpdu = self.a * density + alpha_exp * self.b * density / (denom * denom);
        let dpdrho = self.a * energy
            + alpha_exp * (self.b * energy * (3.0 * denom - 2.0) / (denom * denom))
            + alpha_exp * (self.b * energy * density / denom) * self.rho0
                * (2.0 * self.alpha * rho_exp)
                / (density * density)
            + alpha_exp
                * self.big_a
                * beta_exp
                * (1.0 / self.rho0
                    + self.rho0 * mu / (density * density)
                        * (2.0 * self.alpha * rho_exp + self.beta));
        let cs_sqr_expanded =
            (dpdrho + dpdu * p_expanded / (density * density)).max(0.0);

        // select the phase from density and energy
        let (mut pressure, mut cs_sqr) = (p_compressed, cs_sqr_compressed);
        if density <= self.rho0 && energy > self.u_cv {
            pressure = p_expanded;
            cs_sqr = cs_sqr_expanded;
        } else if density <= self.rho0 && energy > self.u_iv {
            let t = (energy - self.u_iv) / (self.u_cv - self.u_iv);
            pressure = t * p_expanded + (1.0 - t) * p_compressed;
            cs_sqr = t * cs_sqr_expanded + (1.0 - t) * cs_sqr_compressed;
        }
        // keep the sound speed away from zero in the deeply expanded
        // states
        cs_sqr = cs_sqr.max(0.25 * self.big_a / self.rho0);
        debug_assert!(pressure.is_finite() && cs_sqr > 0.0);
        (pressure, cs_sqr.sqrt())
    }

    fn internal_energy(&self, density: Float, pressure: Float) -> Float {
        // pressure is monotone in energy within a phase; bisect
        let mut lower = 0.0;
        let mut upper = 10.0 * self.u0;
        for _ in 0..128 {
            let mid = 0.5 * (lower + upper);
            if self.evaluate(density, mid).0 < pressure {
                lower = mid;
            } else {
                upper = mid;
            }
        }
        0.5 * (lower + upper)
    }
}

/// Murnaghan equation of state: linear in the density difference,
/// energy independent. Useful for nearly incompressible targets.
#[derive(Clone, Debug)]
pub struct MurnaghanEos {
    rho0: Float,
    bulk_modulus: Float,
}

impl MurnaghanEos {
    pub fn from_params(params: &Settings) -> Result<Self, Error> {
        Ok(Self {
            rho0: params.get_float(keys::DENSITY)?,
            bulk_modulus: params.get_float(keys::BULK_MODULUS)?,
        })
    }
}

impl Eos for MurnaghanEos {
    fn evaluate(&self, density: Float, _energy: Float) -> (Float, Float) {
        let cs_sqr = self.bulk_modulus / self.rho0;
        (cs_sqr * (density - self.rho0), cs_sqr.sqrt())
    }

    fn internal_energy(&self, _density: Float, _pressure: Float) -> Float {
        0.0
    }
}

/// Constructs the equation of state selected by the `"eos"` key.
pub fn eos_from_params(params: &Settings) -> Result<Box<dyn Eos>, Error> {
    match params.get(keys::EOS) {
        None => Ok(Box::new(IdealGasEos::from_params(params)?)),
        Some(crate::settings::Value::Str(name)) => match name.as_str() {
            "ideal_gas" => Ok(Box::new(IdealGasEos::from_params(params)?)),
            "tillotson" => Ok(Box::new(TillotsonEos::from_params(params)?)),
            "murnaghan" => Ok(Box::new(MurnaghanEos::from_params(params)?)),
            other => Err(Error::InvalidSetup(format!("unknown eos \"{}\"", other))),
        },
        Some(_) => Err(Error::InvalidSetup(
            "the \"eos\" key must be a string".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Value;

    #[test]
    fn ideal_gas_reference_values() {
        let eos = IdealGasEos::new(5.0 / 3.0);
        let (pressure, cs) = eos.evaluate(1.0, 1.5);
        assert!((pressure - 1.0).abs() < 1.0e-12);
        assert!((cs - (5.0 / 3.0 as Float).sqrt()).abs() < 1.0e-12);
        let energy = eos.internal_energy(1.0, pressure);
        assert!((energy - 1.5).abs() < 1.0e-12);
    }

    fn basalt_params() -> Settings {
        let mut params = Settings::new();
        params.set(keys::DENSITY, Value::Float(2700.0));
        params.set(keys::BULK_MODULUS, Value::Float(2.67e10));
        params
    }

    #[test]
    fn tillotson_reference_state_has_zero_pressure() {
        let eos = TillotsonEos::from_params(&basalt_params()).unwrap();
        let (pressure, cs) = eos.evaluate(2700.0, 0.0);
        assert!(pressure.abs() < 1.0e-6);
        assert!(cs > 0.0);
    }

    #[test]
    fn tillotson_compression_raises_pressure() {
        let eos = TillotsonEos::from_params(&basalt_params()).unwrap();
        let (compressed, _) = eos.evaluate(3000.0, 1.0e4);
        let (expanded, _) = eos.evaluate(2500.0, 1.0e4);
        assert!(compressed > 0.0);
        assert!(expanded < compressed);
    }

    #[test]
    fn murnaghan_is_linear_in_density() {
        let eos = MurnaghanEos::from_params(&basalt_params()).unwrap();
        let (p1, cs) = eos.evaluate(2800.0, 0.0);
        let (p2, _) = eos.evaluate(2900.0, 1.0e9);
        assert!((p2 - 2.0 * p1).abs() < 1.0e-3 * p1.abs());
        assert!((cs - (2.67e10 / 2700.0 as Float).sqrt()).abs() < 1.0e-9 * cs);
    }
}
