use crate::equations::av::AvForce;
use crate::equations::av::AvInput;
use crate::equations::av::PairwiseAv;
use crate::equations::derivative::DerivativeHolder;
use crate::equations::divergence::VelocityDivergence;
use crate::equations::divergence::VelocityRotation;
use crate::equations::EquationTerm;
use crate::error::Error;
use crate::geometry::Vector;
use crate::materials::Material;
use crate::prelude::Float;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Artificial viscosity based on a Riemann solver (Monaghan 1997):
/// dissipation proportional to the signal velocity
/// `v_sig = c_i + c_j - 3w` of the pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiemannAV {
    pub alpha: Float,
    pub balsara: bool,
}

impl Default for RiemannAV {
    fn default() -> Self {
        Self {
            alpha: 1.5,
            balsara: false,
        }
    }
}

impl RiemannAV {
    pub fn new(alpha: Float) -> Self {
        Self {
            alpha,
            balsara: false,
        }
    }

    pub fn with_balsara(mut self) -> Self {
        self.balsara = true;
        self
    }

    pub(crate) fn pair(&self) -> RiemannPair {
        RiemannPair { alpha: self.alpha }
    }
}

#[derive(Clone, Copy, PartialEq)]
pub(crate) struct RiemannPair {
    pub alpha: Float,
}

impl PairwiseAv for RiemannPair {
    fn pi(&self, input: &AvInput, i: usize, j: usize) -> Float {
        let dr = input.r[i] - input.r[j];
        let dvdr = (input.v[i] - input.v[j]).dot(dr);
        if dvdr >= 0.0 {
            return 0.0;
        }
        let w = dvdr / dr.length();
        let v_sig = input.cs[i] + input.cs[j] - 3.0 * w;
        let rho_bar = 0.5 * (input.rho[i] + input.rho[j]);
        -0.5 * self.alpha * v_sig * w / rho_bar
    }
}

impl EquationTerm for RiemannAV {
    fn set_derivatives(&self, derivatives: &mut DerivativeHolder) {
        derivatives.require(Box::new(AvForce::new(self.pair(), self.balsara)));
        if self.balsara {
            derivatives.require(Box::new(VelocityDivergence));
            derivatives.require(Box::new(VelocityRotation));
        }
    }

    fn create(&self, storage: &mut Storage, _material: &dyn Material) -> Result<(), Error> {
        if self.balsara {
            storage.insert(QuantityId::VelocityDivergence, OrderEnum::Zero, 0.0)?;
            storage.insert(QuantityId::VelocityRotation, OrderEnum::Zero, Vector::ZERO)?;
        }
        Ok(())
    }
}
