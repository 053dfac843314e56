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

const AV_EPS: Float = 1.0e-2;

/// Standard artificial viscosity (Monaghan 1989): scalar dissipation
/// from the pairwise velocity divergence, with constant coefficients
/// `α` and `β` shared by all particles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StandardAV {
    pub alpha: Float,
    pub beta: Float,
    pub balsara: bool,
}

impl Default for StandardAV {
    fn default() -> Self {
        Self {
            alpha: 1.5,
            beta: 3.0,
            balsara: false,
        }
    }
}

impl StandardAV {
    pub fn new(alpha: Float, beta: Float) -> Self {
        Self {
            alpha,
            beta,
            balsara: false,
        }
    }

    pub fn with_balsara(mut self) -> Self {
        self.balsara = true;
        self
    }

    pub(crate) fn pair(&self) -> StandardPair {
        StandardPair {
            alpha: self.alpha,
            beta: self.beta,
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
pub(crate) struct StandardPair {
    pub alpha: Float,
    pub beta: Float,
}

impl PairwiseAv for StandardPair {
    fn pi(&self, input: &AvInput, i: usize, j: usize) -> Float {
        let dvdr = (input.v[i] - input.v[j]).dot(input.r[i] - input.r[j]);
        if dvdr >= 0.0 {
            return 0.0;
        }
        let h_bar = 0.5 * (input.r[i].h() + input.r[j].h());
        let rho_bar = 0.5 * (input.rho[i] + input.rho[j]);
        let cs_bar = 0.5 * (input.cs[i] + input.cs[j]);
        let dist_sqr = (input.r[i] - input.r[j]).length_sqr();
        let mu = h_bar * dvdr / (dist_sqr + AV_EPS * h_bar * h_bar);
        (-self.alpha * cs_bar * mu + self.beta * mu * mu) / rho_bar
    }
}

impl EquationTerm for StandardAV {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viscosity_vanishes_for_receding_pairs() {
        let pair = StandardPair {
            alpha: 1.0,
            beta: 2.0,
        };
        let r = vec![
            Vector::with_h(0.0, 0.0, 0.0, 1.0),
            Vector::with_h(1.0, 0.0, 0.0, 1.0),
        ];
        let v_approach = vec![Vector::new(1.0, 0.0, 0.0), Vector::new(-1.0, 0.0, 0.0)];
        let v_recede = vec![Vector::new(-1.0, 0.0, 0.0), Vector::new(1.0, 0.0, 0.0)];
        let rho = vec![1.0, 1.0];
        let cs = vec![1.0, 1.0];
        let approach = AvInput {
            r: &r,
            v: &v_approach,
            rho: &rho,
            cs: &cs,
            alpha: None,
            divv: None,
            rotv: None,
        };
        assert!(pair.pi(&approach, 0, 1) > 0.0);
        let recede = AvInput {
            v: &v_recede,
            ..approach
        };
        assert_eq!(pair.pi(&recede, 0, 1), 0.0);
    }
}
