pub mod av;
mod continuity;
mod derivative;
mod divergence;
mod fracture;
mod pressure;
mod smoothing_length;
mod stress;

use std::ops::Add;
use std::ops::AddAssign;
use std::sync::Arc;

pub use continuity::ContinuityEquation;
pub use derivative::Accumulated;
pub use derivative::AccumulatedValue;
pub use derivative::BufferKind;
pub use derivative::Derivative;
pub use derivative::DerivativeHolder;
pub use derivative::Phase;
pub use derivative::PHASES;
pub use divergence::VelocityDivergence;
pub use divergence::VelocityGradient;
pub use divergence::VelocityRotation;
pub use fracture::GradyKippFracture;
pub use pressure::PressureForce;
pub use smoothing_length::AdaptiveSmoothingLength;
pub use stress::SolidStressForce;

use crate::error::Error;
use crate::materials::Material;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::storage::Storage;

/// A physical term of the evolution equations: a set of pairwise
/// derivatives plus hooks running on the main thread around the
/// parallel loop.
pub trait EquationTerm: Send + Sync {
    /// Registers the derivatives this term needs; equal derivatives
    /// required by several terms are evaluated once.
    fn set_derivatives(&self, derivatives: &mut DerivativeHolder);

    /// Called before each sub-step, before the derivative loop.
    fn initialize(
        &self,
        _scheduler: &Scheduler,
        _storage: &mut Storage,
        _t: Float,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called after the derivative loop; may post-process the
    /// accumulated results (stress evolution, damage growth).
    fn finalize(
        &self,
        _scheduler: &Scheduler,
        _storage: &mut Storage,
        _t: Float,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Requests the quantities of the term from the storage, at
    /// initial-conditions time.
    fn create(&self, _storage: &mut Storage, _material: &dyn Material) -> Result<(), Error> {
        Ok(())
    }
}

/// Ordered collection of equation terms, composed with `+`.
#[derive(Clone, Default)]
pub struct EquationHolder {
    terms: Vec<Arc<dyn EquationTerm>>,
}

impl EquationHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[Arc<dyn EquationTerm>] {
        &self.terms
    }

    pub fn set_derivatives(&self, derivatives: &mut DerivativeHolder) {
        for term in &self.terms {
            term.set_derivatives(derivatives);
        }
    }
}

/// Wraps a term for composition: `equations += make_term(PressureForce)`.
pub fn make_term<T: EquationTerm + 'static>(term: T) -> EquationHolder {
    EquationHolder {
        terms: vec![Arc::new(term)],
    }
}

impl Add for EquationHolder {
    type Output = EquationHolder;

    fn add(mut self, other: EquationHolder) -> EquationHolder {
        self.terms.extend(other.terms);
        self
    }
}

impl AddAssign for EquationHolder {
    fn add_assign(&mut self, other: EquationHolder) {
        self.terms.extend(other.terms);
    }
}
