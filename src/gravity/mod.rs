mod barnes_hut;
mod moments;

use std::sync::Mutex;

pub use barnes_hut::BarnesHut;
pub use moments::MassMoments;
pub use moments::MultipoleOrder;

use crate::equations::DerivativeHolder;
use crate::equations::EquationTerm;
use crate::error::Error;
use crate::geometry::Vector;
use crate::kernel::GravityLutKernel;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::statistics::Statistics;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Self-gravity backend. `build` constructs the acceleration structure
/// from the current particle state; the structure is immutable during
/// evaluation.
pub trait Gravity: Send + Sync {
    fn build(&mut self, scheduler: &Scheduler, storage: &Storage);

    /// Adds the gravitational accelerations of all particles into `dv`.
    fn eval_all(
        &self,
        scheduler: &Scheduler,
        storage: &Storage,
        dv: &mut [Vector],
        stats: &mut Statistics,
    );

    /// Acceleration at an arbitrary point, for probes and tests.
    fn eval_at(&self, pos: Vector) -> Vector;
}

/// O(N²) pairwise gravity with optional kernel softening. Retained for
/// small particle counts and as the validation reference.
pub struct BruteForceGravity {
    kernel: Option<GravityLutKernel>,
    constant: Float,
    positions: Vec<Vector>,
    masses: Vec<Float>,
}

impl BruteForceGravity {
    pub fn new() -> Self {
        Self {
            kernel: None,
            constant: crate::config::GRAVITY_CONSTANT,
            positions: vec![],
            masses: vec![],
        }
    }

    pub fn softened(kernel: GravityLutKernel) -> Self {
        Self {
            kernel: Some(kernel),
            ..Self::new()
        }
    }

    /// Overrides the gravitational constant, for scaled test problems.
    pub fn with_constant(mut self, constant: Float) -> Self {
        self.constant = constant;
        self
    }

    fn acceleration(&self, pos: Vector, h: Float, skip: Option<usize>) -> Vector {
        let mut acc = Vector::ZERO;
        for (j, (other, &mass)) in self.positions.iter().zip(&self.masses).enumerate() {
            if skip == Some(j) {
                continue;
            }
            let dr = pos - *other;
            let dist = dr.length();
            if dist == 0.0 {
                continue;
            }
            let h_bar = 0.5 * (h + other.h());
            let factor = match &self.kernel {
                Some(kernel) if h_bar > 0.0 => kernel.grad(dist, h_bar),
                _ => 1.0 / (dist * dist * dist),
            };
            acc -= dr * (self.constant * mass * factor);
        }
        acc
    }
}

impl Default for BruteForceGravity {
    fn default() -> Self {
        Self::new()
    }
}

impl Gravity for BruteForceGravity {
    fn build(&mut self, _scheduler: &Scheduler, storage: &Storage) {
        self.positions = storage.values::<Vector>(QuantityId::Position).to_vec();
        self.masses = storage.values::<Float>(QuantityId::Mass).to_vec();
    }

    fn eval_all(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
        dv: &mut [Vector],
        _stats: &mut Statistics,
    ) {
        let positions = storage.values::<Vector>(QuantityId::Position);
        for (i, (target, pos)) in dv.iter_mut().zip(positions).enumerate() {
            *target += self.acceleration(*pos, pos.h(), Some(i));
        }
    }

    fn eval_at(&self, pos: Vector) -> Vector {
        self.acceleration(pos, pos.h(), None)
    }
}

/// Equation term coupling a gravity backend into the solver: the tree
/// is rebuilt in `initialize`, the accelerations are added to the
/// position second derivatives in `finalize`.
pub struct SelfGravity {
    gravity: Mutex<Box<dyn Gravity>>,
}

impl SelfGravity {
    pub fn new(gravity: Box<dyn Gravity>) -> Self {
        Self {
            gravity: Mutex::new(gravity),
        }
    }
}

impl EquationTerm for SelfGravity {
    fn set_derivatives(&self, _derivatives: &mut DerivativeHolder) {
        // long-range interaction, handled outside the pairwise loop
    }

    fn initialize(
        &self,
        scheduler: &Scheduler,
        storage: &mut Storage,
        _t: Float,
    ) -> Result<(), Error> {
        self.gravity
            .lock()
            .expect("gravity backend poisoned")
            .build(scheduler, storage);
        Ok(())
    }

    fn finalize(
        &self,
        scheduler: &Scheduler,
        storage: &mut Storage,
        _t: Float,
    ) -> Result<(), Error> {
        let gravity = self.gravity.lock().expect("gravity backend poisoned");
        let mut stats = Statistics::new();
        let mut dv = storage.d2t::<Vector>(QuantityId::Position).to_vec();
        gravity.eval_all(scheduler, storage, &mut dv, &mut stats);
        storage
            .d2t_mut::<Vector>(QuantityId::Position)
            .copy_from_slice(&dv);
        Ok(())
    }

    fn create(
        &self,
        storage: &mut Storage,
        _material: &dyn crate::materials::Material,
    ) -> Result<(), Error> {
        if !storage.has(QuantityId::Mass) {
            return Err(Error::InvalidSetup(
                "self-gravity needs particle masses".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OrderEnum;

    #[test]
    fn two_body_acceleration_is_newtonian() {
        let mut storage = Storage::new();
        storage
            .insert_with_values(
                QuantityId::Position,
                OrderEnum::Second,
                vec![Vector::new(0.0, 0.0, 0.0), Vector::new(2.0, 0.0, 0.0)],
            )
            .unwrap();
        storage
            .insert_with_values(QuantityId::Mass, OrderEnum::Zero, vec![8.0, 1.0])
            .unwrap();
        let mut gravity = BruteForceGravity::new().with_constant(1.0);
        let scheduler = Scheduler::sequential();
        gravity.build(&scheduler, &storage);
        let mut dv = vec![Vector::ZERO; 2];
        gravity.eval_all(&scheduler, &storage, &mut dv, &mut Statistics::new());
        // a_1 = G m_0 / d² toward the heavy particle
        assert!((dv[1].x() + 8.0 / 4.0).abs() < 1.0e-12);
        assert!((dv[0].x() - 1.0 / 4.0).abs() < 1.0e-12);
    }
}
