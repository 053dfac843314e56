use crate::geometry::Vector;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::storage::ArithmeticValue;
use crate::storage::Holder;
use crate::storage::QuantityData;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Proposes a time step from the current particle state. The actual
/// step is the minimum over all registered criteria, clamped into the
/// configured bounds.
pub trait TimeStepCriterion: Send + Sync {
    /// Returns the candidate step and the name of the criterion, for
    /// the statistics.
    fn compute(&self, scheduler: &Scheduler, storage: &Storage, max_dt: Float)
        -> (Float, &'static str);
}

/// Courant-Friedrichs-Lewy bound: `Δt = C min_i h_i/c_i`.
pub struct CourantCriterion {
    pub courant: Float,
}

impl Default for CourantCriterion {
    fn default() -> Self {
        Self { courant: 0.2 }
    }
}

impl TimeStepCriterion for CourantCriterion {
    fn compute(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
        max_dt: Float,
    ) -> (Float, &'static str) {
        let Ok(cs) = storage.try_values::<Float>(QuantityId::SoundSpeed) else {
            return (max_dt, "courant");
        };
        let positions = storage.values::<Vector>(QuantityId::Position);
        let mut result = max_dt;
        for (r, &cs) in positions.iter().zip(cs) {
            if cs > 0.0 {
                result = result.min(self.courant * r.h() / cs);
            }
        }
        (result, "courant")
    }
}

/// `Δt = min_i √(h_i/|a_i|)`: bounds the distance a particle can be
/// accelerated across within one step.
#[derive(Default)]
pub struct AccelerationCriterion;

impl TimeStepCriterion for AccelerationCriterion {
    fn compute(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
        max_dt: Float,
    ) -> (Float, &'static str) {
        let positions = storage.values::<Vector>(QuantityId::Position);
        let accelerations = storage.d2t::<Vector>(QuantityId::Position);
        let mut result = max_dt;
        for (r, a) in positions.iter().zip(accelerations) {
            let magnitude = a.length();
            if magnitude > 0.0 {
                result = result.min((r.h() / magnitude).sqrt());
            }
        }
        (result, "acceleration")
    }
}

/// Bounds the relative change of every first-order quantity:
/// `Δt = λ min_i |q_i| / |q̇_i|`, with a floor to keep noisy
/// near-zero quantities from freezing the run.
pub struct DerivativeCriterion {
    pub factor: Float,
    pub floor: Float,
}

impl Default for DerivativeCriterion {
    fn default() -> Self {
        Self {
            factor: 0.2,
            floor: 1.0e-12,
        }
    }
}

impl DerivativeCriterion {
    fn candidate<T: ArithmeticValue>(&self, holder: &Holder<T>, max_dt: Float) -> Float {
        let mut result = max_dt;
        for (value, rate) in holder.values().iter().zip(holder.dt()) {
            let rate = rate.magnitude();
            if rate > 0.0 {
                result = result.min(self.factor * (value.magnitude() + self.floor) / rate);
            }
        }
        result
    }
}

impl TimeStepCriterion for DerivativeCriterion {
    fn compute(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
        max_dt: Float,
    ) -> (Float, &'static str) {
        let mut result = max_dt;
        for (id, quantity) in storage.quantities() {
            // positions are bounded by the dedicated criteria
            if id == QuantityId::Position {
                continue;
            }
            if quantity.order() != crate::storage::OrderEnum::First {
                continue;
            }
            result = match quantity.data() {
                QuantityData::Scalar(holder) => result.min(self.candidate(holder, max_dt)),
                QuantityData::Vector(holder) => result.min(self.candidate(holder, max_dt)),
                QuantityData::Tensor(holder) => result.min(self.candidate(holder, max_dt)),
                QuantityData::SymTensor(holder) => result.min(self.candidate(holder, max_dt)),
                QuantityData::TracelessTensor(holder) => {
                    result.min(self.candidate(holder, max_dt))
                }
                QuantityData::Index(_) => result,
            };
        }
        (result, "derivative")
    }
}

/// `Δt = min_i 1/|∇·v_i|`: resolves the fastest local compression.
#[derive(Default)]
pub struct DivergenceCriterion;

impl TimeStepCriterion for DivergenceCriterion {
    fn compute(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
        max_dt: Float,
    ) -> (Float, &'static str) {
        let Ok(divv) = storage.try_values::<Float>(QuantityId::VelocityDivergence) else {
            return (max_dt, "divergence");
        };
        let mut result = max_dt;
        for &divv in divv {
            if divv.abs() > 0.0 {
                result = result.min(1.0 / divv.abs());
            }
        }
        (result, "divergence")
    }
}

/// Takes the minimum over a set of criteria.
#[derive(Default)]
pub struct MultiCriterion {
    criteria: Vec<Box<dyn TimeStepCriterion>>,
}

impl MultiCriterion {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard combination: Courant, acceleration and derivative
    /// bounds.
    pub fn standard(courant: Float) -> Self {
        Self::new()
            .with(Box::new(CourantCriterion { courant }))
            .with(Box::new(AccelerationCriterion))
            .with(Box::new(DerivativeCriterion::default()))
    }

    pub fn with(mut self, criterion: Box<dyn TimeStepCriterion>) -> Self {
        self.criteria.push(criterion);
        self
    }
}

impl TimeStepCriterion for MultiCriterion {
    fn compute(
        &self,
        scheduler: &Scheduler,
        storage: &Storage,
        max_dt: Float,
    ) -> (Float, &'static str) {
        let mut result = (max_dt, "none");
        for criterion in &self.criteria {
            let (candidate, name) = criterion.compute(scheduler, storage, max_dt);
            if candidate < result.0 {
                result = (candidate, name);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::gas_lattice_storage;

    #[test]
    fn courant_scales_with_sound_speed() {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage.values_mut::<Float>(QuantityId::SoundSpeed).fill(3.0);
        let scheduler = Scheduler::sequential();
        let (dt, name) = CourantCriterion { courant: 0.2 }.compute(&scheduler, &storage, 1.0e10);
        // h = 1.5, cs = 3 everywhere
        assert!((dt - 0.2 * 1.5 / 3.0).abs() < 1.0e-12);
        assert_eq!(name, "courant");
    }

    #[test]
    fn acceleration_criterion_limits_fast_particles() {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage.d2t_mut::<Vector>(QuantityId::Position)[5] = Vector::new(100.0, 0.0, 0.0);
        let scheduler = Scheduler::sequential();
        let (dt, _) = AccelerationCriterion.compute(&scheduler, &storage, 1.0e10);
        assert!((dt - (1.5 / 100.0 as Float).sqrt()).abs() < 1.0e-12);
    }

    #[test]
    fn multi_criterion_takes_the_minimum() {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage.values_mut::<Float>(QuantityId::SoundSpeed).fill(1.0e6);
        storage.d2t_mut::<Vector>(QuantityId::Position)[0] = Vector::new(1.0e-8, 0.0, 0.0);
        let scheduler = Scheduler::sequential();
        let criterion = MultiCriterion::standard(0.2);
        let (dt, name) = criterion.compute(&scheduler, &storage, 1.0e10);
        assert_eq!(name, "courant");
        assert!(dt < 1.0e-6);
    }
}
