mod criteria;

pub use criteria::AccelerationCriterion;
pub use criteria::CourantCriterion;
pub use criteria::DerivativeCriterion;
pub use criteria::DivergenceCriterion;
pub use criteria::MultiCriterion;
pub use criteria::TimeStepCriterion;

use log::warn;

use crate::error::Error;
use crate::geometry::Interval;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::solvers::Solver;
use crate::statistics::Statistics;
use crate::statistics::StatisticsId;
use crate::statistics::StatisticsValue;
use crate::storage::ArithmeticValue;
use crate::storage::Holder;
use crate::storage::OrderEnum;
use crate::storage::QuantityPairVisitorMut;
use crate::storage::QuantityVisitorMut;
use crate::storage::Storage;
use crate::storage::VisitorFlags;

/// Advances the storage by one step of a concrete scheme. One `step`
/// may involve several solver evaluations.
pub trait Integrator: Send {
    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        scheduler: &Scheduler,
        solver: &mut dyn Solver,
        storage: &mut Storage,
        t: Float,
        dt: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error>;
}

/// Drives an integrator: asks the criteria for a step, clamps it,
/// retries with a halved step when the solver reports a diagnostics
/// failure, clamps all quantities into their material intervals and
/// publishes the step statistics.
/// End-of-step callback; returning `false` requests a clean
/// termination after the completed step.
pub type StepCallback = Box<dyn FnMut(&Statistics) -> bool + Send>;

pub struct TimeStepping {
    integrator: Box<dyn Integrator>,
    dt: Float,
    allowed_dt: Interval,
    criterion: Option<Box<dyn TimeStepCriterion>>,
    max_retries: usize,
    callback: Option<StepCallback>,
    abort_requested: bool,
}

impl TimeStepping {
    pub fn new(integrator: Box<dyn Integrator>, initial_dt: Float) -> Self {
        assert!(initial_dt > 0.0);
        Self {
            integrator,
            dt: initial_dt,
            allowed_dt: Interval::new(0.0, initial_dt),
            criterion: None,
            max_retries: 0,
            callback: None,
            abort_requested: false,
        }
    }

    pub fn with_allowed_range(mut self, min_dt: Float, max_dt: Float) -> Self {
        self.allowed_dt = Interval::new(min_dt, max_dt);
        self
    }

    pub fn with_criterion(mut self, criterion: Box<dyn TimeStepCriterion>) -> Self {
        self.criterion = Some(criterion);
        self
    }

    /// Enables restore-and-retry with a halved step after recoverable
    /// solver failures, up to the given bound.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Polled at the end of every step; when it returns `false` the
    /// step still completes and `abort_requested` flips.
    pub fn with_callback(mut self, callback: StepCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn current_dt(&self) -> Float {
        self.dt
    }

    /// Whether the caller's callback asked to end the run.
    pub fn abort_requested(&self) -> bool {
        self.abort_requested
    }

    /// Advances the run by one step and returns the step actually
    /// taken.
    pub fn step(
        &mut self,
        scheduler: &Scheduler,
        solver: &mut dyn Solver,
        storage: &mut Storage,
        t: Float,
        stats: &mut Statistics,
    ) -> Result<Float, Error> {
        if let Some(criterion) = &self.criterion {
            let (candidate, name) =
                criterion.compute(scheduler, storage, self.allowed_dt.upper());
            self.dt = self.allowed_dt.clamp(candidate);
            stats.set(
                StatisticsId::LimitingCriterion,
                StatisticsValue::Text(name.to_owned()),
            );
        }
        let mut dt = self.dt;
        let mut attempt = 0;
        loop {
            let snapshot = if self.max_retries > 0 {
                Some(storage.clone_flags(VisitorFlags::ALL_BUFFERS))
            } else {
                None
            };
            match self
                .integrator
                .step(scheduler, solver, storage, t, dt, stats)
            {
                Ok(()) => break,
                Err(error) if error.is_recoverable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "step failed ({}), retrying with dt = {:.3e}",
                        error,
                        0.5 * dt
                    );
                    if let Some(mut snapshot) = snapshot {
                        storage.swap_flags(&mut snapshot, VisitorFlags::ALL_BUFFERS);
                    }
                    dt *= 0.5;
                    stats.increment(StatisticsId::TimestepRetries, 1);
                }
                Err(error) => return Err(error),
            }
        }
        storage.clamp_material_ranges();
        stats.set_float(StatisticsId::Timestep, dt);
        self.dt = dt;
        if let Some(callback) = &mut self.callback {
            if !callback(stats) {
                self.abort_requested = true;
            }
        }
        Ok(dt)
    }
}

/// `v += a Δt`, `x += v Δt`, first-order quantities alike; the
/// simplest scheme and the building block of the others.
struct EulerStepVisitor {
    dt: Float,
}

impl QuantityVisitorMut for EulerStepVisitor {
    fn visit<T: ArithmeticValue>(&mut self, range: &Interval, holder: &mut Holder<T>) {
        let order = holder.order();
        let (v, dv, d2v) = holder.all_mut();
        match order {
            OrderEnum::Zero => {}
            OrderEnum::First => {
                for i in 0..v.len() {
                    v[i] += dv[i] * self.dt;
                    v[i] = v[i].clamped(range);
                }
            }
            OrderEnum::Second => {
                for i in 0..v.len() {
                    dv[i] += d2v[i] * self.dt;
                    v[i] += dv[i] * self.dt;
                    v[i] = v[i].clamped(range);
                }
            }
        }
    }
}

/// Kick of a leapfrog: only the first derivatives of second-order
/// quantities move.
struct KickVisitor {
    dt: Float,
}

impl QuantityVisitorMut for KickVisitor {
    fn visit<T: ArithmeticValue>(&mut self, _range: &Interval, holder: &mut Holder<T>) {
        if holder.order() != OrderEnum::Second {
            return;
        }
        let (_, dv, d2v) = holder.all_mut();
        for i in 0..dv.len() {
            dv[i] += d2v[i] * self.dt;
        }
    }
}

/// Drift of a leapfrog: values of second-order quantities advance with
/// the half-kicked velocities.
struct DriftVisitor {
    dt: Float,
}

impl QuantityVisitorMut for DriftVisitor {
    fn visit<T: ArithmeticValue>(&mut self, range: &Interval, holder: &mut Holder<T>) {
        if holder.order() != OrderEnum::Second {
            return;
        }
        let (v, dv, _) = holder.all_mut();
        for i in 0..v.len() {
            v[i] += dv[i] * self.dt;
            v[i] = v[i].clamped(range);
        }
    }
}

/// Advance of first-order quantities only.
struct FirstOrderStepVisitor {
    dt: Float,
}

impl QuantityVisitorMut for FirstOrderStepVisitor {
    fn visit<T: ArithmeticValue>(&mut self, range: &Interval, holder: &mut Holder<T>) {
        if holder.order() != OrderEnum::First {
            return;
        }
        let (v, dv, _) = holder.all_mut();
        for i in 0..v.len() {
            v[i] += dv[i] * self.dt;
            v[i] = v[i].clamped(range);
        }
    }
}

/// Predictor of the predictor-corrector: like Euler, but the values of
/// second-order quantities include the `Δt²/2` term.
struct PredictVisitor {
    dt: Float,
}

impl QuantityVisitorMut for PredictVisitor {
    fn visit<T: ArithmeticValue>(&mut self, range: &Interval, holder: &mut Holder<T>) {
        let order = holder.order();
        let dt2 = 0.5 * self.dt * self.dt;
        let (v, dv, d2v) = holder.all_mut();
        match order {
            OrderEnum::Zero => {}
            OrderEnum::First => {
                for i in 0..v.len() {
                    v[i] += dv[i] * self.dt;
                    v[i] = v[i].clamped(range);
                }
            }
            OrderEnum::Second => {
                for i in 0..v.len() {
                    v[i] += dv[i] * self.dt + d2v[i] * dt2;
                    dv[i] += d2v[i] * self.dt;
                    v[i] = v[i].clamped(range);
                }
            }
        }
    }
}

/// Corrector: pulls the prediction toward the midpoint rule using the
/// difference between the fresh derivatives (in the run storage) and
/// the predictor derivatives (in the snapshot).
struct CorrectVisitor {
    dt: Float,
}

impl QuantityPairVisitorMut for CorrectVisitor {
    fn visit<T: ArithmeticValue>(
        &mut self,
        range: &Interval,
        current: &mut Holder<T>,
        predictions: &mut Holder<T>,
    ) {
        let order = current.order();
        let dt2 = 0.5 * self.dt * self.dt;
        let (v, dv, d2v) = current.all_mut();
        let (_, pdv, pd2v) = predictions.all_mut();
        match order {
            OrderEnum::Zero => {}
            OrderEnum::First => {
                for i in 0..v.len() {
                    v[i] = v[i] - (pdv[i] - dv[i]) * (0.5 * self.dt);
                    v[i] = v[i].clamped(range);
                }
            }
            OrderEnum::Second => {
                for i in 0..v.len() {
                    v[i] = v[i] - (pd2v[i] - d2v[i]) * (dt2 / 3.0);
                    dv[i] = dv[i] - (pd2v[i] - d2v[i]) * (0.5 * self.dt);
                    v[i] = v[i].clamped(range);
                }
            }
        }
    }
}

/// Advances `target` from its own state using the derivatives (and,
/// for positions, the velocities) of `source`: the stage update of the
/// Runge-Kutta and midpoint schemes.
struct AdvanceFromVisitor {
    dt: Float,
}

impl QuantityPairVisitorMut for AdvanceFromVisitor {
    fn visit<T: ArithmeticValue>(
        &mut self,
        range: &Interval,
        target: &mut Holder<T>,
        source: &mut Holder<T>,
    ) {
        let order = target.order();
        let (v, dv, _) = target.all_mut();
        let (_, sdv, sd2v) = source.all_mut();
        match order {
            OrderEnum::Zero => {}
            OrderEnum::First => {
                for i in 0..v.len() {
                    v[i] += sdv[i] * self.dt;
                    v[i] = v[i].clamped(range);
                }
            }
            OrderEnum::Second => {
                for i in 0..v.len() {
                    v[i] += sdv[i] * self.dt;
                    dv[i] += sd2v[i] * self.dt;
                    v[i] = v[i].clamped(range);
                }
            }
        }
    }
}

/// Averages the state values of two storages into the first; the final
/// combination of the modified midpoint method.
struct AverageVisitor;

impl QuantityPairVisitorMut for AverageVisitor {
    fn visit<T: ArithmeticValue>(
        &mut self,
        _range: &Interval,
        target: &mut Holder<T>,
        other: &mut Holder<T>,
    ) {
        let order = target.order();
        let (v, dv, _) = target.all_mut();
        let (ov, odv, _) = other.all_mut();
        match order {
            OrderEnum::Zero => {}
            OrderEnum::First => {
                for i in 0..v.len() {
                    v[i] = (v[i] + ov[i]) * 0.5;
                }
            }
            OrderEnum::Second => {
                for i in 0..v.len() {
                    v[i] = (v[i] + ov[i]) * 0.5;
                    dv[i] = (dv[i] + odv[i]) * 0.5;
                }
            }
        }
    }
}

fn visit_pairs(
    storage: &mut Storage,
    other: &mut Storage,
    visitor: &mut impl QuantityPairVisitorMut,
) {
    for ((id, quantity), (other_id, other_quantity)) in
        storage.quantities_mut().zip(other.quantities_mut())
    {
        debug_assert_eq!(id, other_id);
        quantity.visit_pair_mut(other_quantity, visitor);
    }
}

/// Runs a solver evaluation on an intermediate stage storage, lending
/// it the materials of the run storage.
fn integrate_stage(
    scheduler: &Scheduler,
    solver: &mut dyn Solver,
    run_storage: &mut Storage,
    stage: &mut Storage,
    t: Float,
    stats: &mut Statistics,
) -> Result<(), Error> {
    stage.set_materials(run_storage.take_materials());
    let result = solver.integrate(scheduler, stage, t, stats);
    run_storage.set_materials(stage.take_materials());
    result
}

/// One solver call, forward Euler update.
#[derive(Default)]
pub struct EulerExplicit;

impl Integrator for EulerExplicit {
    fn step(
        &mut self,
        scheduler: &Scheduler,
        solver: &mut dyn Solver,
        storage: &mut Storage,
        t: Float,
        dt: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error> {
        solver.integrate(scheduler, storage, t, stats)?;
        storage.visit_quantities_mut(&mut EulerStepVisitor { dt });
        Ok(())
    }
}

/// Predict with the previous derivatives, evaluate on the prediction,
/// correct with the midpoint rule. Keeps a snapshot of the previous
/// highest derivatives between steps.
#[derive(Default)]
pub struct PredictorCorrector {
    predictions: Option<Storage>,
}

impl Integrator for PredictorCorrector {
    fn step(
        &mut self,
        scheduler: &Scheduler,
        solver: &mut dyn Solver,
        storage: &mut Storage,
        t: Float,
        dt: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error> {
        if self.predictions.is_none() {
            // first step: fill the derivative cache with an evaluation
            // of the initial state
            solver.integrate(scheduler, storage, t, stats)?;
        }
        storage.visit_quantities_mut(&mut PredictVisitor { dt });
        let mut predictions = storage.clone_flags(VisitorFlags::HIGHEST_DERIVATIVES);
        solver.integrate(scheduler, storage, t, stats)?;
        visit_pairs(storage, &mut predictions, &mut CorrectVisitor { dt });
        self.predictions = Some(predictions);
        Ok(())
    }
}

/// Kick-drift-kick leapfrog: symplectic for separable Hamiltonians,
/// the workhorse of orbital dynamics.
#[derive(Default)]
pub struct LeapFrog {
    initialized: bool,
}

impl Integrator for LeapFrog {
    fn step(
        &mut self,
        scheduler: &Scheduler,
        solver: &mut dyn Solver,
        storage: &mut Storage,
        t: Float,
        dt: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error> {
        if !self.initialized {
            solver.integrate(scheduler, storage, t, stats)?;
            self.initialized = true;
        }
        storage.visit_quantities_mut(&mut KickVisitor { dt: 0.5 * dt });
        storage.visit_quantities_mut(&mut DriftVisitor { dt });
        solver.integrate(scheduler, storage, t, stats)?;
        storage.visit_quantities_mut(&mut KickVisitor { dt: 0.5 * dt });
        storage.visit_quantities_mut(&mut FirstOrderStepVisitor { dt });
        Ok(())
    }
}

/// Classical fourth-order Runge-Kutta, four solver calls per step.
#[derive(Default)]
pub struct RungeKutta4;

impl Integrator for RungeKutta4 {
    fn step(
        &mut self,
        scheduler: &Scheduler,
        solver: &mut dyn Solver,
        storage: &mut Storage,
        t: Float,
        dt: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error> {
        let initial = storage.clone_flags(VisitorFlags::ALL_BUFFERS);

        // k1 evaluated in place
        solver.integrate(scheduler, storage, t, stats)?;

        let mut stage2 = initial.clone_flags(VisitorFlags::ALL_BUFFERS);
        visit_pairs(&mut stage2, storage, &mut AdvanceFromVisitor { dt: 0.5 * dt });
        integrate_stage(scheduler, solver, storage, &mut stage2, t, stats)?;

        let mut stage3 = initial.clone_flags(VisitorFlags::ALL_BUFFERS);
        visit_pairs(&mut stage3, &mut stage2, &mut AdvanceFromVisitor { dt: 0.5 * dt });
        integrate_stage(scheduler, solver, storage, &mut stage3, t, stats)?;

        let mut stage4 = initial.clone_flags(VisitorFlags::ALL_BUFFERS);
        visit_pairs(&mut stage4, &mut stage3, &mut AdvanceFromVisitor { dt });
        integrate_stage(scheduler, solver, storage, &mut stage4, t, stats)?;

        // final combination: y += dt/6 (k1 + 2k2 + 2k3 + k4)
        let mut result = initial;
        visit_pairs(&mut result, storage, &mut AdvanceFromVisitor { dt: dt / 6.0 });
        visit_pairs(&mut result, &mut stage2, &mut AdvanceFromVisitor { dt: dt / 3.0 });
        visit_pairs(&mut result, &mut stage3, &mut AdvanceFromVisitor { dt: dt / 3.0 });
        visit_pairs(&mut result, &mut stage4, &mut AdvanceFromVisitor { dt: dt / 6.0 });
        storage.swap_flags(&mut result, VisitorFlags::STATE_VALUES);
        Ok(())
    }
}

/// Modified midpoint scheme with a configurable number of
/// sub-divisions (Bulirsch-Stoer building block).
pub struct ModifiedMidpoint {
    subdivisions: usize,
}

impl ModifiedMidpoint {
    pub fn new(subdivisions: usize) -> Self {
        assert!(subdivisions >= 2);
        Self { subdivisions }
    }
}

impl Default for ModifiedMidpoint {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Integrator for ModifiedMidpoint {
    fn step(
        &mut self,
        scheduler: &Scheduler,
        solver: &mut dyn Solver,
        storage: &mut Storage,
        t: Float,
        dt: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error> {
        let sub_dt = dt / self.subdivisions as Float;

        // z0 and f(z0)
        solver.integrate(scheduler, storage, t, stats)?;
        let mut previous = storage.clone_flags(VisitorFlags::ALL_BUFFERS);
        // z1 = z0 + h f(z0)
        let mut current = storage.clone_flags(VisitorFlags::ALL_BUFFERS);
        visit_pairs(&mut current, storage, &mut AdvanceFromVisitor { dt: sub_dt });

        for _ in 1..self.subdivisions {
            // z_{m+1} = z_{m-1} + 2h f(z_m)
            integrate_stage(scheduler, solver, storage, &mut current, t, stats)?;
            let mut next = previous;
            visit_pairs(
                &mut next,
                &mut current,
                &mut AdvanceFromVisitor { dt: 2.0 * sub_dt },
            );
            previous = current;
            current = next;
        }

        // final: ½ (z_n + z_{n-1} + h f(z_n))
        integrate_stage(scheduler, solver, storage, &mut current, t, stats)?;
        let mut result = previous;
        visit_pairs(
            &mut result,
            &mut current,
            &mut AdvanceFromVisitor { dt: sub_dt },
        );
        visit_pairs(&mut result, &mut current, &mut AverageVisitor);
        storage.swap_flags(&mut result, VisitorFlags::STATE_VALUES);
        Ok(())
    }
}
