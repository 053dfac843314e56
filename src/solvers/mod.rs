mod diagnostics;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub use diagnostics::DamageRangeDiagnostic;
pub use diagnostics::Diagnostic;
pub use diagnostics::DiagnosticsId;
pub use diagnostics::DiagnosticsReport;
pub use diagnostics::FiniteValuesDiagnostic;
pub use diagnostics::ParticlePairingDiagnostic;
pub use diagnostics::SmoothingLengthDiagnostic;

use crate::equations::Accumulated;
use crate::equations::DerivativeHolder;
use crate::equations::EquationHolder;
use crate::equations::PHASES;
use crate::error::Error;
use crate::finders::NeighborFinder;
use crate::finders::NeighborRecord;
use crate::geometry::Vector;
use crate::kernel::Kernel;
use crate::kernel::LutKernel;
use crate::kernel::SymmetrizedKernel;
use crate::kernel::SymmetrizedLutKernel;
use crate::materials::Material;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::scheduler::ThreadLocal;
use crate::statistics::MinMaxMean;
use crate::statistics::Statistics;
use crate::statistics::StatisticsId;
use crate::statistics::StatisticsValue;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Computes the derivatives of all evolved quantities for one sub-step
/// of the integrator.
pub trait Solver: Send {
    /// Requests the quantities of all equation terms for a body made of
    /// the given material. Called once per body at initial-conditions
    /// time.
    fn create(&self, storage: &mut Storage, material: &dyn Material) -> Result<(), Error>;

    /// One derivative evaluation over the current state.
    fn integrate(
        &mut self,
        scheduler: &Scheduler,
        storage: &mut Storage,
        t: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error>;
}

/// Per-thread scratch of the derivative loop.
struct ThreadData {
    accumulated: Accumulated,
    sym_neighs: Vec<NeighborRecord>,
    sym_grads: Vec<Float>,
    all_neighs: Vec<NeighborRecord>,
    all_grads: Vec<Float>,
    neigh_counts: MinMaxMean,
}

/// SPH solver with symmetrized kernel summations: every pair is
/// visited exactly once through lower-rank neighbor queries, and both
/// sides of the pair are written into thread-local accumulators.
///
/// One `integrate` call runs the sub-step sequence: zero the highest
/// derivatives, rebuild the neighbor finder, initialize materials and
/// equation terms, evaluate the three derivative phases in parallel
/// with a deterministic merge after each, then finalize the terms in
/// reverse order and the material rheologies last.
pub struct SymmetricSolver {
    kernel: SymmetrizedLutKernel,
    finder: Box<dyn NeighborFinder>,
    equations: EquationHolder,
    derivatives: DerivativeHolder,
    template: Accumulated,
    diagnostics: Vec<Box<dyn Diagnostic>>,
    abort: Option<Arc<AtomicBool>>,
}

impl SymmetricSolver {
    pub fn new(
        kernel: impl Kernel,
        finder: Box<dyn NeighborFinder>,
        equations: EquationHolder,
    ) -> Self {
        Self::with_lut(LutKernel::new(kernel), finder, equations)
    }

    /// Solver over the shared table of the default kernel.
    pub fn standard(finder: Box<dyn NeighborFinder>, equations: EquationHolder) -> Self {
        Self::with_lut(crate::kernel::standard_kernel().clone(), finder, equations)
    }

    fn with_lut(
        lut: LutKernel,
        finder: Box<dyn NeighborFinder>,
        equations: EquationHolder,
    ) -> Self {
        let mut derivatives = DerivativeHolder::new();
        equations.set_derivatives(&mut derivatives);
        let mut template = Accumulated::default();
        derivatives.create_buffers(&mut template);
        Self {
            kernel: SymmetrizedKernel::new(lut),
            finder,
            equations,
            derivatives,
            template,
            diagnostics: vec![],
            abort: None,
        }
    }

    /// Enables an integrity check after each sub-step; failures surface
    /// as `Error::Diagnostics`.
    pub fn with_diagnostic(mut self, diagnostic: Box<dyn Diagnostic>) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// The solver polls this flag between phases and stops evaluating
    /// further phases of the current sub-step when it is set.
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = Some(abort);
        self
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .map_or(false, |abort| abort.load(Ordering::Relaxed))
    }
}

impl Solver for SymmetricSolver {
    fn create(&self, storage: &mut Storage, material: &dyn Material) -> Result<(), Error> {
        material.create(storage)?;
        for term in self.equations.terms() {
            term.create(storage, material)?;
        }
        Ok(())
    }

    fn integrate(
        &mut self,
        scheduler: &Scheduler,
        storage: &mut Storage,
        t: Float,
        stats: &mut Statistics,
    ) -> Result<(), Error> {
        let count = storage.particle_count();
        storage.zero_highest_derivatives();

        self.finder
            .build(scheduler, storage.values::<Vector>(QuantityId::Position));
        storage.for_each_material(|material, sequence, storage| {
            material.initialize(storage, sequence)
        })?;
        for term in self.equations.terms() {
            term.initialize(scheduler, storage, t)?;
        }
        self.derivatives.init(storage)?;

        let needs_asymmetric = self.derivatives.needs_asymmetric();
        let mut template = self.template.clone();
        template.initialize(count);
        let mut locals = ThreadLocal::new(scheduler, || ThreadData {
            accumulated: template.clone(),
            sym_neighs: vec![],
            sym_grads: vec![],
            all_neighs: vec![],
            all_grads: vec![],
            neigh_counts: MinMaxMean::new(),
        });

        let granularity = scheduler.recommended_granularity(count);
        for phase in PHASES {
            if self.aborted() {
                break;
            }
            {
                let finder = &*self.finder;
                let kernel = &self.kernel;
                let derivatives = &self.derivatives;
                let input = &*storage;
                let locals = &locals;
                scheduler.parallel_for(0..count, granularity, |range| {
                    let mut data = locals.local(scheduler.thread_idx());
                    let data = &mut *data;
                    let positions = input.values::<Vector>(QuantityId::Position);
                    for i in range {
                        let radius = kernel.radius() * positions[i].h();
                        finder.find_lower_rank(i, radius, &mut data.sym_neighs);
                        fill_grads(
                            kernel,
                            positions,
                            i,
                            &data.sym_neighs,
                            &mut data.sym_grads,
                        );
                        if needs_asymmetric {
                            finder.find_all_of(i, radius, &mut data.all_neighs);
                            data.all_neighs.retain(|n| n.index != i);
                            fill_grads(
                                kernel,
                                positions,
                                i,
                                &data.all_neighs,
                                &mut data.all_grads,
                            );
                            data.neigh_counts.accumulate(data.all_neighs.len() as Float);
                        } else {
                            data.neigh_counts
                                .accumulate(2.0 * data.sym_neighs.len() as Float);
                        }
                        derivatives.eval_phase(
                            phase,
                            input,
                            &mut data.accumulated,
                            i,
                            &data.sym_neighs,
                            &data.sym_grads,
                            &data.all_neighs,
                            &data.all_grads,
                        );
                    }
                });
            }
            // barrier passed; merge the thread-local buffers in thread
            // order so the result is reproducible for a thread count
            template.zero_targets(storage, phase);
            locals.for_each_ordered(|data| {
                data.accumulated.store_phase(storage, phase);
            });
        }

        for term in self.equations.terms().iter().rev() {
            term.finalize(scheduler, storage, t)?;
        }
        storage.for_each_material(|material, sequence, storage| {
            material.finalize(storage, sequence)
        })?;

        let mut neigh_counts = MinMaxMean::new();
        locals.for_each_ordered(|data| neigh_counts.merge(&data.neigh_counts));
        stats.set(
            StatisticsId::NeighborCount,
            StatisticsValue::Means(neigh_counts),
        );
        stats.set_int(StatisticsId::ParticleCount, count as i64);

        let mut report = DiagnosticsReport::default();
        for diagnostic in &self.diagnostics {
            if let Some(offenders) = diagnostic.check(scheduler, storage) {
                report.offenders.push(offenders);
            }
        }
        if !report.is_empty() {
            return Err(Error::Diagnostics(report));
        }
        Ok(())
    }
}

fn fill_grads(
    kernel: &SymmetrizedLutKernel,
    positions: &[Vector],
    i: usize,
    neighs: &[NeighborRecord],
    grads: &mut Vec<Float>,
) {
    grads.clear();
    for neigh in neighs {
        let dist = neigh.dist_sqr.sqrt();
        grads.push(kernel.grad(dist, positions[i].h(), positions[neigh.index].h()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::make_term;
    use crate::equations::ContinuityEquation;
    use crate::equations::PressureForce;
    use crate::finders::KdTree;
    use crate::kernel::CubicSpline;
    use crate::test_utils::gas_lattice_storage;

    fn pressure_blob() -> Storage {
        let mut storage = gas_lattice_storage(3, 1.0);
        // central overpressure, ideal-gas-like sound speed
        let center = storage.particle_count() / 2;
        storage.values_mut::<Float>(QuantityId::Pressure).fill(1.0);
        storage.values_mut::<Float>(QuantityId::Pressure)[center] = 10.0;
        storage.values_mut::<Float>(QuantityId::SoundSpeed).fill(1.0);
        storage
    }

    fn make_solver() -> SymmetricSolver {
        let equations = make_term(PressureForce) + make_term(ContinuityEquation);
        SymmetricSolver::new(CubicSpline, Box::<KdTree>::default(), equations)
    }

    #[test]
    fn integrate_produces_outward_acceleration() {
        let mut storage = pressure_blob();
        let mut solver = make_solver();
        let mut stats = Statistics::new();
        solver
            .integrate(&Scheduler::sequential(), &mut storage, 0.0, &mut stats)
            .unwrap();
        let center = storage.particle_count() / 2;
        let r = storage.values::<Vector>(QuantityId::Position).to_vec();
        let dv = storage.d2t::<Vector>(QuantityId::Position);
        // neighbors of the overpressured particle are pushed away
        let mut outward = 0;
        for (i, acc) in dv.iter().enumerate() {
            if i != center && r[i].distance(r[center]) < 2.0 && acc.dot(r[i] - r[center]) > 0.0 {
                outward += 1;
            }
        }
        assert!(outward > 4, "only {} particles pushed outward", outward);
        assert!(stats.get_means(StatisticsId::NeighborCount).unwrap().mean() > 10.0);
    }

    #[test]
    fn thread_count_does_not_change_the_physics() {
        let mut sequential_storage = pressure_blob();
        let mut parallel_storage = pressure_blob();
        let mut stats = Statistics::new();
        make_solver()
            .integrate(
                &Scheduler::sequential(),
                &mut sequential_storage,
                0.0,
                &mut stats,
            )
            .unwrap();
        make_solver()
            .integrate(
                &Scheduler::pool(Some(4)).unwrap(),
                &mut parallel_storage,
                0.0,
                &mut stats,
            )
            .unwrap();
        let a = sequential_storage.d2t::<Vector>(QuantityId::Position);
        let b = parallel_storage.d2t::<Vector>(QuantityId::Position);
        for i in 0..a.len() {
            assert!(
                (a[i] - b[i]).length() < 1.0e-10 * (1.0 + a[i].length()),
                "particle {}",
                i
            );
        }
    }

    #[test]
    fn diagnostics_failure_surfaces_as_error() {
        let mut storage = pressure_blob();
        storage.values_mut::<Float>(QuantityId::Density)[3] = Float::NAN;
        let mut solver = make_solver().with_diagnostic(Box::new(FiniteValuesDiagnostic));
        let result = solver.integrate(
            &Scheduler::sequential(),
            &mut storage,
            0.0,
            &mut Statistics::new(),
        );
        assert!(matches!(result, Err(Error::Diagnostics(_))));
    }
}
