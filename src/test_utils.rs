use std::ops::Range;

use crate::equations::Accumulated;
use crate::equations::Derivative;
use crate::equations::Phase;
use crate::error::Error;
use crate::finders::BruteForceFinder;
use crate::finders::NeighborFinder;
use crate::finders::NeighborRecord;
use crate::geometry::Vector;
use crate::kernel::CubicSpline;
use crate::kernel::LutKernel;
use crate::kernel::SymmetrizedKernel;
use crate::materials::Material;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::settings::Settings;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

pub fn assert_float_is_close(x: Float, y: Float) {
    assert!((x - y).abs() < 10.0 * Float::EPSILON, "{} {}", x, y)
}

/// Material carrying only parameter values, for tests that need
/// parameters but no constitutive models.
struct ParamMaterial {
    params: Settings,
}

impl Material for ParamMaterial {
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

pub fn material_with_params(params: Settings) -> Box<dyn Material> {
    Box::new(ParamMaterial { params })
}

/// Cubic lattice of gas particles spanning `[-n, n]³` cells with unit
/// density, consistent masses and overlapping kernel supports. The
/// particle at the center of the index range sits at the origin.
pub fn gas_lattice_storage(n: i32, spacing: Float) -> Storage {
    let h = 1.5 * spacing;
    let mut positions = vec![];
    for x in -n..=n {
        for y in -n..=n {
            for z in -n..=n {
                positions.push(Vector::with_h(
                    x as Float * spacing,
                    y as Float * spacing,
                    z as Float * spacing,
                    h,
                ));
            }
        }
    }
    let mut storage = Storage::new();
    storage
        .insert_with_values(QuantityId::Position, OrderEnum::Second, positions)
        .unwrap();
    storage
        .insert(QuantityId::Mass, OrderEnum::Zero, spacing.powi(3))
        .unwrap();
    storage
        .insert(QuantityId::Density, OrderEnum::First, 1.0)
        .unwrap();
    storage
        .insert(QuantityId::Energy, OrderEnum::First, 0.0)
        .unwrap();
    storage
        .insert(QuantityId::Pressure, OrderEnum::Zero, 0.0)
        .unwrap();
    storage
        .insert(QuantityId::SoundSpeed, OrderEnum::Zero, 0.0)
        .unwrap();
    storage
}

/// Runs a single derivative through a sequential mini-pipeline:
/// neighbor search, gradient precomputation, evaluation, merge into
/// the storage. Mirrors what the solver does for one phase with one
/// derivative.
pub fn run_single_derivative(
    storage: &mut Storage,
    mut derivative: Box<dyn Derivative>,
    phase: Phase,
) {
    assert_eq!(derivative.phase(), phase);
    let scheduler = Scheduler::sequential();
    let kernel = SymmetrizedKernel::new(LutKernel::new(CubicSpline));
    let mut finder = BruteForceFinder::new();
    {
        let positions = storage.values::<Vector>(QuantityId::Position);
        finder.build(&scheduler, positions);
    }

    let mut accumulated = Accumulated::default();
    derivative.create(&mut accumulated);
    accumulated.initialize(storage.particle_count());
    derivative.init(storage).unwrap();
    accumulated.zero_targets(storage, phase);

    let mut neighs: Vec<NeighborRecord> = vec![];
    let mut grads: Vec<Float> = vec![];
    for i in 0..storage.particle_count() {
        let positions = storage.values::<Vector>(QuantityId::Position);
        let radius = kernel.radius() * positions[i].h();
        if derivative.symmetric() {
            finder.find_lower_rank(i, radius, &mut neighs);
        } else {
            finder.find_all_of(i, radius, &mut neighs);
            neighs.retain(|n| n.index != i);
        }
        grads.clear();
        for neigh in &neighs {
            let dist = neigh.dist_sqr.sqrt();
            grads.push(kernel.grad(dist, positions[i].h(), positions[neigh.index].h()));
        }
        derivative.eval(storage, &mut accumulated, i, &neighs, &grads);
    }
    accumulated.store_phase(storage, phase);
}
