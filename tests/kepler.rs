use rubble::config::ASTRONOMICAL_UNIT;
use rubble::config::GRAVITY_CONSTANT;
use rubble::config::SOLAR_MASS;
use rubble::equations::make_term;
use rubble::gravity::BruteForceGravity;
use rubble::gravity::SelfGravity;
use rubble::prelude::*;
use rubble::timestepping::Integrator;

fn two_body_storage() -> Storage {
    let mut storage = Storage::new();
    // tiny smoothing lengths: point masses far outside any softening
    let h = 1.0;
    storage
        .insert_with_values(
            QuantityId::Position,
            OrderEnum::Second,
            vec![
                Vector::with_h(0.0, 0.0, 0.0, h),
                Vector::with_h(ASTRONOMICAL_UNIT, 0.0, 0.0, h),
            ],
        )
        .unwrap();
    storage
        .insert_with_values(
            QuantityId::Mass,
            OrderEnum::Zero,
            vec![SOLAR_MASS, 0.75 * SOLAR_MASS],
        )
        .unwrap();
    let circular = (GRAVITY_CONSTANT * SOLAR_MASS / ASTRONOMICAL_UNIT).sqrt();
    storage.dt_mut::<Vector>(QuantityId::Position)[1] = Vector::new(0.0, circular, 0.0);
    storage
}

fn semi_major_axis(storage: &Storage) -> f64 {
    let r = storage.values::<Vector>(QuantityId::Position);
    let v = storage.dt::<Vector>(QuantityId::Position);
    let m = storage.values::<Float>(QuantityId::Mass);
    let mu = GRAVITY_CONSTANT * (m[0] + m[1]);
    let dist = r[0].distance(r[1]);
    let speed_sqr = (v[0] - v[1]).length_sqr();
    1.0 / (2.0 / dist - speed_sqr / mu)
}

#[test]
fn leapfrog_keeps_the_semi_major_axis() {
    let mut storage = two_body_storage();
    let equations = make_term(SelfGravity::new(Box::new(BruteForceGravity::new())));
    let mut solver = SymmetricSolver::new(CubicSpline, Box::new(BruteForceFinder::new()), equations);
    let mut integrator = LeapFrog::default();
    let scheduler = Scheduler::sequential();
    let mut stats = Statistics::new();

    let initial = semi_major_axis(&storage);
    let dt = 1.0e5;
    // 5000 days
    let steps = (5000.0 * 86400.0 / dt) as usize;
    for step in 0..steps {
        integrator
            .step(
                &scheduler,
                &mut solver,
                &mut storage,
                step as Float * dt,
                dt,
                &mut stats,
            )
            .unwrap();
    }
    approx::assert_relative_eq!(semi_major_axis(&storage), initial, max_relative = 1.0e-4);
}

#[test]
fn momentum_of_the_pair_is_conserved() {
    let mut storage = two_body_storage();
    let equations = make_term(SelfGravity::new(Box::new(BruteForceGravity::new())));
    let mut solver = SymmetricSolver::new(CubicSpline, Box::new(BruteForceFinder::new()), equations);
    let mut integrator = LeapFrog::default();
    let scheduler = Scheduler::sequential();
    let mut stats = Statistics::new();

    let momentum = |storage: &Storage| -> Vector {
        storage
            .dt::<Vector>(QuantityId::Position)
            .iter()
            .zip(storage.values::<Float>(QuantityId::Mass))
            .map(|(v, &m)| *v * m)
            .sum()
    };
    let initial = momentum(&storage);
    for step in 0..500 {
        integrator
            .step(
                &scheduler,
                &mut solver,
                &mut storage,
                step as Float * 1.0e5,
                1.0e5,
                &mut stats,
            )
            .unwrap();
    }
    let scale = SOLAR_MASS * 3.0e4;
    assert!((momentum(&storage) - initial).length() / scale < 1.0e-10);
}
