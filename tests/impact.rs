use rubble::equations::make_term;
use rubble::ics::set_velocity;
use rubble::materials::keys;
use rubble::prelude::*;
use rubble::solvers::ParticlePairingDiagnostic;
use rubble::solvers::FiniteValuesDiagnostic;

/// Scaled-down version of the asteroid collision scenario: a solid
/// target hit by a small impactor at 5 km/s. The run must conserve
/// momentum to pairwise-summation accuracy and keep all velocities
/// bounded.
fn basalt_params() -> Settings {
    let mut params = Settings::new();
    params.set(keys::EOS, Value::Str("tillotson".to_owned()));
    params.set(keys::DENSITY, Value::Float(2700.0));
    params.set(keys::BULK_MODULUS, Value::Float(2.67e10));
    params.set(keys::SHEAR_MODULUS, Value::Float(2.27e10));
    params.set(keys::ELASTICITY_LIMIT, Value::Float(3.5e9));
    params.set(keys::WEIBULL_COEFFICIENT, Value::Float(4.0e35));
    params.set(keys::WEIBULL_EXPONENT, Value::Float(9.0));
    params
}

fn momentum(storage: &Storage) -> Vector {
    storage
        .dt::<Vector>(QuantityId::Position)
        .iter()
        .zip(storage.values::<Float>(QuantityId::Mass))
        .map(|(v, &m)| *v * m)
        .sum()
}

#[test]
fn impact_conserves_momentum_and_bounds_velocities() {
    let target_radius = 1.0e5;
    let impactor_radius = 2.0e4;
    let equations = make_term(PressureForce)
        + make_term(SolidStressForce)
        + make_term(ContinuityEquation)
        + make_term(StandardAV::default())
        + make_term(GradyKippFracture::new(2.0));
    let mut solver = SymmetricSolver::new(CubicSpline, Box::<KdTree>::default(), equations)
        .with_diagnostic(Box::new(FiniteValuesDiagnostic));

    let mut storage = Storage::new();
    let ics = InitialConditions::new(&solver);
    ics.add_body(
        &mut storage,
        &SphericalDomain::new(Vector::ZERO, target_radius),
        Box::new(SolidMaterial::from_params(basalt_params()).unwrap()),
        600,
    )
    .unwrap();
    let impactor = ics
        .add_body(
            &mut storage,
            &SphericalDomain::new(
                Vector::new(1.4 * target_radius, 0.0, 0.0),
                impactor_radius,
            ),
            Box::new(SolidMaterial::from_params(basalt_params()).unwrap()),
            60,
        )
        .unwrap();
    set_velocity(&mut storage, impactor, Vector::new(-5.0e3, 0.0, 0.0));

    let scheduler = Scheduler::sequential();
    let mut stepping = TimeStepping::new(Box::<PredictorCorrector>::default(), 0.1)
        .with_allowed_range(1.0e-6, 0.1)
        .with_criterion(Box::new(MultiCriterion::standard(0.2)))
        .with_max_retries(2);
    let mut stats = Statistics::new();

    let initial_momentum = momentum(&storage);
    let momentum_scale = 2700.0 * 4.0 / 3.0 * std::f64::consts::PI
        * impactor_radius.powi(3)
        * 5.0e3;
    let mut t = 0.0;
    for _ in 0..10 {
        t += stepping
            .step(&scheduler, &mut solver, &mut storage, t, &mut stats)
            .unwrap();
    }
    assert!(t > 0.0);

    let drift = (momentum(&storage) - initial_momentum).length() / momentum_scale;
    assert!(drift < 1.0e-6, "momentum drift {:.3e}", drift);
    let fastest = storage
        .dt::<Vector>(QuantityId::Position)
        .iter()
        .map(|v| v.length())
        .fold(0.0, Float::max);
    assert!(fastest < 1.0e4, "runaway particle at {:.3e} m/s", fastest);

    // damage stayed inside its range and never decreased from zero
    for &d in storage.values::<Float>(QuantityId::Damage) {
        assert!((0.0..=1.0).contains(&d));
    }
}

#[test]
fn pairing_diagnostic_stays_quiet_during_a_short_run() {
    let equations = make_term(PressureForce) + make_term(ContinuityEquation);
    let mut solver = SymmetricSolver::standard(Box::<KdTree>::default(), equations)
        .with_diagnostic(Box::<ParticlePairingDiagnostic>::default());

    let mut params = Settings::new();
    params.set(keys::DENSITY, Value::Float(1000.0));
    params.set(keys::ENERGY, Value::Float(10.0));
    let mut storage = Storage::new();
    let ics = InitialConditions::new(&solver);
    ics.add_body(
        &mut storage,
        &SphericalDomain::new(Vector::ZERO, 1.0),
        Box::new(EosMaterial::from_params(params).unwrap()),
        300,
    )
    .unwrap();

    let scheduler = Scheduler::sequential();
    let mut stepping = TimeStepping::new(Box::<LeapFrog>::default(), 1.0e-3)
        .with_allowed_range(1.0e-8, 1.0e-3)
        .with_criterion(Box::new(MultiCriterion::standard(0.2)));
    let mut stats = Statistics::new();
    let mut t = 0.0;
    for _ in 0..20 {
        t += stepping
            .step(&scheduler, &mut solver, &mut storage, t, &mut stats)
            .unwrap();
    }
}
