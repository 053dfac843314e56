use rubble::equations::make_term;
use rubble::materials::keys;
use rubble::prelude::*;

/// Scaled-down Sedov-like blast: energy deposited at the center of a
/// uniform gas ball drives an outward-moving density shell. The full
/// self-similar comparison needs far more particles than a unit test
/// can afford; this checks the qualitative behavior plus the exact
/// conservation laws.
#[test]
fn blast_wave_expands_and_conserves_mass_and_momentum() {
    let mut params = Settings::new();
    params.set(keys::EOS, Value::Str("ideal_gas".to_owned()));
    params.set(keys::ADIABATIC_INDEX, Value::Float(5.0 / 3.0));
    params.set(keys::DENSITY, Value::Float(1.0));
    params.set(keys::ENERGY, Value::Float(1.0e-4));

    let equations = make_term(PressureForce)
        + make_term(ContinuityEquation)
        + make_term(StandardAV::default())
        + make_term(AdaptiveSmoothingLength::new(1.0e-4));
    let mut solver = SymmetricSolver::new(CubicSpline, Box::<KdTree>::default(), equations);

    let mut storage = Storage::new();
    let ics = InitialConditions::new(&solver);
    ics.add_body(
        &mut storage,
        &SphericalDomain::new(Vector::ZERO, 1.0),
        Box::new(EosMaterial::from_params(params).unwrap()),
        800,
    )
    .unwrap();

    // deposit the blast energy into the innermost particles
    let blast_radius = 0.25;
    {
        let positions = storage.values::<Vector>(QuantityId::Position).to_vec();
        let energy = storage.values_mut::<Float>(QuantityId::Energy);
        let mut heated = 0;
        for (i, pos) in positions.iter().enumerate() {
            if pos.length() < blast_radius {
                energy[i] = 4.0;
                heated += 1;
            }
        }
        assert!(heated > 0, "blast region contains no particles");
    }

    let total_mass = |storage: &Storage| -> Float {
        storage.values::<Float>(QuantityId::Mass).iter().sum()
    };
    let momentum = |storage: &Storage| -> Vector {
        storage
            .dt::<Vector>(QuantityId::Position)
            .iter()
            .zip(storage.values::<Float>(QuantityId::Mass))
            .map(|(v, &m)| *v * m)
            .sum()
    };
    let total_speed = |storage: &Storage| -> Float {
        storage
            .dt::<Vector>(QuantityId::Position)
            .iter()
            .map(|v| v.length())
            .sum()
    };

    let initial_mass = total_mass(&storage);
    let momentum_scale = initial_mass;

    let scheduler = Scheduler::pool(Some(4)).unwrap();
    let mut stepping = TimeStepping::new(Box::<PredictorCorrector>::default(), 1.0e-2)
        .with_allowed_range(1.0e-8, 1.0e-2)
        .with_criterion(Box::new(MultiCriterion::standard(0.2)));
    let mut stats = Statistics::new();
    let mut t = 0.0;
    for _ in 0..40 {
        t += stepping
            .step(&scheduler, &mut solver, &mut storage, t, &mut stats)
            .unwrap();
    }

    // the blast pushed material outward
    assert!(total_speed(&storage) > 0.0);
    let positions = storage.values::<Vector>(QuantityId::Position);
    let velocities = storage.dt::<Vector>(QuantityId::Position);
    let mut outward = 0;
    let mut moving = 0;
    for (r, v) in positions.iter().zip(velocities) {
        if v.length() > 1.0e-3 {
            moving += 1;
            if v.dot(*r) > 0.0 {
                outward += 1;
            }
        }
    }
    assert!(moving > 50, "only {} particles moving", moving);
    assert!(
        outward as Float > 0.9 * moving as Float,
        "{} of {} moving particles stream outward",
        outward,
        moving
    );

    // conservation: mass exactly, momentum to summation accuracy
    assert_eq!(total_mass(&storage), initial_mass);
    assert!(momentum(&storage).length() / momentum_scale < 1.0e-9);

    // smoothing lengths responded to the expansion but stayed positive
    assert!(positions.iter().all(|r| r.h() > 0.0));
}
