mod distribution;

pub use distribution::Distribution;
pub use distribution::HexagonalPacking;
pub use distribution::RandomDistribution;

use std::ops::Range;

use log::info;

use crate::error::Error;
use crate::geometry::Domain;
use crate::geometry::Vector;
use crate::materials::keys;
use crate::materials::Material;
use crate::prelude::Float;
use crate::solvers::Solver;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Smoothing length in units of the mean inter-particle distance.
const SMOOTHING_ETA: Float = 1.3;

/// Populates a storage body by body through the public interfaces: a
/// domain is filled with a particle distribution, the material and the
/// solver request their quantities, and the body is merged into the
/// run storage in sorted-material order.
pub struct InitialConditions<'a> {
    solver: &'a dyn Solver,
    distribution: Box<dyn Distribution>,
}

impl<'a> InitialConditions<'a> {
    pub fn new(solver: &'a dyn Solver) -> Self {
        Self {
            solver,
            distribution: Box::new(HexagonalPacking),
        }
    }

    pub fn with_distribution(mut self, distribution: Box<dyn Distribution>) -> Self {
        self.distribution = distribution;
        self
    }

    /// Adds a body of roughly `particle_count` particles filling the
    /// domain, and returns the index range of the new particles in the
    /// run storage.
    pub fn add_body(
        &self,
        storage: &mut Storage,
        domain: &dyn Domain,
        material: Box<dyn Material>,
        particle_count: usize,
    ) -> Result<Range<usize>, Error> {
        if particle_count == 0 {
            return Err(Error::InvalidSetup("a body needs particles".to_owned()));
        }
        let mut positions = self.distribution.generate(particle_count, domain);
        if positions.is_empty() {
            return Err(Error::InvalidSetup(
                "the distribution produced no particles inside the domain".to_owned(),
            ));
        }
        let volume = domain.volume();
        let particle_volume = volume / positions.len() as Float;
        let h = SMOOTHING_ETA * particle_volume.cbrt();
        for pos in &mut positions {
            pos.set_h(h);
        }
        info!(
            "body with {} particles, h = {:.3e} m",
            positions.len(),
            h
        );

        let density = material.params().get_float_or(keys::DENSITY, 1.0)?;
        let count = positions.len();
        let mut body = Storage::with_material(material);
        body.insert_with_values(QuantityId::Position, OrderEnum::Second, positions)?;
        body.insert(QuantityId::Mass, OrderEnum::Zero, density * particle_volume)?;
        body.insert_with_values(QuantityId::MaterialIdx, OrderEnum::Zero, vec![0u32; count])?;
        {
            let material = body.take_materials();
            self.solver.create(&mut body, &*material[0])?;
            body.set_materials(material);
        }

        let offset = storage.particle_count();
        if storage.quantity_count() == 0 && storage.material_count() == 0 {
            *storage = body;
        } else {
            storage.merge(body);
        }
        Ok(offset..offset + count)
    }
}

/// Assigns a uniform velocity to a particle range, e.g. an impactor.
pub fn set_velocity(storage: &mut Storage, range: Range<usize>, velocity: Vector) {
    for v in &mut storage.dt_mut::<Vector>(QuantityId::Position)[range] {
        let h_rate = v.h();
        *v = velocity;
        v.set_h(h_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::make_term;
    use crate::equations::ContinuityEquation;
    use crate::equations::PressureForce;
    use crate::finders::KdTree;
    use crate::geometry::SphericalDomain;
    use crate::kernel::CubicSpline;
    use crate::materials::EosMaterial;
    use crate::settings::Settings;
    use crate::settings::Value;
    use crate::solvers::SymmetricSolver;

    fn gas_material() -> Box<dyn Material> {
        let mut params = Settings::new();
        params.set(keys::EOS, Value::Str("ideal_gas".to_owned()));
        params.set(keys::DENSITY, Value::Float(1000.0));
        params.set(keys::ENERGY, Value::Float(1.0e3));
        Box::new(EosMaterial::from_params(params).unwrap())
    }

    #[test]
    fn two_bodies_merge_in_material_order() {
        let solver = SymmetricSolver::new(
            CubicSpline,
            Box::<KdTree>::default(),
            make_term(PressureForce) + make_term(ContinuityEquation),
        );
        let ics = InitialConditions::new(&solver);
        let mut storage = Storage::new();
        let target = ics
            .add_body(
                &mut storage,
                &SphericalDomain::new(Vector::ZERO, 1.0),
                gas_material(),
                500,
            )
            .unwrap();
        let impactor = ics
            .add_body(
                &mut storage,
                &SphericalDomain::new(Vector::new(3.0, 0.0, 0.0), 0.3),
                gas_material(),
                50,
            )
            .unwrap();
        assert_eq!(target.start, 0);
        assert_eq!(impactor.end, storage.particle_count());
        assert_eq!(storage.material_count(), 2);
        // the density and pressure quantities were requested
        assert!(storage.has(QuantityId::Density));
        assert!(storage.has(QuantityId::Pressure));
        // material ranges are contiguous and match the returned ranges
        assert_eq!(storage.material_range(0), target);
        assert_eq!(storage.material_range(1), impactor);
        // every particle has a positive smoothing length
        assert!(storage
            .values::<Vector>(QuantityId::Position)
            .iter()
            .all(|r| r.h() > 0.0));
        // total mass matches density times volume within the lattice
        // clipping error
        let total: Float = storage.values::<Float>(QuantityId::Mass)[target.clone()]
            .iter()
            .sum();
        let expected = 1000.0 * 4.0 / 3.0 * std::f64::consts::PI;
        assert!((total - expected).abs() < 0.2 * expected);
    }

    #[test]
    fn velocity_helper_preserves_the_h_rate() {
        let solver = SymmetricSolver::new(
            CubicSpline,
            Box::<KdTree>::default(),
            make_term(ContinuityEquation),
        );
        let ics = InitialConditions::new(&solver);
        let mut storage = Storage::new();
        let range = ics
            .add_body(
                &mut storage,
                &SphericalDomain::new(Vector::ZERO, 1.0),
                gas_material(),
                100,
            )
            .unwrap();
        storage.dt_mut::<Vector>(QuantityId::Position)[0].set_h(-0.25);
        set_velocity(&mut storage, range, Vector::new(-5.0e3, 0.0, 0.0));
        let v = storage.dt::<Vector>(QuantityId::Position)[0];
        assert_eq!(v.x(), -5.0e3);
        assert_eq!(v.h(), -0.25);
    }
}
