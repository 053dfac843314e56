use rand::Rng;
use rand::SeedableRng;

use crate::geometry::Domain;
use crate::geometry::Vector;
use crate::prelude::Float;

/// Generates initial particle positions inside a domain. The returned
/// count is approximate: lattice distributions clip to the domain
/// boundary.
pub trait Distribution: Send + Sync {
    fn generate(&self, particle_count: usize, domain: &dyn Domain) -> Vec<Vector>;
}

/// Hexagonal close packing: the densest regular lattice, free of the
/// preferred directions a cubic lattice imprints on the flow.
#[derive(Default)]
pub struct HexagonalPacking;

impl Distribution for HexagonalPacking {
    fn generate(&self, particle_count: usize, domain: &dyn Domain) -> Vec<Vector> {
        debug_assert!(particle_count > 0);
        let volume = domain.volume();
        // lattice spacing from the per-particle volume of hcp,
        // v = a³/√2
        let spacing = (std::f64::consts::SQRT_2 * volume / particle_count as Float).cbrt();
        let extent = domain.bounding_extent();
        let side = extent.side_lengths();
        let dx = spacing;
        let dy = spacing * (3.0 as Float).sqrt() / 2.0;
        let dz = spacing * (6.0 as Float).sqrt() / 3.0;
        let nx = (side.x() / dx).ceil() as i64 + 2;
        let ny = (side.y() / dy).ceil() as i64 + 2;
        let nz = (side.z() / dz).ceil() as i64 + 2;
        let mut positions = vec![];
        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    let mut x = ix as Float * dx;
                    let mut y = iy as Float * dy;
                    let z = iz as Float * dz;
                    if iy % 2 == 1 {
                        x += 0.5 * dx;
                    }
                    if iz % 2 == 1 {
                        x += 0.5 * dx;
                        y += dy / 3.0;
                    }
                    let pos = Vector::new(
                        extent.min.x() + x,
                        extent.min.y() + y,
                        extent.min.z() + z,
                    );
                    if domain.contains(&pos) {
                        positions.push(pos);
                    }
                }
            }
        }
        positions
    }
}

/// Uniform random positions, rejection-sampled from the bounding box.
/// Seeded, so a body setup is reproducible.
pub struct RandomDistribution {
    seed: u64,
}

impl RandomDistribution {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Distribution for RandomDistribution {
    fn generate(&self, particle_count: usize, domain: &dyn Domain) -> Vec<Vector> {
        let extent = domain.bounding_extent();
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        let mut positions = Vec::with_capacity(particle_count);
        let mut attempts = 0usize;
        while positions.len() < particle_count && attempts < particle_count * 1000 {
            attempts += 1;
            let pos = Vector::new(
                rng.gen_range(extent.min.x()..extent.max.x()),
                rng.gen_range(extent.min.y()..extent.max.y()),
                rng.gen_range(extent.min.z()..extent.max.z()),
            );
            if domain.contains(&pos) {
                positions.push(pos);
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BlockDomain;
    use crate::geometry::Extent;
    use crate::geometry::SphericalDomain;

    #[test]
    fn hexagonal_packing_fills_a_sphere() {
        let domain = SphericalDomain::new(Vector::ZERO, 1.0);
        let positions = HexagonalPacking.generate(1000, &domain);
        // clipping keeps the count within a reasonable band
        assert!(positions.len() > 500 && positions.len() < 1500, "{}", positions.len());
        assert!(positions.iter().all(|pos| domain.contains(pos)));
    }

    #[test]
    fn hexagonal_packing_count_scales() {
        let domain = BlockDomain::new(Extent::cube_from_side_length(1.0));
        let coarse = HexagonalPacking.generate(100, &domain).len();
        let fine = HexagonalPacking.generate(800, &domain).len();
        assert!(fine > 4 * coarse);
    }

    #[test]
    fn random_distribution_is_reproducible() {
        let domain = SphericalDomain::new(Vector::ZERO, 2.0);
        let first = RandomDistribution::new(42).generate(200, &domain);
        let second = RandomDistribution::new(42).generate(200, &domain);
        assert_eq!(first.len(), 200);
        assert_eq!(first, second);
        assert!(first.iter().all(|pos| domain.contains(pos)));
    }
}
