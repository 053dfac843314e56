mod bruteforce;
mod hash_grid;
mod kdtree;
mod periodic;
mod uniform_grid;

pub use bruteforce::BruteForceFinder;
pub use hash_grid::HashMapFinder;
pub use kdtree::KdTree;
pub use periodic::PeriodicFinder;
pub use uniform_grid::UniformGridFinder;

use crate::geometry::Vector;
use crate::prelude::Float;
use crate::scheduler::Scheduler;

/// A neighbor found by a radius query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborRecord {
    pub index: usize,
    pub dist_sqr: Float,
}

/// Spatial acceleration structure for radius queries over the particle
/// positions. Rebuilt from scratch every step.
///
/// The *rank* of a particle is its position in the ordering by
/// smoothing length (ascending, ties broken by index). Symmetrized
/// summations query only neighbors of lower rank to visit every pair
/// exactly once.
///
/// Implementations must be deterministic: identical inputs produce
/// results indistinguishable through this interface, independent of
/// the thread count used for `build`.
pub trait NeighborFinder: Send + Sync {
    /// Builds the acceleration structure for the given positions.
    fn build(&mut self, scheduler: &Scheduler, points: &[Vector]);

    /// All neighbors within `radius` of an arbitrary point. Returns the
    /// number of neighbors found; `neighs` is cleared first.
    fn find_all(&self, pos: Vector, radius: Float, neighs: &mut Vec<NeighborRecord>) -> usize;

    /// All neighbors within `radius` of a particle, including itself.
    fn find_all_of(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize;

    /// Neighbors of a particle with lower rank, for symmetrized
    /// summations.
    fn find_lower_rank(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize;

    fn rank_of(&self, index: usize) -> u32;

    /// Stored position of a particle, as passed to `build`.
    fn point(&self, index: usize) -> Vector;

    fn point_count(&self) -> usize;
}

/// Position copy plus the smoothing-length rank, shared by all finder
/// implementations.
#[derive(Default)]
pub(crate) struct FinderBase {
    pub points: Vec<Vector>,
    pub rank: Vec<u32>,
}

impl FinderBase {
    pub fn build(&mut self, points: &[Vector]) {
        self.points.clear();
        self.points.extend_from_slice(points);
        let mut order: Vec<u32> = (0..points.len() as u32).collect();
        order.sort_unstable_by(|&a, &b| {
            let h_a = points[a as usize].h();
            let h_b = points[b as usize].h();
            h_a.partial_cmp(&h_b).unwrap().then(a.cmp(&b))
        });
        self.rank.resize(points.len(), 0);
        for (position, &index) in order.iter().enumerate() {
            self.rank[index as usize] = position as u32;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use rand::Rng;
    use rand::SeedableRng;

    use super::*;
    use crate::scheduler::Scheduler;

    pub fn scattered_points(count: usize, seed: u64) -> Vec<Vector> {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                Vector::with_h(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(0.05..0.1),
                )
            })
            .collect()
    }

    fn direct_neighbors(points: &[Vector], pos: Vector, radius: Float) -> HashSet<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.distance_sqr(pos) < radius * radius)
            .map(|(i, _)| i)
            .collect()
    }

    /// Checks any finder against the brute-force reference.
    pub fn check_against_bruteforce(finder: &mut dyn NeighborFinder, radius: Float) {
        let points = scattered_points(200, 42);
        let scheduler = Scheduler::sequential();
        finder.build(&scheduler, &points);
        let mut neighs = Vec::new();
        for (i, point) in points.iter().enumerate() {
            finder.find_all_of(i, radius, &mut neighs);
            let found: HashSet<usize> = neighs.iter().map(|n| n.index).collect();
            assert_eq!(found, direct_neighbors(&points, *point, radius), "particle {}", i);

            // lower-rank queries return exactly the lower-rank subset
            finder.find_lower_rank(i, radius, &mut neighs);
            let lower: HashSet<usize> = neighs.iter().map(|n| n.index).collect();
            let expected: HashSet<usize> = direct_neighbors(&points, *point, radius)
                .into_iter()
                .filter(|&j| finder.rank_of(j) < finder.rank_of(i))
                .collect();
            assert_eq!(lower, expected);
        }
    }

    /// Building twice with identical inputs must give identical query
    /// results.
    pub fn check_rebuild_idempotence(finder: &mut dyn NeighborFinder) {
        let points = scattered_points(100, 7);
        let scheduler = Scheduler::sequential();
        finder.build(&scheduler, &points);
        let mut first = Vec::new();
        finder.find_all_of(17, 0.4, &mut first);
        finder.build(&scheduler, &points);
        let mut second = Vec::new();
        finder.find_all_of(17, 0.4, &mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn ranks_are_a_permutation() {
        let points = scattered_points(50, 3);
        let mut base = FinderBase::default();
        base.build(&points);
        let mut seen: Vec<u32> = base.rank.clone();
        seen.sort_unstable();
        assert!(seen.into_iter().eq(0..50));
    }
}
