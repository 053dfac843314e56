use crate::finders::NeighborFinder;
use crate::finders::NeighborRecord;
use crate::geometry::Extent;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::scheduler::Scheduler;

/// Wraps any finder with periodic boundary conditions over a block
/// domain. A query close to a domain face issues an extra query with
/// the point translated by the domain size along that axis (up to six
/// in a corner) and merges the results.
///
/// Thread-safety contract: the wrapper holds no mutable state during
/// queries; the scratch buffer for the ghost queries lives on the
/// caller's stack, so concurrent queries from different threads are
/// contention-free by construction.
pub struct PeriodicFinder<F> {
    finder: F,
    domain: Extent,
}

impl<F: NeighborFinder> PeriodicFinder<F> {
    pub fn new(finder: F, domain: Extent) -> Self {
        Self { finder, domain }
    }

    fn ghost_positions(&self, pos: Vector, radius: Float, ghosts: &mut Vec<Vector>) {
        ghosts.clear();
        let side = self.domain.side_lengths();
        for axis in 0..3 {
            if pos[axis] < self.domain.min[axis] + radius {
                ghosts.push(pos + Vector::unit(axis) * side[axis]);
            }
            if pos[axis] > self.domain.max[axis] - radius {
                ghosts.push(pos - Vector::unit(axis) * side[axis]);
            }
        }
    }

    fn find_merged(
        &self,
        pos: Vector,
        radius: Float,
        max_rank: Option<u32>,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        self.finder.find_all(pos, radius, neighs);
        if let Some(rank) = max_rank {
            neighs.retain(|n| self.finder.rank_of(n.index) < rank);
        }
        let mut ghosts = Vec::new();
        self.ghost_positions(pos, radius, &mut ghosts);
        let mut extra = Vec::new();
        for ghost in ghosts {
            self.finder.find_all(ghost, radius, &mut extra);
            for record in &extra {
                if max_rank.map_or(true, |rank| self.finder.rank_of(record.index) < rank)
                    && !neighs.iter().any(|n| n.index == record.index)
                {
                    neighs.push(*record);
                }
            }
        }
        neighs.len()
    }
}

impl<F: NeighborFinder> NeighborFinder for PeriodicFinder<F> {
    fn build(&mut self, scheduler: &Scheduler, points: &[Vector]) {
        self.finder.build(scheduler, points);
    }

    fn find_all(&self, pos: Vector, radius: Float, neighs: &mut Vec<NeighborRecord>) -> usize {
        self.find_merged(pos, radius, None, neighs)
    }

    fn find_all_of(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        self.find_merged(self.finder.point(index), radius, None, neighs)
    }

    fn find_lower_rank(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        self.find_merged(
            self.finder.point(index),
            radius,
            Some(self.finder.rank_of(index)),
            neighs,
        )
    }

    fn point(&self, index: usize) -> Vector {
        self.finder.point(index)
    }

    fn rank_of(&self, index: usize) -> u32 {
        self.finder.rank_of(index)
    }

    fn point_count(&self) -> usize {
        self.finder.point_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finders::BruteForceFinder;

    #[test]
    fn finds_neighbors_across_the_boundary() {
        let domain = Extent::cube_from_side_length(2.0);
        let points = vec![
            Vector::with_h(-0.95, 0.0, 0.0, 0.1),
            Vector::with_h(0.95, 0.0, 0.0, 0.1),
            Vector::with_h(0.0, 0.0, 0.0, 0.1),
        ];
        let mut finder = PeriodicFinder::new(BruteForceFinder::new(), domain);
        finder.build(&Scheduler::sequential(), &points);
        let mut neighs = Vec::new();
        finder.find_all_of(0, 0.3, &mut neighs);
        let indices: Vec<usize> = neighs.iter().map(|n| n.index).collect();
        assert!(indices.contains(&1), "particles touch through the boundary");
        assert!(!indices.contains(&2));
    }

    #[test]
    fn no_duplicates_for_interior_points() {
        let domain = Extent::cube_from_side_length(4.0);
        let points = crate::finders::tests::scattered_points(100, 9);
        let mut finder = PeriodicFinder::new(BruteForceFinder::new(), domain);
        finder.build(&Scheduler::sequential(), &points);
        let mut neighs = Vec::new();
        for i in 0..points.len() {
            finder.find_all_of(i, 0.5, &mut neighs);
            let mut indices: Vec<usize> = neighs.iter().map(|n| n.index).collect();
            indices.sort_unstable();
            indices.dedup();
            assert_eq!(indices.len(), neighs.len());
        }
    }

    #[test]
    fn lower_rank_respects_ghost_neighbors() {
        let domain = Extent::cube_from_side_length(2.0);
        let points = vec![
            Vector::with_h(-0.95, 0.0, 0.0, 0.2),
            Vector::with_h(0.95, 0.0, 0.0, 0.1),
        ];
        let mut finder = PeriodicFinder::new(BruteForceFinder::new(), domain);
        finder.build(&Scheduler::sequential(), &points);
        let mut neighs = Vec::new();
        // particle 0 has the larger h, so particle 1 has lower rank
        finder.find_lower_rank(0, 0.3, &mut neighs);
        assert_eq!(neighs.len(), 1);
        assert_eq!(neighs[0].index, 1);
        finder.find_lower_rank(1, 0.3, &mut neighs);
        assert!(neighs.is_empty());
    }
}
