use std::collections::HashMap;

use crate::finders::FinderBase;
use crate::finders::NeighborFinder;
use crate::finders::NeighborRecord;
use crate::geometry::Extent;
use crate::geometry::Indices;
use crate::geometry::Sphere;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::scheduler::Scheduler;

struct Cell {
    points: Vec<u32>,
    /// Tight bounding box of the points in the cell, used to prune
    /// queries that overlap the cell but not its content.
    extent: Extent,
}

/// Same cell geometry as the uniform grid, but cells live in a hash
/// map keyed by their integer coordinates, so memory scales with the
/// number of occupied cells rather than the bounding volume.
pub struct HashMapFinder {
    kernel_radius: Float,
    cell_mult: Float,
    base: FinderBase,
    cell_size: Float,
    map: HashMap<Indices, Cell>,
}

impl HashMapFinder {
    pub fn new(kernel_radius: Float) -> Self {
        Self::with_cell_mult(kernel_radius, 1.0)
    }

    pub fn with_cell_mult(kernel_radius: Float, cell_mult: Float) -> Self {
        assert!(kernel_radius > 0.0 && cell_mult > 0.0);
        Self {
            kernel_radius,
            cell_mult,
            base: FinderBase::default(),
            cell_size: 1.0,
            map: HashMap::new(),
        }
    }

    fn find_filtered(
        &self,
        pos: Vector,
        radius: Float,
        max_rank: Option<u32>,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        neighs.clear();
        if self.base.points.is_empty() {
            return 0;
        }
        let radius_sqr = radius * radius;
        let sphere = Sphere::new(pos, radius);
        let reach = (radius / self.cell_size).ceil() as i32;
        let center = Indices::from_floor(pos, self.cell_size);
        for x in -reach..=reach {
            for y in -reach..=reach {
                for z in -reach..=reach {
                    let Some(cell) = self.map.get(&(center + Indices::new(x, y, z))) else {
                        continue;
                    };
                    if !sphere.overlaps(&cell.extent) {
                        continue;
                    }
                    for &index in &cell.points {
                        let index = index as usize;
                        let dist_sqr = self.base.points[index].distance_sqr(pos);
                        if dist_sqr < radius_sqr
                            && max_rank.map_or(true, |rank| self.base.rank[index] < rank)
                        {
                            neighs.push(NeighborRecord { index, dist_sqr });
                        }
                    }
                }
            }
        }
        neighs.len()
    }
}

impl NeighborFinder for HashMapFinder {
    fn build(&mut self, _scheduler: &Scheduler, points: &[Vector]) {
        self.base.build(points);
        self.map.clear();
        if points.is_empty() {
            return;
        }
        let max_h = points.iter().map(|p| p.h()).fold(0.0, Float::max);
        assert!(max_h > 0.0, "positions must carry a positive smoothing length");
        self.cell_size = max_h * self.kernel_radius * self.cell_mult;
        for (index, point) in points.iter().enumerate() {
            let idxs = Indices::from_floor(*point, self.cell_size);
            let cell = self.map.entry(idxs).or_insert_with(|| Cell {
                points: vec![],
                extent: Extent::empty(),
            });
            cell.points.push(index as u32);
            cell.extent.extend(*point);
        }
    }

    fn find_all(&self, pos: Vector, radius: Float, neighs: &mut Vec<NeighborRecord>) -> usize {
        self.find_filtered(pos, radius, None, neighs)
    }

    fn find_all_of(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        self.find_filtered(self.base.points[index], radius, None, neighs)
    }

    fn find_lower_rank(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        self.find_filtered(
            self.base.points[index],
            radius,
            Some(self.base.rank[index]),
            neighs,
        )
    }

    fn rank_of(&self, index: usize) -> u32 {
        self.base.rank[index]
    }

    fn point(&self, index: usize) -> Vector {
        self.base.points[index]
    }

    fn point_count(&self) -> usize {
        self.base.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finders::tests::check_against_bruteforce;
    use crate::finders::tests::check_rebuild_idempotence;

    #[test]
    fn matches_bruteforce() {
        check_against_bruteforce(&mut HashMapFinder::new(2.0), 0.15);
        check_against_bruteforce(&mut HashMapFinder::new(2.0), 0.6);
    }

    #[test]
    fn rebuild_is_idempotent() {
        check_rebuild_idempotence(&mut HashMapFinder::new(2.0));
    }

    #[test]
    fn sparse_distribution_occupies_few_cells() {
        // two distant clusters must not allocate the volume in between
        let mut points = crate::finders::tests::scattered_points(50, 1);
        for point in crate::finders::tests::scattered_points(50, 2) {
            points.push(point + Vector::new(1000.0, 0.0, 0.0));
        }
        let mut finder = HashMapFinder::new(2.0);
        finder.build(&Scheduler::sequential(), &points);
        assert!(finder.map.len() < points.len() * 2);
    }
}
