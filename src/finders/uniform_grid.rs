use crate::finders::FinderBase;
use crate::finders::NeighborFinder;
use crate::finders::NeighborRecord;
use crate::geometry::Extent;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::scheduler::Scheduler;

/// Dense uniform grid. The cell size is the largest kernel support
/// among the particles, so a query with radius up to the cell size
/// only touches the 27-cell neighborhood. Memory grows with the volume
/// of the bounding box, so sparse distributions should use
/// `HashMapFinder` instead.
pub struct UniformGridFinder {
    /// Kernel support in units of `h`, determines the cell size.
    kernel_radius: Float,
    base: FinderBase,
    extent: Extent,
    cell_size: Float,
    dims: [usize; 3],
    cells: Vec<Vec<u32>>,
}

impl UniformGridFinder {
    pub fn new(kernel_radius: Float) -> Self {
        assert!(kernel_radius > 0.0);
        Self {
            kernel_radius,
            base: FinderBase::default(),
            extent: Extent::cube_from_side_length(1.0),
            cell_size: 1.0,
            dims: [1, 1, 1],
            cells: vec![],
        }
    }

    fn cell_coord(&self, pos: Vector) -> [usize; 3] {
        let mut coord = [0; 3];
        for axis in 0..3 {
            let relative = (pos[axis] - self.extent.min[axis]) / self.cell_size;
            coord[axis] = (relative.floor() as isize).clamp(0, self.dims[axis] as isize - 1)
                as usize;
        }
        coord
    }

    fn cell_index(&self, coord: [usize; 3]) -> usize {
        (coord[2] * self.dims[1] + coord[1]) * self.dims[0] + coord[0]
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
        let lower = self.cell_coord(pos - Vector::splat(radius));
        let upper = self.cell_coord(pos + Vector::splat(radius));
        for z in lower[2]..=upper[2] {
            for y in lower[1]..=upper[1] {
                for x in lower[0]..=upper[0] {
                    let cell = &self.cells[self.cell_index([x, y, z])];
                    for &index in cell {
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

impl NeighborFinder for UniformGridFinder {
    fn build(&mut self, _scheduler: &Scheduler, points: &[Vector]) {
        self.base.build(points);
        self.cells.clear();
        if points.is_empty() {
            return;
        }
        let max_h = points.iter().map(|p| p.h()).fold(0.0, Float::max);
        assert!(max_h > 0.0, "positions must carry a positive smoothing length");
        self.cell_size = max_h * self.kernel_radius;
        self.extent = Extent::from_positions(points.iter()).unwrap();
        let side = self.extent.side_lengths();
        for axis in 0..3 {
            self.dims[axis] = ((side[axis] / self.cell_size).floor() as usize + 1).max(1);
        }
        self.cells = vec![vec![]; self.dims[0] * self.dims[1] * self.dims[2]];
        for (index, point) in points.iter().enumerate() {
            let coord = self.cell_coord(*point);
            let cell_idx = self.cell_index(coord);
            self.cells[cell_idx].push(index as u32);
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
        check_against_bruteforce(&mut UniformGridFinder::new(2.0), 0.15);
        // radius larger than the cell size exercises the multi-cell scan
        check_against_bruteforce(&mut UniformGridFinder::new(2.0), 0.7);
    }

    #[test]
    fn rebuild_is_idempotent() {
        check_rebuild_idempotence(&mut UniformGridFinder::new(2.0));
    }
}
