use serde::Deserialize;
use serde::Serialize;

use crate::geometry::Vector;
use crate::prelude::Float;

pub const NUM_OCTANTS: usize = 8;

/// Axis-aligned box given by its minimum and maximum corner. The
/// smoothing length lane of the corners is ignored by all geometric
/// predicates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: Vector,
    pub max: Vector,
}

impl Extent {
    pub fn new(min: Vector, max: Vector) -> Self {
        debug_assert!(min.x() <= max.x() && min.y() <= max.y() && min.z() <= max.z());
        Self { min, max }
    }

    pub fn cube_from_side_length(side_length: Float) -> Self {
        let half = 0.5 * side_length;
        Self {
            min: Vector::new(-half, -half, -half),
            max: Vector::new(half, half, half),
        }
    }

    /// An empty extent that any `extend` call will snap to its argument.
    pub fn empty() -> Self {
        Self {
            min: Vector::splat(Float::INFINITY),
            max: Vector::splat(Float::NEG_INFINITY),
        }
    }

    pub fn from_positions<'a>(positions: impl Iterator<Item = &'a Vector>) -> Option<Self> {
        let mut iter = positions;
        let first = *iter.next()?;
        let mut extent = Self {
            min: first,
            max: first,
        };
        for pos in iter {
            extent.extend(*pos);
        }
        Some(extent)
    }

    pub fn center(&self) -> Vector {
        (self.min + self.max) * 0.5
    }

    pub fn side_lengths(&self) -> Vector {
        self.max - self.min
    }

    pub fn max_side_length(&self) -> Float {
        self.side_lengths().max_element()
    }

    pub fn volume(&self) -> Float {
        let side = self.side_lengths();
        if side.min_element() <= 0.0 {
            return 0.0;
        }
        side.volume()
    }

    pub fn is_empty(&self) -> bool {
        self.min.x() > self.max.x()
    }

    pub fn contains(&self, pos: &Vector) -> bool {
        self.min.x() <= pos.x()
            && pos.x() <= self.max.x()
            && self.min.y() <= pos.y()
            && pos.y() <= self.max.y()
            && self.min.z() <= pos.z()
            && pos.z() <= self.max.z()
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x() <= other.max.x()
            && other.min.x() <= self.max.x()
            && self.min.y() <= other.max.y()
            && other.min.y() <= self.max.y()
            && self.min.z() <= other.max.z()
            && other.min.z() <= self.max.z()
    }

    pub fn extend(&mut self, pos: Vector) {
        let mut min = self.min.min(pos);
        let mut max = self.max.max(pos);
        // keep the h lane out of the corner bookkeeping
        min.set_h(0.0);
        max.set_h(0.0);
        self.min = min;
        self.max = max;
    }

    pub fn extend_extent(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        self.extend(other.min);
        self.extend(other.max);
    }

    /// Grows the extent by the given margin on all sides.
    pub fn pad(&self, margin: Float) -> Self {
        Self {
            min: self.min - Vector::splat(margin),
            max: self.max + Vector::splat(margin),
        }
    }

    /// Pushes a point to the closest point on the boundary.
    pub fn project(&self, pos: Vector) -> Vector {
        let clamped = pos.max(self.min).min(self.max);
        let mut inside_dist = Float::INFINITY;
        let mut axis = 0;
        let mut to_max = false;
        for i in 0..3 {
            let lower = clamped[i] - self.min[i];
            let upper = self.max[i] - clamped[i];
            if lower < inside_dist {
                inside_dist = lower;
                axis = i;
                to_max = false;
            }
            if upper < inside_dist {
                inside_dist = upper;
                axis = i;
                to_max = true;
            }
        }
        let mut projected = clamped;
        projected[axis] = if to_max { self.max[axis] } else { self.min[axis] };
        projected.set_h(pos.h());
        projected
    }

    pub fn octants(&self) -> [Extent; NUM_OCTANTS] {
        let center = self.center();
        let mut octants = std::array::from_fn(|_| self.clone());
        for (index, octant) in octants.iter_mut().enumerate() {
            for axis in 0..3 {
                if index & (1 << axis) == 0 {
                    octant.max[axis] = center[axis];
                } else {
                    octant.min[axis] = center[axis];
                }
            }
        }
        octants
    }

    pub fn octant_index(&self, pos: &Vector) -> usize {
        let center = self.center();
        let mut index = 0;
        for axis in 0..3 {
            if pos[axis] >= center[axis] {
                index |= 1 << axis;
            }
        }
        index
    }
}
