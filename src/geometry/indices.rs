use std::ops::Add;
use std::ops::Sub;

use glam::IVec3;

use crate::geometry::Vector;
use crate::prelude::Float;

/// Integer cell coordinates used by the grid-based neighbor finders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Indices(pub(crate) IVec3);

impl Indices {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self(IVec3::new(x, y, z))
    }

    /// Cell coordinates of a point for a given cell size.
    pub fn from_floor(point: Vector, cell_size: Float) -> Self {
        debug_assert!(cell_size > 0.0);
        Self(IVec3::new(
            (point.x() / cell_size).floor() as i32,
            (point.y() / cell_size).floor() as i32,
            (point.z() / cell_size).floor() as i32,
        ))
    }

    pub fn x(&self) -> i32 {
        self.0.x
    }

    pub fn y(&self) -> i32 {
        self.0.y
    }

    pub fn z(&self) -> i32 {
        self.0.z
    }
}

impl Add for Indices {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Indices {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_handles_negative_coordinates() {
        let idxs = Indices::from_floor(Vector::new(-0.5, 1.5, 0.0), 1.0);
        assert_eq!(idxs, Indices::new(-1, 1, 0));
    }
}
