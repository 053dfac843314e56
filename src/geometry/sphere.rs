use std::f64::consts::PI;

use serde::Deserialize;
use serde::Serialize;

use crate::geometry::Extent;
use crate::geometry::Vector;
use crate::prelude::Float;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vector,
    pub radius: Float,
}

impl Sphere {
    pub fn new(center: Vector, radius: Float) -> Self {
        debug_assert!(radius >= 0.0);
        Self { center, radius }
    }

    pub fn volume(&self) -> Float {
        4.0 / 3.0 * PI * self.radius.powi(3)
    }

    pub fn contains(&self, pos: &Vector) -> bool {
        self.center.distance_sqr(*pos) <= self.radius * self.radius
    }

    pub fn bounding_extent(&self) -> Extent {
        Extent::new(
            self.center - Vector::splat(self.radius),
            self.center + Vector::splat(self.radius),
        )
    }

    /// Whether the sphere and the extent share at least one point.
    pub fn overlaps(&self, extent: &Extent) -> bool {
        let closest = Vector::new(
            self.center.x().clamp(extent.min.x(), extent.max.x()),
            self.center.y().clamp(extent.min.y(), extent.max.y()),
            self.center.z().clamp(extent.min.z(), extent.max.z()),
        );
        self.contains(&closest)
    }

    pub fn intersects(&self, other: &Sphere) -> bool {
        let max_dist = self.radius + other.radius;
        self.center.distance_sqr(other.center) <= max_dist * max_dist
    }

    /// Pushes a point onto the surface of the sphere.
    pub fn project(&self, pos: Vector) -> Vector {
        let dir = pos - self.center;
        if dir.length_sqr() == 0.0 {
            return self.center + Vector::new(self.radius, 0.0, 0.0);
        }
        let mut projected = self.center + dir.normalized() * self.radius;
        projected.set_h(pos.h());
        projected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_float_is_close;

    #[test]
    fn sphere_extent_overlap() {
        let sphere = Sphere::new(Vector::new(2.0, 0.0, 0.0), 1.1);
        let extent = Extent::cube_from_side_length(2.0);
        assert!(sphere.overlaps(&extent));
        let far = Sphere::new(Vector::new(5.0, 0.0, 0.0), 1.0);
        assert!(!far.overlaps(&extent));
    }

    #[test]
    fn projection_lands_on_surface() {
        let sphere = Sphere::new(Vector::ZERO, 2.0);
        let projected = sphere.project(Vector::new(0.5, 0.5, 0.0));
        assert_float_is_close(projected.length(), 2.0);
    }
}
