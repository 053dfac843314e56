use crate::geometry::Extent;
use crate::geometry::Sphere;
use crate::geometry::Vector;
use crate::prelude::Float;

/// Computational domain of a body or of the whole simulation. Used to
/// generate initial particle positions and to clamp escaping particles
/// back to the boundary.
pub trait Domain: Send + Sync {
    fn center(&self) -> Vector;

    fn volume(&self) -> Float;

    fn bounding_extent(&self) -> Extent;

    fn contains(&self, pos: &Vector) -> bool;

    /// Pushes a point to the nearest point on the domain boundary.
    fn project(&self, pos: Vector) -> Vector;
}

pub struct BlockDomain {
    extent: Extent,
}

impl BlockDomain {
    pub fn new(extent: Extent) -> Self {
        Self { extent }
    }
}

impl Domain for BlockDomain {
    fn center(&self) -> Vector {
        self.extent.center()
    }

    fn volume(&self) -> Float {
        self.extent.volume()
    }

    fn bounding_extent(&self) -> Extent {
        self.extent.clone()
    }

    fn contains(&self, pos: &Vector) -> bool {
        self.extent.contains(pos)
    }

    fn project(&self, pos: Vector) -> Vector {
        self.extent.project(pos)
    }
}

pub struct SphericalDomain {
    sphere: Sphere,
}

impl SphericalDomain {
    pub fn new(center: Vector, radius: Float) -> Self {
        Self {
            sphere: Sphere::new(center, radius),
        }
    }
}

impl Domain for SphericalDomain {
    fn center(&self) -> Vector {
        self.sphere.center
    }

    fn volume(&self) -> Float {
        self.sphere.volume()
    }

    fn bounding_extent(&self) -> Extent {
        self.sphere.bounding_extent()
    }

    fn contains(&self, pos: &Vector) -> bool {
        self.sphere.contains(pos)
    }

    fn project(&self, pos: Vector) -> Vector {
        self.sphere.project(pos)
    }
}

/// Cylinder aligned with the z axis.
pub struct CylindricalDomain {
    center: Vector,
    radius: Float,
    height: Float,
}

impl CylindricalDomain {
    pub fn new(center: Vector, radius: Float, height: Float) -> Self {
        debug_assert!(radius > 0.0 && height > 0.0);
        Self {
            center,
            radius,
            height,
        }
    }
}

impl Domain for CylindricalDomain {
    fn center(&self) -> Vector {
        self.center
    }

    fn volume(&self) -> Float {
        std::f64::consts::PI * self.radius * self.radius * self.height
    }

    fn bounding_extent(&self) -> Extent {
        Extent::new(
            self.center - Vector::new(self.radius, self.radius, 0.5 * self.height),
            self.center + Vector::new(self.radius, self.radius, 0.5 * self.height),
        )
    }

    fn contains(&self, pos: &Vector) -> bool {
        let rel = *pos - self.center;
        rel.x() * rel.x() + rel.y() * rel.y() <= self.radius * self.radius
            && rel.z().abs() <= 0.5 * self.height
    }

    fn project(&self, pos: Vector) -> Vector {
        let rel = pos - self.center;
        let radial = Vector::new(rel.x(), rel.y(), 0.0);
        let radial_dist = radial.length();
        let to_mantle = (self.radius - radial_dist).abs();
        let to_base = (0.5 * self.height - rel.z().abs()).abs();
        let mut projected = rel;
        if to_mantle < to_base && radial_dist > 0.0 {
            let scaled = radial * (self.radius / radial_dist);
            projected = Vector::new(scaled.x(), scaled.y(), rel.z());
        } else {
            projected[2] = 0.5 * self.height * rel.z().signum();
        }
        let mut result = self.center + projected;
        result.set_h(pos.h());
        result
    }
}
