mod domain;
mod extent;
mod indices;
mod interval;
mod sphere;
mod tensor;
mod vector;

pub use domain::BlockDomain;
pub use domain::CylindricalDomain;
pub use domain::Domain;
pub use domain::SphericalDomain;
pub use extent::Extent;
pub use extent::NUM_OCTANTS;
pub use indices::Indices;
pub use interval::Interval;
pub use sphere::Sphere;
pub use tensor::SymTensor;
pub use tensor::Tensor;
pub use tensor::TracelessTensor;
pub use vector::Vector;
pub use vector::H;
