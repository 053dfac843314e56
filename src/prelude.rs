pub use crate::equations::make_term;
pub use crate::equations::AdaptiveSmoothingLength;
pub use crate::equations::ContinuityEquation;
pub use crate::equations::EquationHolder;
pub use crate::equations::GradyKippFracture;
pub use crate::equations::PressureForce;
pub use crate::equations::SolidStressForce;
pub use crate::equations::av::MorrisMonaghanAV;
pub use crate::equations::av::RiemannAV;
pub use crate::equations::av::StandardAV;
pub use crate::error::Error;
pub use crate::finders::BruteForceFinder;
pub use crate::finders::HashMapFinder;
pub use crate::finders::KdTree;
pub use crate::finders::NeighborFinder;
pub use crate::finders::PeriodicFinder;
pub use crate::finders::UniformGridFinder;
pub use crate::geometry::BlockDomain;
pub use crate::geometry::Domain;
pub use crate::geometry::Extent;
pub use crate::geometry::Interval;
pub use crate::geometry::SphericalDomain;
pub use crate::geometry::Vector;
pub use crate::gravity::BarnesHut;
pub use crate::gravity::BruteForceGravity;
pub use crate::gravity::MultipoleOrder;
pub use crate::gravity::SelfGravity;
pub use crate::ics::InitialConditions;
pub use crate::kernel::CubicSpline;
pub use crate::kernel::Gaussian;
pub use crate::kernel::GravityLutKernel;
pub use crate::kernel::WendlandC2;
pub use crate::materials::EosMaterial;
pub use crate::materials::NullMaterial;
pub use crate::materials::SolidMaterial;
pub use crate::scheduler::Scheduler;
pub use crate::settings::Settings;
pub use crate::settings::Value;
pub use crate::solvers::Solver;
pub use crate::solvers::SymmetricSolver;
pub use crate::statistics::Statistics;
pub use crate::storage::OrderEnum;
pub use crate::storage::QuantityId;
pub use crate::storage::Storage;
pub use crate::timestepping::EulerExplicit;
pub use crate::timestepping::LeapFrog;
pub use crate::timestepping::ModifiedMidpoint;
pub use crate::timestepping::MultiCriterion;
pub use crate::timestepping::PredictorCorrector;
pub use crate::timestepping::RungeKutta4;
pub use crate::timestepping::TimeStepping;

/// The floating point type of the simulation.
pub type Float = f64;
