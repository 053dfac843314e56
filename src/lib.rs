// Some of the equation-term eval methods have a large number of
// arguments. That is not necessarily a bad thing, as the hot loop
// hands them precomputed neighbor batches.
#![allow(clippy::too_many_arguments)]

//! # Rubble
//! Rubble is an SPH and N-body simulation core for astrophysical
//! impact modeling: asteroid collisions, fragmentation, gravitational
//! reaccumulation and cratering.
//!
//! The library evolves a population of particles under the coupled
//! conservation equations with an elastoplastic rheology, brittle
//! fracture and self-gravity. The pieces compose the way the physics
//! does: a [`storage::Storage`] holds the named, typed quantity
//! buffers of all particles together with their materials; equation
//! terms ([`equations`]) contribute pairwise derivatives which a
//! [`solvers::SymmetricSolver`] evaluates over neighbor lists from one
//! of the [`finders`]; [`timestepping`] advances the quantities with
//! adaptive step control; [`gravity`] adds the long-range forces
//! through a Barnes-Hut tree.
//!
//! ## A basic example
//! ```no_run
//! use rubble::prelude::*;
//!
//! fn main() -> Result<(), Error> {
//!     let scheduler = Scheduler::pool(None)?;
//!     let equations = make_term(PressureForce)
//!         + make_term(ContinuityEquation)
//!         + make_term(StandardAV::default())
//!         + make_term(AdaptiveSmoothingLength::new(1.0e-3));
//!     let mut solver =
//!         SymmetricSolver::new(CubicSpline, Box::<KdTree>::default(), equations);
//!
//!     let mut storage = Storage::new();
//!     let mut params = Settings::new();
//!     params.set("density", Value::Float(2700.0));
//!     let ics = InitialConditions::new(&solver);
//!     ics.add_body(
//!         &mut storage,
//!         &SphericalDomain::new(Vector::ZERO, 1.0e5),
//!         Box::new(EosMaterial::from_params(params)?),
//!         10_000,
//!     )?;
//!
//!     let mut stepping = TimeStepping::new(Box::<PredictorCorrector>::default(), 0.1)
//!         .with_criterion(Box::new(MultiCriterion::standard(0.2)));
//!     let mut stats = Statistics::new();
//!     let mut t = 0.0;
//!     while t < 10.0 {
//!         t += stepping.step(&scheduler, &mut solver, &mut storage, t, &mut stats)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod equations;
mod error;
pub mod finders;
pub mod geometry;
pub mod gravity;
pub mod ics;
pub mod io;
pub mod kernel;
pub mod logging;
pub mod materials;
pub mod scheduler;
pub mod settings;
pub mod solvers;
pub mod statistics;
pub mod storage;
pub mod timestepping;

#[cfg(test)]
pub(crate) mod test_utils;

/// `use rubble::prelude::*` to import the commonly used types for
/// setting up and running a simulation.
pub mod prelude;

pub use error::Error;
