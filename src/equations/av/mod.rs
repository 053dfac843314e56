mod morris_monaghan;
mod riemann;
mod standard;

use std::any::Any;

pub use morris_monaghan::MorrisMonaghanAV;
pub use riemann::RiemannAV;
pub use standard::StandardAV;

use crate::equations::derivative::Accumulated;
use crate::equations::derivative::BufferKind;
use crate::equations::derivative::Derivative;
use crate::equations::derivative::Phase;
use crate::finders::NeighborRecord;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

const BALSARA_EPS: Float = 1.0e-4;

/// Quantity views shared by all viscosity variants, read once per
/// particle call rather than once per pair.
pub struct AvInput<'a> {
    pub r: &'a [Vector],
    pub v: &'a [Vector],
    pub rho: &'a [Float],
    pub cs: &'a [Float],
    pub alpha: Option<&'a [Float]>,
    divv: Option<&'a [Float]>,
    rotv: Option<&'a [Vector]>,
}

impl<'a> AvInput<'a> {
    fn new(input: &'a Storage, needs_alpha: bool, needs_balsara: bool) -> Self {
        Self {
            r: input.values::<Vector>(QuantityId::Position),
            v: input.dt::<Vector>(QuantityId::Position),
            rho: input.values::<Float>(QuantityId::Density),
            cs: input.values::<Float>(QuantityId::SoundSpeed),
            alpha: needs_alpha.then(|| input.values::<Float>(QuantityId::AvAlpha)),
            divv: needs_balsara.then(|| input.values::<Float>(QuantityId::VelocityDivergence)),
            rotv: needs_balsara.then(|| input.values::<Vector>(QuantityId::VelocityRotation)),
        }
    }

    /// Balsara (1995) shear suppression factor of one particle.
    fn balsara_factor(&self, i: usize) -> Float {
        let divv = self.divv.expect("balsara needs the velocity divergence")[i].abs();
        let rotv = self.rotv.expect("balsara needs the velocity rotation")[i].length();
        divv / (divv + rotv + BALSARA_EPS * self.cs[i] / self.r[i].h())
    }
}

/// The pairwise dissipation term `Π_ij` of one viscosity variant.
pub trait PairwiseAv: Send + Sync + PartialEq + 'static {
    /// Whether the variant reads the per-particle `α` coefficient.
    const NEEDS_ALPHA: bool = false;

    fn pi(&self, input: &AvInput, i: usize, j: usize) -> Float;
}

/// Acceleration and heating from a pairwise artificial viscosity,
/// optionally suppressed in shear flows by the Balsara switch.
pub struct AvForce<P> {
    pair: P,
    balsara: bool,
}

impl<P: PairwiseAv> AvForce<P> {
    pub fn new(pair: P, balsara: bool) -> Self {
        Self { pair, balsara }
    }
}

impl<P: PairwiseAv> Derivative for AvForce<P> {
    fn create(&self, results: &mut Accumulated) {
        results.insert::<Vector>(
            QuantityId::Position,
            OrderEnum::Second,
            BufferKind::Shared,
            Phase::Evaluate,
        );
        results.insert::<Float>(
            QuantityId::Energy,
            OrderEnum::First,
            BufferKind::Shared,
            Phase::Evaluate,
        );
    }

    fn eval(
        &self,
        input: &Storage,
        results: &mut Accumulated,
        i: usize,
        neighs: &[NeighborRecord],
        grads: &[Float],
    ) {
        let av = AvInput::new(input, P::NEEDS_ALPHA, self.balsara);
        let m = input.values::<Float>(QuantityId::Mass);
        let (dv, du) = results.two_mut::<Vector, Float>(QuantityId::Position, QuantityId::Energy);

        for (neigh, &grad) in neighs.iter().zip(grads) {
            let j = neigh.index;
            let mut pi = self.pair.pi(&av, i, j);
            if pi == 0.0 {
                continue;
            }
            if self.balsara {
                pi *= 0.5 * (av.balsara_factor(i) + av.balsara_factor(j));
            }
            let grad_ij = (av.r[i] - av.r[j]) * grad;
            dv[i] -= grad_ij * (pi * m[j]);
            dv[j] += grad_ij * (pi * m[i]);
            let heating = 0.5 * pi * (av.v[i] - av.v[j]).dot(grad_ij);
            du[i] += m[j] * heating;
            du[j] += m[i] * heating;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Derivative) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| {
                self.pair == other.pair && self.balsara == other.balsara
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::derivative::PHASES;
    use crate::test_utils::gas_lattice_storage;
    use crate::test_utils::run_single_derivative;

    pub(super) fn colliding_lattice() -> Storage {
        let mut storage = gas_lattice_storage(4, 1.0);
        storage.values_mut::<Float>(QuantityId::SoundSpeed).fill(1.0);
        // two halves approaching each other along x
        let r = storage.values::<Vector>(QuantityId::Position).to_vec();
        for (v, pos) in storage
            .dt_mut::<Vector>(QuantityId::Position)
            .iter_mut()
            .zip(&r)
        {
            *v = Vector::new(if pos.x() > 0.0 { -1.0 } else { 1.0 }, 0.0, 0.0);
        }
        storage
    }

    #[test]
    fn approaching_particles_are_decelerated_and_heated() {
        let mut storage = colliding_lattice();
        run_single_derivative(
            &mut storage,
            Box::new(AvForce::new(StandardAV::default().pair(), false)),
            PHASES[1],
        );
        let r = storage.values::<Vector>(QuantityId::Position).to_vec();
        let dv = storage.d2t::<Vector>(QuantityId::Position);
        let du = storage.dt::<Float>(QuantityId::Energy);
        // particles just left of the interface are pushed back
        let mut checked = 0;
        for (i, pos) in r.iter().enumerate() {
            if pos.x() == -1.0 {
                assert!(dv[i].x() < 0.0, "particle {} not decelerated", i);
                assert!(du[i] > 0.0, "particle {} not heated", i);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn receding_particles_feel_nothing() {
        let mut storage = colliding_lattice();
        // flip the velocities: expansion instead of collision
        for v in storage.dt_mut::<Vector>(QuantityId::Position) {
            *v = *v * -1.0;
        }
        run_single_derivative(
            &mut storage,
            Box::new(AvForce::new(StandardAV::default().pair(), false)),
            PHASES[1],
        );
        for dv in storage.d2t::<Vector>(QuantityId::Position) {
            assert_eq!(*dv, Vector::ZERO);
        }
    }
}
