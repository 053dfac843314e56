use std::any::Any;

use crate::error::Error;
use crate::finders::NeighborRecord;
use crate::geometry::SymTensor;
use crate::geometry::Tensor;
use crate::geometry::TracelessTensor;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::storage::OrderEnum;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Evaluation phase of a derivative. Quantities accumulated in an
/// earlier phase are flushed to the storage before the next phase
/// starts, so later phases can read them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Auxiliary quantities the forces need: velocity divergence and
    /// gradient, summed densities.
    Precompute,
    /// Forces and rate terms.
    Evaluate,
    /// Terms reading the freshly computed fields, e.g. damage growth.
    Postcompute,
}

pub const PHASES: [Phase; 3] = [Phase::Precompute, Phase::Evaluate, Phase::Postcompute];

/// Whether an output buffer may be shared by several derivatives
/// (additive contributions) or written by exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Unique,
    Shared,
}

#[doc(hidden)]
#[derive(Clone, Debug)]
pub enum AccBuffer {
    Scalar(Vec<Float>),
    Vector(Vec<Vector>),
    Tensor(Vec<Tensor>),
    SymTensor(Vec<SymTensor>),
    TracelessTensor(Vec<TracelessTensor>),
}

/// Value accumulable by derivatives.
pub trait AccumulatedValue: Copy + Default + Send + Sync + 'static {
    fn make_buffer(count: usize) -> AccBuffer;
    fn slice_mut(buffer: &mut AccBuffer) -> Option<&mut Vec<Self>>;
}

macro_rules! impl_accumulated_value {
    ($type:ty, $variant:ident) => {
        impl AccumulatedValue for $type {
            fn make_buffer(count: usize) -> AccBuffer {
                AccBuffer::$variant(vec![<$type>::default(); count])
            }

            fn slice_mut(buffer: &mut AccBuffer) -> Option<&mut Vec<Self>> {
                match buffer {
                    AccBuffer::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

impl_accumulated_value!(Float, Scalar);
impl_accumulated_value!(Vector, Vector);
impl_accumulated_value!(Tensor, Tensor);
impl_accumulated_value!(SymTensor, SymTensor);
impl_accumulated_value!(TracelessTensor, TracelessTensor);

#[derive(Clone, Debug)]
struct Element {
    id: QuantityId,
    order: OrderEnum,
    kind: BufferKind,
    phase: Phase,
    buffer: AccBuffer,
}

/// Output buffers of the derivative pipeline. Each worker thread owns
/// a clone; after a phase barrier the thread-local buffers are summed
/// into the storage in thread-index order, which makes the merge
/// deterministic for a given thread count.
#[derive(Clone, Default, Debug)]
pub struct Accumulated {
    elements: Vec<Element>,
}

impl Accumulated {
    /// Declares an output buffer. Requesting an already-declared buffer
    /// is allowed when both declarations are `Shared`; the derivatives
    /// then contribute additively to the same allocation.
    pub fn insert<T: AccumulatedValue>(
        &mut self,
        id: QuantityId,
        order: OrderEnum,
        kind: BufferKind,
        phase: Phase,
    ) {
        if let Some(element) = self.elements.iter().find(|e| e.id == id) {
            assert!(
                element.kind == BufferKind::Shared && kind == BufferKind::Shared,
                "quantity {:?} already has a unique writer",
                id
            );
            assert_eq!(element.order, order, "conflicting orders for {:?}", id);
            return;
        }
        self.elements.push(Element {
            id,
            order,
            kind,
            phase,
            buffer: T::make_buffer(0),
        });
    }

    /// Grows all buffers to the particle count and resets them to the
    /// additive identity.
    pub fn initialize(&mut self, count: usize) {
        for element in &mut self.elements {
            match &mut element.buffer {
                AccBuffer::Scalar(values) => {
                    values.clear();
                    values.resize(count, 0.0);
                }
                AccBuffer::Vector(values) => {
                    values.clear();
                    values.resize(count, Vector::ZERO);
                }
                AccBuffer::Tensor(values) => {
                    values.clear();
                    values.resize(count, Tensor::ZERO);
                }
                AccBuffer::SymTensor(values) => {
                    values.clear();
                    values.resize(count, SymTensor::ZERO);
                }
                AccBuffer::TracelessTensor(values) => {
                    values.clear();
                    values.resize(count, TracelessTensor::ZERO);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn position_of(&self, id: QuantityId) -> usize {
        self.elements
            .iter()
            .position(|e| e.id == id)
            .unwrap_or_else(|| panic!("accumulated buffer {:?} was never declared", id))
    }

    pub fn values_mut<T: AccumulatedValue>(&mut self, id: QuantityId) -> &mut [T] {
        let position = self.position_of(id);
        T::slice_mut(&mut self.elements[position].buffer)
            .unwrap_or_else(|| panic!("accumulated buffer {:?} has a different type", id))
    }

    /// Two distinct buffers at once, for derivatives writing several
    /// outputs from one pair loop.
    pub fn two_mut<A: AccumulatedValue, B: AccumulatedValue>(
        &mut self,
        first: QuantityId,
        second: QuantityId,
    ) -> (&mut [A], &mut [B]) {
        let first_pos = self.position_of(first);
        let second_pos = self.position_of(second);
        assert_ne!(first_pos, second_pos, "aliasing accumulated buffers");
        // distinct indices into the element vector, hence disjoint
        let elements = self.elements.as_mut_slice();
        unsafe {
            let first_ptr = &mut *(elements.as_mut_ptr().add(first_pos));
            let second_ptr = &mut *(elements.as_mut_ptr().add(second_pos));
            (
                A::slice_mut(&mut first_ptr.buffer)
                    .unwrap_or_else(|| panic!("buffer {:?} has a different type", first)),
                B::slice_mut(&mut second_ptr.buffer)
                    .unwrap_or_else(|| panic!("buffer {:?} has a different type", second)),
            )
        }
    }

    pub fn three_mut<A: AccumulatedValue, B: AccumulatedValue, C: AccumulatedValue>(
        &mut self,
        first: QuantityId,
        second: QuantityId,
        third: QuantityId,
    ) -> (&mut [A], &mut [B], &mut [C]) {
        let first_pos = self.position_of(first);
        let second_pos = self.position_of(second);
        let third_pos = self.position_of(third);
        assert!(
            first_pos != second_pos && first_pos != third_pos && second_pos != third_pos,
            "aliasing accumulated buffers"
        );
        let elements = self.elements.as_mut_slice();
        unsafe {
            let first_ptr = &mut *(elements.as_mut_ptr().add(first_pos));
            let second_ptr = &mut *(elements.as_mut_ptr().add(second_pos));
            let third_ptr = &mut *(elements.as_mut_ptr().add(third_pos));
            (
                A::slice_mut(&mut first_ptr.buffer).unwrap(),
                B::slice_mut(&mut second_ptr.buffer).unwrap(),
                C::slice_mut(&mut third_ptr.buffer).unwrap(),
            )
        }
    }

    /// Adds the buffers declared in the given phase into the matching
    /// storage buffers: values for zero-order outputs, `dv` for first
    /// order, `d2v` for second order.
    pub fn store_phase(&self, storage: &mut Storage, phase: Phase) {
        for element in &self.elements {
            if element.phase != phase {
                continue;
            }
            match &element.buffer {
                AccBuffer::Scalar(values) => {
                    add_into::<Float>(storage, element.id, element.order, values)
                }
                AccBuffer::Vector(values) => {
                    add_into::<Vector>(storage, element.id, element.order, values)
                }
                AccBuffer::Tensor(values) => {
                    add_into::<Tensor>(storage, element.id, element.order, values)
                }
                AccBuffer::SymTensor(values) => {
                    add_into::<SymTensor>(storage, element.id, element.order, values)
                }
                AccBuffer::TracelessTensor(values) => {
                    add_into::<TracelessTensor>(storage, element.id, element.order, values)
                }
            }
        }
    }

    /// Resets the storage targets of zero-order outputs of a phase.
    /// First- and second-order targets are reset once per sub-step by
    /// `zero_highest_derivatives`.
    pub fn zero_targets(&self, storage: &mut Storage, phase: Phase) {
        for element in &self.elements {
            if element.phase != phase || element.order != OrderEnum::Zero {
                continue;
            }
            match &element.buffer {
                AccBuffer::Scalar(_) => {
                    storage.values_mut::<Float>(element.id).fill(0.0);
                }
                AccBuffer::Vector(_) => {
                    storage.values_mut::<Vector>(element.id).fill(Vector::ZERO);
                }
                AccBuffer::Tensor(_) => {
                    storage.values_mut::<Tensor>(element.id).fill(Tensor::ZERO);
                }
                AccBuffer::SymTensor(_) => {
                    storage
                        .values_mut::<SymTensor>(element.id)
                        .fill(SymTensor::ZERO);
                }
                AccBuffer::TracelessTensor(_) => {
                    storage
                        .values_mut::<TracelessTensor>(element.id)
                        .fill(TracelessTensor::ZERO);
                }
            }
        }
    }
}

fn add_into<T>(storage: &mut Storage, id: QuantityId, order: OrderEnum, values: &[T])
where
    T: AccumulatedValue + crate::storage::TypedAccess + std::ops::AddAssign,
{
    let target = match order {
        OrderEnum::Zero => storage.values_mut::<T>(id),
        OrderEnum::First => storage.dt_mut::<T>(id),
        OrderEnum::Second => storage.d2t_mut::<T>(id),
    };
    debug_assert_eq!(target.len(), values.len());
    for (target, value) in target.iter_mut().zip(values) {
        *target += *value;
    }
}

/// A pairwise-interaction computation: reads particle quantities from
/// a storage snapshot and accumulates contributions into thread-local
/// output buffers.
///
/// Symmetric derivatives are invoked with the lower-rank neighbor list
/// and write to both sides of each pair; asymmetric derivatives are
/// invoked with the full neighbor list and write only to `i`.
pub trait Derivative: Send + Sync {
    fn phase(&self) -> Phase {
        Phase::Evaluate
    }

    fn symmetric(&self) -> bool {
        true
    }

    /// Declares the output buffers.
    fn create(&self, results: &mut Accumulated);

    /// Called once per sub-step before the evaluation loop; caches
    /// per-particle material constants.
    fn init(&mut self, _storage: &Storage) -> Result<(), Error> {
        Ok(())
    }

    /// The hot inner computation: one call per particle over its
    /// neighbor batch, with kernel gradients precomputed by the solver
    /// (`grads[k]` multiplies `r_i - r_j` to give `∇W_ij`).
    fn eval(
        &self,
        input: &Storage,
        results: &mut Accumulated,
        i: usize,
        neighs: &[NeighborRecord],
        grads: &[Float],
    );

    fn as_any(&self) -> &dyn Any;

    /// Structural equality, used by the holder to deduplicate.
    fn equals(&self, other: &dyn Derivative) -> bool;
}

/// Deduplicated set of derivatives, evaluated phase by phase.
#[derive(Default)]
pub struct DerivativeHolder {
    derivatives: Vec<Box<dyn Derivative>>,
}

impl DerivativeHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a derivative unless an equal one is already present.
    pub fn require(&mut self, derivative: Box<dyn Derivative>) {
        if self.derivatives.iter().any(|d| d.equals(&*derivative)) {
            return;
        }
        self.derivatives.push(derivative);
    }

    pub fn len(&self) -> usize {
        self.derivatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.derivatives.is_empty()
    }

    pub fn needs_asymmetric(&self) -> bool {
        self.derivatives.iter().any(|d| !d.symmetric())
    }

    /// Declares the buffers of all derivatives into the accumulated
    /// template.
    pub fn create_buffers(&self, results: &mut Accumulated) {
        for derivative in &self.derivatives {
            derivative.create(results);
        }
    }

    pub fn init(&mut self, storage: &Storage) -> Result<(), Error> {
        for derivative in &mut self.derivatives {
            derivative.init(storage)?;
        }
        Ok(())
    }

    /// Evaluates all derivatives of a phase for one particle.
    #[allow(clippy::too_many_arguments)]
    pub fn eval_phase(
        &self,
        phase: Phase,
        input: &Storage,
        results: &mut Accumulated,
        i: usize,
        sym_neighs: &[NeighborRecord],
        sym_grads: &[Float],
        all_neighs: &[NeighborRecord],
        all_grads: &[Float],
    ) {
        for derivative in &self.derivatives {
            if derivative.phase() != phase {
                continue;
            }
            if derivative.symmetric() {
                derivative.eval(input, results, i, sym_neighs, sym_grads);
            } else {
                derivative.eval(input, results, i, all_neighs, all_grads);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test derivative counting its neighbors into the velocity
    /// divergence buffer.
    #[derive(PartialEq)]
    struct CountNeighbors {
        weight: Float,
    }

    impl Derivative for CountNeighbors {
        fn phase(&self) -> Phase {
            Phase::Precompute
        }

        fn create(&self, results: &mut Accumulated) {
            results.insert::<Float>(
                QuantityId::VelocityDivergence,
                OrderEnum::Zero,
                BufferKind::Unique,
                Phase::Precompute,
            );
        }

        fn eval(
            &self,
            _input: &Storage,
            results: &mut Accumulated,
            i: usize,
            neighs: &[NeighborRecord],
            _grads: &[Float],
        ) {
            results.values_mut::<Float>(QuantityId::VelocityDivergence)[i] +=
                self.weight * neighs.len() as Float;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn equals(&self, other: &dyn Derivative) -> bool {
            other
                .as_any()
                .downcast_ref::<Self>()
                .map_or(false, |other| self == other)
        }
    }

    #[test]
    fn holder_deduplicates_equal_derivatives() {
        let mut holder = DerivativeHolder::new();
        holder.require(Box::new(CountNeighbors { weight: 1.0 }));
        holder.require(Box::new(CountNeighbors { weight: 1.0 }));
        assert_eq!(holder.len(), 1);
        holder.require(Box::new(CountNeighbors { weight: 2.0 }));
        assert_eq!(holder.len(), 2);
    }

    #[test]
    fn shared_buffers_may_be_declared_twice() {
        let mut accumulated = Accumulated::default();
        accumulated.insert::<Vector>(
            QuantityId::Position,
            OrderEnum::Second,
            BufferKind::Shared,
            Phase::Evaluate,
        );
        accumulated.insert::<Vector>(
            QuantityId::Position,
            OrderEnum::Second,
            BufferKind::Shared,
            Phase::Evaluate,
        );
        accumulated.initialize(8);
        assert_eq!(accumulated.values_mut::<Vector>(QuantityId::Position).len(), 8);
    }

    #[test]
    #[should_panic(expected = "unique writer")]
    fn unique_buffers_reject_second_writer() {
        let mut accumulated = Accumulated::default();
        accumulated.insert::<Float>(
            QuantityId::Density,
            OrderEnum::First,
            BufferKind::Unique,
            Phase::Evaluate,
        );
        accumulated.insert::<Float>(
            QuantityId::Density,
            OrderEnum::First,
            BufferKind::Unique,
            Phase::Evaluate,
        );
    }

    #[test]
    fn two_mut_returns_disjoint_buffers() {
        let mut accumulated = Accumulated::default();
        accumulated.insert::<Vector>(
            QuantityId::Position,
            OrderEnum::Second,
            BufferKind::Shared,
            Phase::Evaluate,
        );
        accumulated.insert::<Float>(
            QuantityId::Energy,
            OrderEnum::First,
            BufferKind::Shared,
            Phase::Evaluate,
        );
        accumulated.initialize(4);
        let (dv, du) = accumulated.two_mut::<Vector, Float>(QuantityId::Position, QuantityId::Energy);
        dv[0] += Vector::new(1.0, 0.0, 0.0);
        du[0] += 2.0;
        assert_eq!(dv.len(), 4);
        assert_eq!(du[0], 2.0);
    }
}
