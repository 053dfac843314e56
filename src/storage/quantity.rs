use std::fmt::Debug;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::Sub;

use bitflags::bitflags;

use crate::geometry::Interval;
use crate::geometry::SymTensor;
use crate::geometry::Tensor;
use crate::geometry::TracelessTensor;
use crate::geometry::Vector;
use crate::prelude::Float;

/// Temporal order of a quantity: how many derivative buffers it owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrderEnum {
    /// Value only; set outside of the integrator (material index,
    /// quantities computed by direct summation).
    Zero,
    /// Value plus first derivative, advanced by the integrator.
    First,
    /// Value, first and second derivative. Only positions use this.
    Second,
}

impl OrderEnum {
    pub fn as_u8(self) -> u8 {
        match self {
            OrderEnum::Zero => 0,
            OrderEnum::First => 1,
            OrderEnum::Second => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OrderEnum::Zero),
            1 => Some(OrderEnum::First),
            2 => Some(OrderEnum::Second),
            _ => None,
        }
    }
}

/// Runtime tag of the value type stored in a quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueId {
    Scalar,
    Vector,
    Tensor,
    SymTensor,
    TracelessTensor,
    Index,
}

impl ValueId {
    pub fn as_u8(self) -> u8 {
        match self {
            ValueId::Scalar => 0,
            ValueId::Vector => 1,
            ValueId::Tensor => 2,
            ValueId::SymTensor => 3,
            ValueId::TracelessTensor => 4,
            ValueId::Index => 5,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ValueId::Scalar),
            1 => Some(ValueId::Vector),
            2 => Some(ValueId::Tensor),
            3 => Some(ValueId::SymTensor),
            4 => Some(ValueId::TracelessTensor),
            5 => Some(ValueId::Index),
            _ => None,
        }
    }

    /// Number of floats (or indices) per particle.
    pub fn components(self) -> usize {
        match self {
            ValueId::Scalar | ValueId::Index => 1,
            ValueId::Vector => 4,
            ValueId::Tensor => 9,
            ValueId::SymTensor => 6,
            ValueId::TracelessTensor => 5,
        }
    }
}

/// Value storable in a quantity buffer.
pub trait BufferValue: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const VALUE_ID: ValueId;

    fn is_finite(&self) -> bool;
}

/// Value the integrators can advance in time.
pub trait ArithmeticValue:
    BufferValue
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + Mul<Float, Output = Self>
{
    fn clamped(self, range: &Interval) -> Self;

    /// Norm used by the derivative-ratio step criterion.
    fn magnitude(&self) -> Float;
}

impl BufferValue for Float {
    const VALUE_ID: ValueId = ValueId::Scalar;

    fn is_finite(&self) -> bool {
        Float::is_finite(*self)
    }
}

impl ArithmeticValue for Float {
    fn clamped(self, range: &Interval) -> Self {
        range.clamp(self)
    }

    fn magnitude(&self) -> Float {
        self.abs()
    }
}

impl BufferValue for Vector {
    const VALUE_ID: ValueId = ValueId::Vector;

    fn is_finite(&self) -> bool {
        Vector::is_finite(self)
    }
}

impl ArithmeticValue for Vector {
    fn clamped(self, range: &Interval) -> Self {
        if range.is_unbounded() {
            return self;
        }
        let mut result = self;
        for i in 0..4 {
            result[i] = range.clamp(result[i]);
        }
        result
    }

    fn magnitude(&self) -> Float {
        self.length()
    }
}

impl BufferValue for Tensor {
    const VALUE_ID: ValueId = ValueId::Tensor;

    fn is_finite(&self) -> bool {
        Tensor::is_finite(self)
    }
}

impl ArithmeticValue for Tensor {
    fn clamped(self, _range: &Interval) -> Self {
        self
    }

    fn magnitude(&self) -> Float {
        self.ddot(&self).sqrt()
    }
}

impl BufferValue for SymTensor {
    const VALUE_ID: ValueId = ValueId::SymTensor;

    fn is_finite(&self) -> bool {
        SymTensor::is_finite(self)
    }
}

impl ArithmeticValue for SymTensor {
    fn clamped(self, _range: &Interval) -> Self {
        self
    }

    fn magnitude(&self) -> Float {
        self.ddot(&self).sqrt()
    }
}

impl BufferValue for TracelessTensor {
    const VALUE_ID: ValueId = ValueId::TracelessTensor;

    fn is_finite(&self) -> bool {
        TracelessTensor::is_finite(self)
    }
}

impl ArithmeticValue for TracelessTensor {
    fn clamped(self, _range: &Interval) -> Self {
        self
    }

    fn magnitude(&self) -> Float {
        self.ddot(&self).sqrt()
    }
}

impl BufferValue for u32 {
    const VALUE_ID: ValueId = ValueId::Index;

    fn is_finite(&self) -> bool {
        true
    }
}

bitflags! {
    /// Buffer subsets used by clone and swap.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VisitorFlags: u32 {
        /// Value buffers of all quantities.
        const VALUES = 1;
        /// First-derivative buffers.
        const FIRST_DERIVATIVES = 2;
        /// Second-derivative buffers.
        const SECOND_DERIVATIVES = 4;
        /// The output of the derivative pipeline: `dv` of first-order
        /// and `d2v` of second-order quantities.
        const HIGHEST_DERIVATIVES = 8;
        /// The integrator state: values plus `dv` of second-order
        /// quantities (i.e. velocities).
        const STATE_VALUES = 16;
        const ALL_BUFFERS = Self::VALUES.bits()
            | Self::FIRST_DERIVATIVES.bits()
            | Self::SECOND_DERIVATIVES.bits();
    }
}

/// Value buffer plus derivative buffers of one quantity, typed.
#[derive(Clone, Debug, PartialEq)]
pub struct Holder<T: BufferValue> {
    order: OrderEnum,
    v: Vec<T>,
    dv: Vec<T>,
    d2v: Vec<T>,
}

impl<T: BufferValue> Holder<T> {
    pub fn uniform(order: OrderEnum, value: T, count: usize) -> Self {
        Self::from_values(order, vec![value; count])
    }

    pub fn from_values(order: OrderEnum, values: Vec<T>) -> Self {
        let count = values.len();
        Self {
            order,
            v: values,
            dv: match order {
                OrderEnum::Zero => vec![],
                _ => vec![T::default(); count],
            },
            d2v: match order {
                OrderEnum::Second => vec![T::default(); count],
                _ => vec![],
            },
        }
    }

    pub fn order(&self) -> OrderEnum {
        self.order
    }

    pub fn len(&self) -> usize {
        self.v.len()
    }

    pub fn values(&self) -> &[T] {
        &self.v
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.v
    }

    pub fn dt(&self) -> &[T] {
        debug_assert!(self.order >= OrderEnum::First);
        &self.dv
    }

    pub fn dt_mut(&mut self) -> &mut [T] {
        debug_assert!(self.order >= OrderEnum::First);
        &mut self.dv
    }

    pub fn d2t(&self) -> &[T] {
        debug_assert!(self.order == OrderEnum::Second);
        &self.d2v
    }

    pub fn d2t_mut(&mut self) -> &mut [T] {
        debug_assert!(self.order == OrderEnum::Second);
        &mut self.d2v
    }

    /// Upgrades the order in place, allocating the extra derivative
    /// buffers. Downgrades are not allowed.
    pub fn set_order(&mut self, order: OrderEnum) {
        assert!(order >= self.order);
        let count = self.len();
        if order >= OrderEnum::First && self.dv.is_empty() {
            self.dv = vec![T::default(); count];
        }
        if order == OrderEnum::Second && self.d2v.is_empty() {
            self.d2v = vec![T::default(); count];
        }
        self.order = order;
    }

    fn buffer_selected(&self, buffer: usize, flags: VisitorFlags) -> bool {
        match (buffer, self.order) {
            (0, _) => flags.intersects(VisitorFlags::VALUES | VisitorFlags::STATE_VALUES),
            (1, OrderEnum::First) => flags.intersects(
                VisitorFlags::FIRST_DERIVATIVES | VisitorFlags::HIGHEST_DERIVATIVES,
            ),
            (1, OrderEnum::Second) => flags
                .intersects(VisitorFlags::FIRST_DERIVATIVES | VisitorFlags::STATE_VALUES),
            (2, OrderEnum::Second) => flags.intersects(
                VisitorFlags::SECOND_DERIVATIVES | VisitorFlags::HIGHEST_DERIVATIVES,
            ),
            _ => false,
        }
    }

    pub fn clone_flags(&self, flags: VisitorFlags) -> Self {
        let count = self.len();
        let select = |buffer: usize, source: &Vec<T>| {
            if self.buffer_selected(buffer, flags) {
                source.clone()
            } else {
                vec![T::default(); source.len().min(count)]
            }
        };
        Self {
            order: self.order,
            v: select(0, &self.v),
            dv: select(1, &self.dv),
            d2v: select(2, &self.d2v),
        }
    }

    pub fn swap_flags(&mut self, other: &mut Self, flags: VisitorFlags) {
        assert_eq!(self.order, other.order);
        if self.buffer_selected(0, flags) {
            std::mem::swap(&mut self.v, &mut other.v);
        }
        if self.buffer_selected(1, flags) {
            std::mem::swap(&mut self.dv, &mut other.dv);
        }
        if self.buffer_selected(2, flags) {
            std::mem::swap(&mut self.d2v, &mut other.d2v);
        }
    }

    /// Resets the output buffers of the derivative pipeline to zero.
    pub fn zero_highest(&mut self) {
        match self.order {
            OrderEnum::Zero => {}
            OrderEnum::First => self.dv.fill(T::default()),
            OrderEnum::Second => self.d2v.fill(T::default()),
        }
    }

    pub fn resize(&mut self, count: usize) {
        self.v.resize(count, T::default());
        if self.order >= OrderEnum::First {
            self.dv.resize(count, T::default());
        }
        if self.order == OrderEnum::Second {
            self.d2v.resize(count, T::default());
        }
    }

    pub fn merge(&mut self, mut other: Self) {
        assert_eq!(self.order, other.order);
        self.v.append(&mut other.v);
        if self.order >= OrderEnum::First {
            self.dv.append(&mut other.dv);
        }
        if self.order == OrderEnum::Second {
            self.d2v.append(&mut other.d2v);
        }
    }

    /// Removes the given (sorted, deduplicated) particle indices,
    /// preserving the order of the remaining particles.
    pub fn remove(&mut self, indices: &[usize]) {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        for buffer in [&mut self.v, &mut self.dv, &mut self.d2v] {
            if buffer.is_empty() {
                continue;
            }
            let mut removed = indices.iter().peekable();
            let mut write = 0;
            for read in 0..buffer.len() {
                if removed.peek() == Some(&&read) {
                    removed.next();
                    continue;
                }
                buffer[write] = buffer[read];
                write += 1;
            }
            buffer.truncate(write);
        }
    }

    /// All three buffers at once, for integrators that update values
    /// and derivatives in one pass. Buffers of orders the quantity does
    /// not have are empty.
    pub fn all_mut(&mut self) -> (&mut [T], &mut [T], &mut [T]) {
        (&mut self.v, &mut self.dv, &mut self.d2v)
    }

    pub(crate) fn set_derivative_buffer(&mut self, level: usize, values: Vec<T>) {
        assert_eq!(values.len(), self.len());
        match level {
            1 => self.dv = values,
            2 => self.d2v = values,
            _ => panic!("not a derivative buffer"),
        }
    }
}

/// Read-only view of one buffer of a quantity, dispatched on the value
/// type tag. Used by the snapshot writers.
pub enum BufferRef<'a> {
    Scalar(&'a [Float]),
    Vector(&'a [Vector]),
    Tensor(&'a [Tensor]),
    SymTensor(&'a [SymTensor]),
    TracelessTensor(&'a [TracelessTensor]),
    Index(&'a [u32]),
}

/// Tagged union over the typed holders.
#[derive(Clone, Debug, PartialEq)]
pub enum QuantityData {
    Scalar(Holder<Float>),
    Vector(Holder<Vector>),
    Tensor(Holder<Tensor>),
    SymTensor(Holder<SymTensor>),
    TracelessTensor(Holder<TracelessTensor>),
    Index(Holder<u32>),
}

macro_rules! dispatch {
    ($data:expr, $holder:ident => $body:expr) => {
        match $data {
            QuantityData::Scalar($holder) => $body,
            QuantityData::Vector($holder) => $body,
            QuantityData::Tensor($holder) => $body,
            QuantityData::SymTensor($holder) => $body,
            QuantityData::TracelessTensor($holder) => $body,
            QuantityData::Index($holder) => $body,
        }
    };
}

/// Visitor over the typed holder of a single quantity. The index
/// variant is skipped by default since index quantities are never
/// advanced in time.
pub trait QuantityVisitorMut {
    fn visit<T: ArithmeticValue>(&mut self, range: &Interval, holder: &mut Holder<T>);

    fn visit_index(&mut self, _holder: &mut Holder<u32>) {}
}

/// Visitor over matching holders of two storages (e.g. the run storage
/// and a predictor-corrector snapshot).
pub trait QuantityPairVisitorMut {
    fn visit<T: ArithmeticValue>(
        &mut self,
        range: &Interval,
        first: &mut Holder<T>,
        second: &mut Holder<T>,
    );

    fn visit_index(&mut self, _first: &mut Holder<u32>, _second: &mut Holder<u32>) {}
}

/// A named, typed, evolving particle attribute: up to three contiguous
/// buffers (value, first, second derivative) plus the allowed interval
/// values are clamped into after each step.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    data: QuantityData,
    range: Interval,
}

impl Quantity {
    pub fn new<T: BufferValue>(holder: Holder<T>) -> Self
    where
        Holder<T>: Into<QuantityData>,
    {
        Self {
            data: holder.into(),
            range: Interval::UNBOUNDED,
        }
    }

    pub fn with_range(mut self, range: Interval) -> Self {
        self.range = range;
        self
    }

    pub fn value_id(&self) -> ValueId {
        match &self.data {
            QuantityData::Scalar(_) => ValueId::Scalar,
            QuantityData::Vector(_) => ValueId::Vector,
            QuantityData::Tensor(_) => ValueId::Tensor,
            QuantityData::SymTensor(_) => ValueId::SymTensor,
            QuantityData::TracelessTensor(_) => ValueId::TracelessTensor,
            QuantityData::Index(_) => ValueId::Index,
        }
    }

    pub fn order(&self) -> OrderEnum {
        dispatch!(&self.data, holder => holder.order())
    }

    pub fn len(&self) -> usize {
        dispatch!(&self.data, holder => holder.len())
    }

    pub fn range(&self) -> Interval {
        self.range
    }

    pub fn set_range(&mut self, range: Interval) {
        self.range = range;
    }

    pub fn data(&self) -> &QuantityData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut QuantityData {
        &mut self.data
    }

    pub fn set_order(&mut self, order: OrderEnum) {
        dispatch!(&mut self.data, holder => holder.set_order(order))
    }

    pub fn zero_highest(&mut self) {
        dispatch!(&mut self.data, holder => holder.zero_highest())
    }

    pub fn resize(&mut self, count: usize) {
        dispatch!(&mut self.data, holder => holder.resize(count))
    }

    pub fn remove(&mut self, indices: &[usize]) {
        dispatch!(&mut self.data, holder => holder.remove(indices))
    }

    pub fn clone_flags(&self, flags: VisitorFlags) -> Self {
        Self {
            data: dispatch!(&self.data, holder => holder.clone_flags(flags).into()),
            range: self.range,
        }
    }

    pub fn swap_flags(&mut self, other: &mut Self, flags: VisitorFlags) {
        match (&mut self.data, &mut other.data) {
            (QuantityData::Scalar(a), QuantityData::Scalar(b)) => a.swap_flags(b, flags),
            (QuantityData::Vector(a), QuantityData::Vector(b)) => a.swap_flags(b, flags),
            (QuantityData::Tensor(a), QuantityData::Tensor(b)) => a.swap_flags(b, flags),
            (QuantityData::SymTensor(a), QuantityData::SymTensor(b)) => a.swap_flags(b, flags),
            (QuantityData::TracelessTensor(a), QuantityData::TracelessTensor(b)) => {
                a.swap_flags(b, flags)
            }
            (QuantityData::Index(a), QuantityData::Index(b)) => a.swap_flags(b, flags),
            _ => panic!("swap between quantities of different value types"),
        }
    }

    pub fn merge(&mut self, other: Self) {
        match (&mut self.data, other.data) {
            (QuantityData::Scalar(a), QuantityData::Scalar(b)) => a.merge(b),
            (QuantityData::Vector(a), QuantityData::Vector(b)) => a.merge(b),
            (QuantityData::Tensor(a), QuantityData::Tensor(b)) => a.merge(b),
            (QuantityData::SymTensor(a), QuantityData::SymTensor(b)) => a.merge(b),
            (QuantityData::TracelessTensor(a), QuantityData::TracelessTensor(b)) => a.merge(b),
            (QuantityData::Index(a), QuantityData::Index(b)) => a.merge(b),
            _ => panic!("merge between quantities of different value types"),
        }
    }

    pub fn visit_mut(&mut self, visitor: &mut impl QuantityVisitorMut) {
        let range = self.range;
        match &mut self.data {
            QuantityData::Scalar(holder) => visitor.visit(&range, holder),
            QuantityData::Vector(holder) => visitor.visit(&range, holder),
            QuantityData::Tensor(holder) => visitor.visit(&range, holder),
            QuantityData::SymTensor(holder) => visitor.visit(&range, holder),
            QuantityData::TracelessTensor(holder) => visitor.visit(&range, holder),
            QuantityData::Index(holder) => visitor.visit_index(holder),
        }
    }

    pub fn visit_pair_mut(
        &mut self,
        other: &mut Quantity,
        visitor: &mut impl QuantityPairVisitorMut,
    ) {
        let range = self.range;
        match (&mut self.data, &mut other.data) {
            (QuantityData::Scalar(a), QuantityData::Scalar(b)) => visitor.visit(&range, a, b),
            (QuantityData::Vector(a), QuantityData::Vector(b)) => visitor.visit(&range, a, b),
            (QuantityData::Tensor(a), QuantityData::Tensor(b)) => visitor.visit(&range, a, b),
            (QuantityData::SymTensor(a), QuantityData::SymTensor(b)) => {
                visitor.visit(&range, a, b)
            }
            (QuantityData::TracelessTensor(a), QuantityData::TracelessTensor(b)) => {
                visitor.visit(&range, a, b)
            }
            (QuantityData::Index(a), QuantityData::Index(b)) => visitor.visit_index(a, b),
            _ => panic!("pair visit over quantities of different value types"),
        }
    }

    /// View of the buffer at the given derivative level, if the order
    /// permits.
    pub fn buffer(&self, level: usize) -> Option<BufferRef> {
        if level > self.order().as_u8() as usize {
            return None;
        }
        Some(match &self.data {
            QuantityData::Scalar(h) => BufferRef::Scalar(Self::level_slice(h, level)),
            QuantityData::Vector(h) => BufferRef::Vector(Self::level_slice(h, level)),
            QuantityData::Tensor(h) => BufferRef::Tensor(Self::level_slice(h, level)),
            QuantityData::SymTensor(h) => BufferRef::SymTensor(Self::level_slice(h, level)),
            QuantityData::TracelessTensor(h) => {
                BufferRef::TracelessTensor(Self::level_slice(h, level))
            }
            QuantityData::Index(h) => BufferRef::Index(Self::level_slice(h, level)),
        })
    }

    fn level_slice<T: BufferValue>(holder: &Holder<T>, level: usize) -> &[T] {
        match level {
            0 => holder.values(),
            1 => holder.dt(),
            2 => holder.d2t(),
            _ => unreachable!(),
        }
    }
}

impl From<Holder<Float>> for QuantityData {
    fn from(holder: Holder<Float>) -> Self {
        QuantityData::Scalar(holder)
    }
}

impl From<Holder<Vector>> for QuantityData {
    fn from(holder: Holder<Vector>) -> Self {
        QuantityData::Vector(holder)
    }
}

impl From<Holder<Tensor>> for QuantityData {
    fn from(holder: Holder<Tensor>) -> Self {
        QuantityData::Tensor(holder)
    }
}

impl From<Holder<SymTensor>> for QuantityData {
    fn from(holder: Holder<SymTensor>) -> Self {
        QuantityData::SymTensor(holder)
    }
}

impl From<Holder<TracelessTensor>> for QuantityData {
    fn from(holder: Holder<TracelessTensor>) -> Self {
        QuantityData::TracelessTensor(holder)
    }
}

impl From<Holder<u32>> for QuantityData {
    fn from(holder: Holder<u32>) -> Self {
        QuantityData::Index(holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_upgrade_allocates_derivatives() {
        let mut holder = Holder::uniform(OrderEnum::Zero, 1.0, 4);
        holder.set_order(OrderEnum::First);
        assert_eq!(holder.dt().len(), 4);
        assert_eq!(holder.values(), &[1.0; 4]);
    }

    #[test]
    fn clone_highest_derivatives_zeroes_values() {
        let mut holder = Holder::uniform(OrderEnum::First, 2.0, 3);
        holder.dt_mut().fill(5.0);
        let cloned = holder.clone_flags(VisitorFlags::HIGHEST_DERIVATIVES);
        assert_eq!(cloned.values(), &[0.0; 3]);
        assert_eq!(cloned.dt(), &[5.0; 3]);
    }

    #[test]
    fn swap_state_values_of_second_order() {
        let mut a = Holder::uniform(OrderEnum::Second, 1.0, 2);
        let mut b = Holder::uniform(OrderEnum::Second, 2.0, 2);
        a.d2t_mut().fill(10.0);
        b.d2t_mut().fill(20.0);
        a.swap_flags(&mut b, VisitorFlags::STATE_VALUES);
        // values and first derivatives swapped, second derivatives kept
        assert_eq!(a.values(), &[2.0; 2]);
        assert_eq!(a.d2t(), &[10.0; 2]);
    }

    #[test]
    fn remove_preserves_order() {
        let mut holder = Holder::from_values(OrderEnum::Zero, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        holder.remove(&[1, 3]);
        assert_eq!(holder.values(), &[0.0, 2.0, 4.0]);
    }
}
