mod quantity;
mod quantity_id;

use std::collections::BTreeMap;
use std::ops::Range;

pub use quantity::ArithmeticValue;
pub use quantity::BufferRef;
pub use quantity::BufferValue;
pub use quantity::Holder;
pub use quantity::OrderEnum;
pub use quantity::Quantity;
pub use quantity::QuantityData;
pub use quantity::QuantityPairVisitorMut;
pub use quantity::QuantityVisitorMut;
pub use quantity::ValueId;
pub use quantity::VisitorFlags;
pub use quantity_id::QuantityId;

use crate::error::Error;
use crate::geometry::Interval;
use crate::geometry::SymTensor;
use crate::geometry::Tensor;
use crate::geometry::TracelessTensor;
use crate::geometry::Vector;
use crate::materials::Material;
use crate::prelude::Float;

/// Typed extraction of a holder from the tagged quantity union.
pub trait TypedAccess: BufferValue {
    fn holder(data: &QuantityData) -> Option<&Holder<Self>>;
    fn holder_mut(data: &mut QuantityData) -> Option<&mut Holder<Self>>;
}

macro_rules! impl_typed_access {
    ($type:ty, $variant:ident) => {
        impl TypedAccess for $type {
            fn holder(data: &QuantityData) -> Option<&Holder<Self>> {
                match data {
                    QuantityData::$variant(holder) => Some(holder),
                    _ => None,
                }
            }

            fn holder_mut(data: &mut QuantityData) -> Option<&mut Holder<Self>> {
                match data {
                    QuantityData::$variant(holder) => Some(holder),
                    _ => None,
                }
            }
        }
    };
}

impl_typed_access!(Float, Scalar);
impl_typed_access!(Vector, Vector);
impl_typed_access!(Tensor, Tensor);
impl_typed_access!(SymTensor, SymTensor);
impl_typed_access!(TracelessTensor, TracelessTensor);
impl_typed_access!(u32, Index);

/// Container of all particle quantities of a run: an ordered mapping
/// from quantity id to the typed buffer triple, plus the materials the
/// particles belong to.
///
/// Particles are kept in sorted-material order: all particles of
/// material 0 first, then material 1, and so on. `merge` and `remove`
/// maintain this invariant, which makes the index range of a material a
/// contiguous sequence.
#[derive(Default)]
pub struct Storage {
    quantities: BTreeMap<QuantityId, Quantity>,
    materials: Vec<Box<dyn Material>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage holding the particles of a single body made of
    /// the given material.
    pub fn with_material(material: Box<dyn Material>) -> Self {
        let mut storage = Self::new();
        storage.materials.push(material);
        storage
    }

    pub fn particle_count(&self) -> usize {
        self.quantities
            .values()
            .next()
            .map(|quantity| quantity.len())
            .unwrap_or(0)
    }

    pub fn quantity_count(&self) -> usize {
        self.quantities.len()
    }

    pub fn has(&self, id: QuantityId) -> bool {
        self.quantities.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = QuantityId> + '_ {
        self.quantities.keys().copied()
    }

    pub fn quantity(&self, id: QuantityId) -> Option<&Quantity> {
        self.quantities.get(&id)
    }

    pub fn quantity_mut(&mut self, id: QuantityId) -> Option<&mut Quantity> {
        self.quantities.get_mut(&id)
    }

    pub fn quantities(&self) -> impl Iterator<Item = (QuantityId, &Quantity)> {
        self.quantities.iter().map(|(id, quantity)| (*id, quantity))
    }

    pub fn quantities_mut(&mut self) -> impl Iterator<Item = (QuantityId, &mut Quantity)> {
        self.quantities
            .iter_mut()
            .map(|(id, quantity)| (*id, quantity))
    }

    /// Inserts a quantity with the given uniform initial value. If the
    /// quantity already exists with the same value type, the higher of
    /// the two orders wins and existing values are kept.
    pub fn insert<T>(&mut self, id: QuantityId, order: OrderEnum, value: T) -> Result<(), Error>
    where
        T: TypedAccess,
        Holder<T>: Into<QuantityData>,
    {
        let count = self.particle_count();
        if self.quantities.is_empty() {
            return Err(Error::InvalidSetup(format!(
                "cannot insert {:?} with a uniform value into an empty storage",
                id
            )));
        }
        self.insert_with_values(id, order, vec![value; count])
    }

    /// Inserts a quantity from explicit per-particle values. The first
    /// quantity inserted into an empty storage defines the particle
    /// count.
    pub fn insert_with_values<T>(
        &mut self,
        id: QuantityId,
        order: OrderEnum,
        values: Vec<T>,
    ) -> Result<(), Error>
    where
        T: TypedAccess,
        Holder<T>: Into<QuantityData>,
    {
        if !self.quantities.is_empty() && values.len() != self.particle_count() {
            return Err(Error::InvalidSetup(format!(
                "quantity {:?} has {} particles, storage has {}",
                id,
                values.len(),
                self.particle_count()
            )));
        }
        match self.quantities.get_mut(&id) {
            Some(existing) => {
                if T::holder(existing.data()).is_none() {
                    return Err(Error::InvalidQuantity {
                        quantity: id.name(),
                        message: format!(
                            "already present with value type {:?}",
                            existing.value_id()
                        ),
                    });
                }
                if existing.order() < order {
                    existing.set_order(order);
                }
            }
            None => {
                self.quantities
                    .insert(id, Quantity::new(Holder::from_values(order, values)));
            }
        }
        Ok(())
    }

    pub(crate) fn insert_quantity(&mut self, id: QuantityId, quantity: Quantity) {
        debug_assert!(
            self.quantities.is_empty() || quantity.len() == self.particle_count()
        );
        self.quantities.insert(id, quantity);
    }

    pub fn set_range(&mut self, id: QuantityId, range: Interval) {
        if let Some(quantity) = self.quantities.get_mut(&id) {
            quantity.set_range(range);
        }
    }

    fn typed_holder<T: TypedAccess>(&self, id: QuantityId) -> &Holder<T> {
        let quantity = self
            .quantities
            .get(&id)
            .unwrap_or_else(|| panic!("quantity {:?} not present", id));
        T::holder(quantity.data())
            .unwrap_or_else(|| panic!("quantity {:?} has value type {:?}", id, quantity.value_id()))
    }

    fn typed_holder_mut<T: TypedAccess>(&mut self, id: QuantityId) -> &mut Holder<T> {
        let quantity = self
            .quantities
            .get_mut(&id)
            .unwrap_or_else(|| panic!("quantity {:?} not present", id));
        let value_id = quantity.value_id();
        T::holder_mut(quantity.data_mut())
            .unwrap_or_else(|| panic!("quantity {:?} has value type {:?}", id, value_id))
    }

    /// Typed value buffer. Panics when the quantity is missing or typed
    /// differently; use `try_values` at API boundaries.
    pub fn values<T: TypedAccess>(&self, id: QuantityId) -> &[T] {
        self.typed_holder::<T>(id).values()
    }

    pub fn values_mut<T: TypedAccess>(&mut self, id: QuantityId) -> &mut [T] {
        self.typed_holder_mut::<T>(id).values_mut()
    }

    pub fn dt<T: TypedAccess>(&self, id: QuantityId) -> &[T] {
        self.typed_holder::<T>(id).dt()
    }

    pub fn dt_mut<T: TypedAccess>(&mut self, id: QuantityId) -> &mut [T] {
        self.typed_holder_mut::<T>(id).dt_mut()
    }

    pub fn d2t<T: TypedAccess>(&self, id: QuantityId) -> &[T] {
        self.typed_holder::<T>(id).d2t()
    }

    pub fn d2t_mut<T: TypedAccess>(&mut self, id: QuantityId) -> &mut [T] {
        self.typed_holder_mut::<T>(id).d2t_mut()
    }

    pub fn try_values<T: TypedAccess>(&self, id: QuantityId) -> Result<&[T], Error> {
        let quantity = self.quantities.get(&id).ok_or(Error::InvalidQuantity {
            quantity: id.name(),
            message: "not present".to_owned(),
        })?;
        T::holder(quantity.data())
            .map(|holder| holder.values())
            .ok_or(Error::InvalidQuantity {
                quantity: id.name(),
                message: format!("has value type {:?}", quantity.value_id()),
            })
    }

    /// Resets the outputs of the derivative pipeline; called at the
    /// beginning of every sub-step.
    pub fn zero_highest_derivatives(&mut self) {
        for quantity in self.quantities.values_mut() {
            quantity.zero_highest();
        }
    }

    pub fn clone_flags(&self, flags: VisitorFlags) -> Storage {
        Storage {
            quantities: self
                .quantities
                .iter()
                .map(|(id, quantity)| (*id, quantity.clone_flags(flags)))
                .collect(),
            materials: vec![],
        }
    }

    /// Swaps the selected buffer subsets with another storage of the
    /// same structure.
    pub fn swap_flags(&mut self, other: &mut Storage, flags: VisitorFlags) {
        assert_eq!(self.quantity_count(), other.quantity_count());
        for (quantity, other_quantity) in self
            .quantities
            .values_mut()
            .zip(other.quantities.values_mut())
        {
            quantity.swap_flags(other_quantity, flags);
        }
    }

    /// Appends the particles of another storage. Material indices of
    /// the appended particles are renumbered and the material sequences
    /// concatenated, which keeps the sorted-material invariant.
    pub fn merge(&mut self, mut other: Storage) {
        assert_eq!(self.quantity_count(), other.quantity_count());
        let offset = self.materials.len() as u32;
        if other.has(QuantityId::MaterialIdx) {
            for mat_idx in other.values_mut::<u32>(QuantityId::MaterialIdx) {
                *mat_idx += offset;
            }
        }
        self.materials.append(&mut other.materials);
        for ((id, quantity), (other_id, other_quantity)) in self
            .quantities
            .iter_mut()
            .zip(other.quantities.into_iter())
        {
            assert_eq!(*id, other_id);
            quantity.merge(other_quantity);
        }
    }

    /// Removes the given particles, preserving the order of the rest.
    pub fn remove(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for quantity in self.quantities.values_mut() {
            quantity.remove(&sorted);
        }
    }

    pub fn resize(&mut self, count: usize) {
        for quantity in self.quantities.values_mut() {
            quantity.resize(count);
        }
    }

    pub fn visit_quantities_mut(&mut self, visitor: &mut impl QuantityVisitorMut) {
        for quantity in self.quantities.values_mut() {
            quantity.visit_mut(visitor);
        }
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn material(&self, index: usize) -> &dyn Material {
        &*self.materials[index]
    }

    pub fn materials(&self) -> impl Iterator<Item = &dyn Material> {
        self.materials.iter().map(|material| &**material)
    }

    pub(crate) fn push_material(&mut self, material: Box<dyn Material>) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    /// Lends the materials to another storage, e.g. an intermediate
    /// stage of a multi-stage integrator.
    pub(crate) fn take_materials(&mut self) -> Vec<Box<dyn Material>> {
        std::mem::take(&mut self.materials)
    }

    pub(crate) fn set_materials(&mut self, materials: Vec<Box<dyn Material>>) {
        self.materials = materials;
    }

    /// Contiguous index range of the particles belonging to the given
    /// material, relying on the sorted-material invariant.
    pub fn material_range(&self, index: usize) -> Range<usize> {
        if !self.has(QuantityId::MaterialIdx) {
            debug_assert!(index == 0);
            return 0..self.particle_count();
        }
        let mat_idxs = self.values::<u32>(QuantityId::MaterialIdx);
        debug_assert!(mat_idxs.windows(2).all(|w| w[0] <= w[1]));
        let index = index as u32;
        let start = mat_idxs.partition_point(|&m| m < index);
        let end = mat_idxs.partition_point(|&m| m <= index);
        start..end
    }

    /// Runs a closure for every material with the materials temporarily
    /// taken out of the storage, so the closure can mutate both.
    pub fn for_each_material(
        &mut self,
        mut action: impl FnMut(&mut dyn Material, Range<usize>, &mut Storage) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut materials = std::mem::take(&mut self.materials);
        let mut result = Ok(());
        for (index, material) in materials.iter_mut().enumerate() {
            let sequence = self.material_range(index);
            result = action(&mut **material, sequence, self);
            if result.is_err() {
                break;
            }
        }
        self.materials = materials;
        result
    }

    /// Clamps every quantity into the interval declared by the material
    /// of each particle.
    pub fn clamp_material_ranges(&mut self) {
        let mut materials = std::mem::take(&mut self.materials);
        for (index, material) in materials.iter_mut().enumerate() {
            let sequence = self.material_range(index);
            for (id, range) in material.ranges() {
                if let Some(quantity) = self.quantities.get_mut(&id) {
                    quantity.visit_mut(&mut ClampSegment {
                        range,
                        sequence: sequence.clone(),
                    });
                }
            }
        }
        self.materials = materials;
    }
}

struct ClampSegment {
    range: Interval,
    sequence: Range<usize>,
}

impl QuantityVisitorMut for ClampSegment {
    fn visit<T: ArithmeticValue>(&mut self, _range: &Interval, holder: &mut Holder<T>) {
        for value in &mut holder.values_mut()[self.sequence.clone()] {
            *value = value.clamped(&self.range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::NullMaterial;

    fn gas_storage(count: usize) -> Storage {
        let mut storage = Storage::with_material(Box::new(NullMaterial::new()));
        let positions = (0..count)
            .map(|i| Vector::with_h(i as Float, 0.0, 0.0, 1.0))
            .collect();
        storage
            .insert_with_values(QuantityId::Position, OrderEnum::Second, positions)
            .unwrap();
        storage
            .insert(QuantityId::Mass, OrderEnum::Zero, 1.0)
            .unwrap();
        storage
            .insert(QuantityId::Density, OrderEnum::First, 1000.0)
            .unwrap();
        storage
            .insert_with_values(QuantityId::MaterialIdx, OrderEnum::Zero, vec![0; count])
            .unwrap();
        storage
    }

    #[test]
    fn insert_type_mismatch_is_an_error() {
        let mut storage = gas_storage(4);
        let result = storage.insert(QuantityId::Mass, OrderEnum::Zero, Vector::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn insert_upgrades_order_in_place() {
        let mut storage = gas_storage(4);
        storage.values_mut::<Float>(QuantityId::Mass)[2] = 7.0;
        storage
            .insert(QuantityId::Mass, OrderEnum::First, 0.0)
            .unwrap();
        assert_eq!(
            storage.quantity(QuantityId::Mass).unwrap().order(),
            OrderEnum::First
        );
        // existing values survive the upgrade
        assert_eq!(storage.values::<Float>(QuantityId::Mass)[2], 7.0);
        assert_eq!(storage.dt::<Float>(QuantityId::Mass).len(), 4);
    }

    #[test]
    fn merge_renumbers_material_indices() {
        let mut first = gas_storage(3);
        let second = gas_storage(2);
        first.merge(second);
        assert_eq!(first.particle_count(), 5);
        assert_eq!(first.material_count(), 2);
        assert_eq!(
            first.values::<u32>(QuantityId::MaterialIdx),
            &[0, 0, 0, 1, 1]
        );
        assert_eq!(first.material_range(0), 0..3);
        assert_eq!(first.material_range(1), 3..5);
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut storage = gas_storage(5);
        storage.remove(&[4, 0, 2]);
        assert_eq!(storage.particle_count(), 2);
        let positions = storage.values::<Vector>(QuantityId::Position);
        assert_eq!(positions[0].x(), 1.0);
        assert_eq!(positions[1].x(), 3.0);
    }

    #[test]
    fn clone_then_swap_restores_both() {
        let mut storage = gas_storage(4);
        storage.values_mut::<Float>(QuantityId::Density)[1] = 42.0;
        let mut cloned = storage.clone_flags(VisitorFlags::ALL_BUFFERS);
        let reference = storage.clone_flags(VisitorFlags::ALL_BUFFERS);
        storage.swap_flags(&mut cloned, VisitorFlags::ALL_BUFFERS);
        assert_eq!(
            storage.values::<Float>(QuantityId::Density),
            reference.values::<Float>(QuantityId::Density)
        );
        assert_eq!(
            cloned.values::<Float>(QuantityId::Density),
            reference.values::<Float>(QuantityId::Density)
        );
    }

    #[test]
    fn zero_highest_derivatives_resets_outputs() {
        let mut storage = gas_storage(3);
        storage.dt_mut::<Float>(QuantityId::Density).fill(5.0);
        storage.d2t_mut::<Vector>(QuantityId::Position)[0] = Vector::new(1.0, 0.0, 0.0);
        storage.zero_highest_derivatives();
        assert_eq!(storage.dt::<Float>(QuantityId::Density), &[0.0; 3]);
        assert_eq!(
            storage.d2t::<Vector>(QuantityId::Position)[0],
            Vector::ZERO
        );
    }
}
