use std::fmt;

use crate::finders::KdTree;
use crate::finders::NeighborFinder;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::storage::BufferRef;
use crate::storage::QuantityId;
use crate::storage::Storage;

/// Kind tag of an integrity problem found by a diagnostics pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticsId {
    NonFiniteQuantity,
    NonPositiveSmoothingLength,
    DamageOutOfRange,
    /// Two particles closer than a small fraction of their smoothing
    /// length; the smoothed dynamics cannot separate them again.
    ParticlePairing,
}

/// Offending particle indices per problem kind. In release builds this
/// is the way invariant violations surface; the caller typically
/// halves the time step and retries.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticsReport {
    pub offenders: Vec<(DiagnosticsId, Vec<usize>)>,
}

impl DiagnosticsReport {
    pub fn is_empty(&self) -> bool {
        self.offenders.is_empty()
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, indices) in &self.offenders {
            write!(f, "{:?}: {} particles (first: ", id, indices.len())?;
            for index in indices.iter().take(5) {
                write!(f, "{} ", index)?;
            }
            write!(f, "); ")?;
        }
        Ok(())
    }
}

/// A single integrity check over the storage.
pub trait Diagnostic: Send + Sync {
    fn check(&self, scheduler: &Scheduler, storage: &Storage)
        -> Option<(DiagnosticsId, Vec<usize>)>;
}

/// Finds non-finite values in any buffer of any quantity.
pub struct FiniteValuesDiagnostic;

impl Diagnostic for FiniteValuesDiagnostic {
    fn check(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
    ) -> Option<(DiagnosticsId, Vec<usize>)> {
        let mut offenders = vec![];
        for (_, quantity) in storage.quantities() {
            for level in 0..=quantity.order().as_u8() as usize {
                let Some(buffer) = quantity.buffer(level) else {
                    continue;
                };
                match buffer {
                    BufferRef::Scalar(values) => {
                        collect_non_finite(values, |v| v.is_finite(), &mut offenders)
                    }
                    BufferRef::Vector(values) => {
                        collect_non_finite(values, |v| v.is_finite(), &mut offenders)
                    }
                    BufferRef::Tensor(values) => {
                        collect_non_finite(values, |v| v.is_finite(), &mut offenders)
                    }
                    BufferRef::SymTensor(values) => {
                        collect_non_finite(values, |v| v.is_finite(), &mut offenders)
                    }
                    BufferRef::TracelessTensor(values) => {
                        collect_non_finite(values, |v| v.is_finite(), &mut offenders)
                    }
                    BufferRef::Index(_) => {}
                }
            }
        }
        offenders.sort_unstable();
        offenders.dedup();
        if offenders.is_empty() {
            None
        } else {
            Some((DiagnosticsId::NonFiniteQuantity, offenders))
        }
    }
}

fn collect_non_finite<T>(values: &[T], finite: impl Fn(&T) -> bool, offenders: &mut Vec<usize>) {
    for (index, value) in values.iter().enumerate() {
        if !finite(value) {
            offenders.push(index);
        }
    }
}

/// Every live particle must keep a strictly positive smoothing length.
pub struct SmoothingLengthDiagnostic;

impl Diagnostic for SmoothingLengthDiagnostic {
    fn check(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
    ) -> Option<(DiagnosticsId, Vec<usize>)> {
        let offenders: Vec<usize> = storage
            .values::<Vector>(QuantityId::Position)
            .iter()
            .enumerate()
            .filter(|(_, r)| !(r.h() > 0.0))
            .map(|(index, _)| index)
            .collect();
        if offenders.is_empty() {
            None
        } else {
            Some((DiagnosticsId::NonPositiveSmoothingLength, offenders))
        }
    }
}

/// Damage and its evolved cube root both live in `[0, 1]`.
pub struct DamageRangeDiagnostic;

impl Diagnostic for DamageRangeDiagnostic {
    fn check(
        &self,
        _scheduler: &Scheduler,
        storage: &Storage,
    ) -> Option<(DiagnosticsId, Vec<usize>)> {
        let damage = storage.try_values::<Float>(QuantityId::Damage).ok()?;
        let offenders: Vec<usize> = damage
            .iter()
            .enumerate()
            .filter(|(_, &d)| !(0.0..=1.0).contains(&d))
            .map(|(index, _)| index)
            .collect();
        if offenders.is_empty() {
            None
        } else {
            Some((DiagnosticsId::DamageOutOfRange, offenders))
        }
    }
}

/// Reports particle pairs closer than `limit` times their mean
/// smoothing length (the pairing instability).
pub struct ParticlePairingDiagnostic {
    pub limit: Float,
}

impl Default for ParticlePairingDiagnostic {
    fn default() -> Self {
        Self { limit: 1.0e-2 }
    }
}

impl Diagnostic for ParticlePairingDiagnostic {
    fn check(
        &self,
        scheduler: &Scheduler,
        storage: &Storage,
    ) -> Option<(DiagnosticsId, Vec<usize>)> {
        let positions = storage.values::<Vector>(QuantityId::Position);
        let mut finder = KdTree::default();
        finder.build(scheduler, positions);
        let mut offenders = vec![];
        let mut neighs = vec![];
        for (i, pos) in positions.iter().enumerate() {
            finder.find_lower_rank(i, self.limit * pos.h(), &mut neighs);
            for neigh in &neighs {
                let h_bar = 0.5 * (pos.h() + positions[neigh.index].h());
                if neigh.dist_sqr < (self.limit * h_bar).powi(2) {
                    offenders.push(i);
                    offenders.push(neigh.index);
                }
            }
        }
        offenders.sort_unstable();
        offenders.dedup();
        if offenders.is_empty() {
            None
        } else {
            Some((DiagnosticsId::ParticlePairing, offenders))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OrderEnum;
    use crate::test_utils::gas_lattice_storage;

    #[test]
    fn finite_diagnostic_finds_the_broken_particle() {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage.values_mut::<Float>(QuantityId::Density)[17] = Float::NAN;
        let (id, offenders) = FiniteValuesDiagnostic
            .check(&Scheduler::sequential(), &storage)
            .unwrap();
        assert_eq!(id, DiagnosticsId::NonFiniteQuantity);
        assert_eq!(offenders, vec![17]);
    }

    #[test]
    fn healthy_storage_passes_all_checks() {
        let mut storage = gas_lattice_storage(2, 1.0);
        storage
            .insert(QuantityId::Damage, OrderEnum::First, 0.5)
            .unwrap();
        let scheduler = Scheduler::sequential();
        assert!(FiniteValuesDiagnostic.check(&scheduler, &storage).is_none());
        assert!(SmoothingLengthDiagnostic
            .check(&scheduler, &storage)
            .is_none());
        assert!(DamageRangeDiagnostic.check(&scheduler, &storage).is_none());
        assert!(ParticlePairingDiagnostic::default()
            .check(&scheduler, &storage)
            .is_none());
    }

    #[test]
    fn pairing_diagnostic_reports_overlapping_particles() {
        let mut storage = gas_lattice_storage(2, 1.0);
        let positions = storage.values_mut::<Vector>(QuantityId::Position);
        let mut merged = positions[0];
        merged[0] += 1.0e-5;
        positions[1] = merged;
        let (id, offenders) = ParticlePairingDiagnostic::default()
            .check(&Scheduler::sequential(), &storage)
            .unwrap();
        assert_eq!(id, DiagnosticsId::ParticlePairing);
        assert_eq!(offenders, vec![0, 1]);
    }
}
