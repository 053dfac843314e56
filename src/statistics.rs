use std::collections::BTreeMap;

use crate::prelude::Float;

/// Aggregate of a per-particle quantity observed during a step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MinMaxMean {
    min: Float,
    max: Float,
    sum: Float,
    count: usize,
}

impl MinMaxMean {
    pub fn new() -> Self {
        Self {
            min: Float::INFINITY,
            max: Float::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    pub fn accumulate(&mut self, value: Float) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &MinMaxMean) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn min(&self) -> Float {
        self.min
    }

    pub fn max(&self) -> Float {
        self.max
    }

    pub fn mean(&self) -> Float {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as Float
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Key of a run statistic published by the solver or the stepper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatisticsId {
    /// Current time step.
    Timestep,
    /// Which criterion limited the time step.
    LimitingCriterion,
    /// Neighbor counts of the last derivative loop.
    NeighborCount,
    /// Number of particles evaluated.
    ParticleCount,
    /// Number of tree nodes accepted as multipoles.
    GravityNodesApproximated,
    /// Number of particle-particle gravity interactions.
    GravityNodesExact,
    /// Number of step retries after a diagnostics failure.
    TimestepRetries,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatisticsValue {
    Int(i64),
    Float(Float),
    Means(MinMaxMean),
    Text(String),
}

/// Typed map of run statistics; written by the solver and the
/// time-stepping, read by loggers and callbacks.
#[derive(Clone, Debug, Default)]
pub struct Statistics {
    entries: BTreeMap<StatisticsId, StatisticsValue>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: StatisticsId, value: StatisticsValue) {
        self.entries.insert(id, value);
    }

    pub fn set_int(&mut self, id: StatisticsId, value: i64) {
        self.set(id, StatisticsValue::Int(value));
    }

    pub fn set_float(&mut self, id: StatisticsId, value: Float) {
        self.set(id, StatisticsValue::Float(value));
    }

    pub fn increment(&mut self, id: StatisticsId, amount: i64) {
        match self.entries.get_mut(&id) {
            Some(StatisticsValue::Int(value)) => *value += amount,
            _ => self.set_int(id, amount),
        }
    }

    pub fn get(&self, id: StatisticsId) -> Option<&StatisticsValue> {
        self.entries.get(&id)
    }

    pub fn get_int(&self, id: StatisticsId) -> Option<i64> {
        match self.entries.get(&id) {
            Some(StatisticsValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_float(&self, id: StatisticsId) -> Option<Float> {
        match self.entries.get(&id) {
            Some(StatisticsValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_means(&self, id: StatisticsId) -> Option<MinMaxMean> {
        match self.entries.get(&id) {
            Some(StatisticsValue::Means(value)) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn means_aggregate() {
        let mut means = MinMaxMean::new();
        for value in [1.0, 2.0, 6.0] {
            means.accumulate(value);
        }
        assert_eq!(means.min(), 1.0);
        assert_eq!(means.max(), 6.0);
        assert_eq!(means.mean(), 3.0);

        let mut other = MinMaxMean::new();
        other.accumulate(0.0);
        means.merge(&other);
        assert_eq!(means.min(), 0.0);
        assert_eq!(means.count(), 4);
    }

    #[test]
    fn increment_starts_from_zero() {
        let mut stats = Statistics::new();
        stats.increment(StatisticsId::TimestepRetries, 1);
        stats.increment(StatisticsId::TimestepRetries, 2);
        assert_eq!(stats.get_int(StatisticsId::TimestepRetries), Some(3));
    }
}
