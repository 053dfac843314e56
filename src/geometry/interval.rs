use serde::Deserialize;
use serde::Serialize;

use crate::prelude::Float;

/// Closed interval of floats, used as the allowed range of a quantity.
/// Values are clamped into their interval after every integrator step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    lower: Float,
    upper: Float,
}

impl Interval {
    pub const UNBOUNDED: Self = Self {
        lower: Float::NEG_INFINITY,
        upper: Float::INFINITY,
    };

    pub fn new(lower: Float, upper: Float) -> Self {
        assert!(lower <= upper);
        Self { lower, upper }
    }

    /// Interval bounded from below only.
    pub fn at_least(lower: Float) -> Self {
        Self {
            lower,
            upper: Float::INFINITY,
        }
    }

    pub fn lower(&self) -> Float {
        self.lower
    }

    pub fn upper(&self) -> Float {
        self.upper
    }

    pub fn size(&self) -> Float {
        self.upper - self.lower
    }

    pub fn center(&self) -> Float {
        0.5 * (self.lower + self.upper)
    }

    pub fn contains(&self, value: Float) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn clamp(&self, value: Float) -> Float {
        value.clamp(self.lower, self.upper)
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower == Float::NEG_INFINITY && self.upper == Float::INFINITY
    }

    pub fn extend(&mut self, value: Float) {
        self.lower = self.lower.min(value);
        self.upper = self.upper.max(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_and_contains() {
        let interval = Interval::new(0.0, 1.0);
        assert!(interval.contains(0.5));
        assert!(!interval.contains(1.5));
        assert_eq!(interval.clamp(1.5), 1.0);
        assert_eq!(interval.clamp(-0.5), 0.0);
    }

    #[test]
    fn unbounded_interval_never_clamps() {
        assert!(Interval::UNBOUNDED.contains(Float::MAX));
        assert_eq!(Interval::UNBOUNDED.clamp(-1.0e300), -1.0e300);
    }
}
