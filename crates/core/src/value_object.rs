//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects (immutable, compared by value).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Round to two decimal places (half away from zero).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A percentage on the 0–100 scale, stored with two-decimal precision.
///
/// Used for completion progress, per-submission scores, weighted final scores
/// and job-match percentages.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(f64);

impl ValueObject for Percentage {}

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.0);
    pub const FULL: Percentage = Percentage(100.0);

    /// Build from an arbitrary value: clamps to `[0, 100]` and rounds to two decimals.
    ///
    /// Non-finite input collapses to zero.
    pub fn clamped(value: f64) -> Self {
        if !value.is_finite() {
            return Self::ZERO;
        }
        Self(round2(value.clamp(0.0, 100.0)))
    }

    /// Build from a value that must already lie in `[0, 100]`.
    pub fn new(value: f64) -> DomainResult<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(DomainError::out_of_range("percentage", value, 0.0, 100.0));
        }
        Ok(Self(round2(value)))
    }

    /// `part / whole × 100`; zero when `whole` is zero.
    pub fn ratio(part: f64, whole: f64) -> Self {
        if whole <= 0.0 {
            return Self::ZERO;
        }
        Self::clamped(part / whole * 100.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_full(self) -> bool {
        self.0 >= 100.0
    }
}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ratio_with_empty_denominator_is_zero() {
        assert_eq!(Percentage::ratio(3.0, 0.0), Percentage::ZERO);
    }

    #[test]
    fn ratio_rounds_to_two_decimals() {
        assert_eq!(Percentage::ratio(1.0, 3.0).value(), 33.33);
        assert_eq!(Percentage::ratio(2.0, 3.0).value(), 66.67);
    }

    #[test]
    fn new_rejects_values_above_hundred() {
        assert!(matches!(
            Percentage::new(100.01),
            Err(DomainError::OutOfRange { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: clamped percentages always land in [0, 100].
        #[test]
        fn clamped_is_always_in_bounds(value in -1.0e6f64..1.0e6f64) {
            let p = Percentage::clamped(value);
            prop_assert!(p.value() >= 0.0);
            prop_assert!(p.value() <= 100.0);
        }
    }
}
