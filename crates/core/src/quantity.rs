//! Pill quantities with half-tablet granularity.
//!
//! Amounts are stored as an integer number of **half-unit steps**, so every
//! representable quantity is an exact multiple of 0.5 and arithmetic stays
//! exact (no floating-point drift in the ledger's books). Floats only appear
//! at the boundary, when converting an untrusted vision estimate or a
//! caller-supplied delta.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A non-negative pill amount (whole tablets and half-tablets).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    /// A quantity of `units` whole tablets (saturating at the counter's cap).
    pub fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(2))
    }

    /// A quantity of `steps` half-tablets.
    pub fn from_half_steps(steps: u64) -> Self {
        Self(steps)
    }

    /// Convert from a unit count that must already be half-unit granular.
    ///
    /// Fails with `Validation` for negative or non-finite input and with
    /// `InvalidGranularity` when the value is not a multiple of 0.5.
    pub fn try_from_units(units: f64) -> DomainResult<Self> {
        let steps = half_steps_exact(units)?;
        Ok(Self(steps))
    }

    /// Convert from an untrusted unit count, rounding to the nearest 0.5.
    ///
    /// This is the entry point for vision estimates; negative or non-finite
    /// input still fails with `Validation`.
    pub fn from_units_rounded(units: f64) -> DomainResult<Self> {
        ensure_countable(units)?;
        Ok(Self((units * 2.0).round() as u64))
    }

    /// Number of half-unit steps (exact internal representation).
    pub fn half_steps(&self) -> u64 {
        self.0
    }

    /// Unit count as a float, for display and serialization.
    pub fn as_units(&self) -> f64 {
        self.0 as f64 / 2.0
    }

    /// True when the amount has no half-tablet remainder.
    pub fn is_whole(&self) -> bool {
        self.0 % 2 == 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// Apply a signed delta, failing when the result would be negative.
    pub fn checked_apply(self, delta: UnitDelta) -> Option<Quantity> {
        let steps = (self.0 as i64).checked_add(delta.half_steps())?;
        if steps < 0 {
            return None;
        }
        Some(Quantity(steps as u64))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_whole() {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{:.1}", self.as_units())
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_units())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let units = f64::deserialize(deserializer)?;
        Quantity::try_from_units(units).map_err(D::Error::custom)
    }
}

impl ValueObject for Quantity {}

/// A signed pill amount, used for manual loose-unit adjustments.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitDelta(i64);

impl UnitDelta {
    pub const ZERO: UnitDelta = UnitDelta(0);

    /// A delta of `units` whole tablets (negative to remove), saturating at
    /// the counter's cap.
    pub fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(2))
    }

    /// A delta of `steps` half-tablets (negative to remove).
    pub fn from_half_steps(steps: i64) -> Self {
        Self(steps)
    }

    /// Convert from a unit count that must be half-unit granular.
    pub fn try_from_units(units: f64) -> DomainResult<Self> {
        if !units.is_finite() {
            return Err(DomainError::validation(format!(
                "unit delta must be finite, got {units}"
            )));
        }
        let doubled = units * 2.0;
        if (doubled - doubled.round()).abs() > GRANULARITY_TOLERANCE {
            return Err(DomainError::granularity(format!(
                "unit delta must be a multiple of 0.5, got {units}"
            )));
        }
        Ok(Self(doubled.round() as i64))
    }

    pub fn half_steps(&self) -> i64 {
        self.0
    }

    pub fn as_units(&self) -> f64 {
        self.0 as f64 / 2.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl core::fmt::Display for UnitDelta {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{:.1}", self.as_units())
        }
    }
}

impl Serialize for UnitDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_units())
    }
}

impl<'de> Deserialize<'de> for UnitDelta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let units = f64::deserialize(deserializer)?;
        UnitDelta::try_from_units(units).map_err(D::Error::custom)
    }
}

impl ValueObject for UnitDelta {}

/// Tolerance for "is this float a half-unit multiple" checks. Large enough
/// to absorb binary representation noise, far below half a step.
const GRANULARITY_TOLERANCE: f64 = 1e-9;

fn ensure_countable(units: f64) -> DomainResult<()> {
    if !units.is_finite() {
        return Err(DomainError::validation(format!(
            "unit count must be finite, got {units}"
        )));
    }
    if units < 0.0 {
        return Err(DomainError::validation(format!(
            "unit count cannot be negative, got {units}"
        )));
    }
    Ok(())
}

fn half_steps_exact(units: f64) -> DomainResult<u64> {
    ensure_countable(units)?;
    let doubled = units * 2.0;
    if (doubled - doubled.round()).abs() > GRANULARITY_TOLERANCE {
        return Err(DomainError::granularity(format!(
            "unit count must be a multiple of 0.5, got {units}"
        )));
    }
    Ok(doubled.round() as u64)
}
