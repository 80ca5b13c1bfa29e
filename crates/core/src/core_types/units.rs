//! Semantic unit types for the quantities that cross the configuration and
//! registration boundary.
//!
//! Inside the hot loops everything is plain `f32`; these newtypes keep
//! distances, masses and densities from being swapped at the API surface.
//!
//! # Usage
//! ```
//! use tree_fire_core::core_types::units::{KgPerCubicMeter, Kilograms, Meters};
//!
//! let radius = Meters::new(0.2);
//! let density = KgPerCubicMeter::new(800.0);
//! let mass = Kilograms::new(12.5);
//! assert!(*radius > 0.0 && *density > 0.0 && *mass > 0.0);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Deref, Mul, SubAssign};

/// Compare f32 values with total ordering (NaN sorts above every number)
#[inline]
fn f32_total_cmp(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}

// ============================================================================
// DISTANCE
// ============================================================================

/// Distance in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Meters(f32);

impl Eq for Meters {}

impl PartialOrd for Meters {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Meters {
    fn cmp(&self, other: &Self) -> Ordering {
        f32_total_cmp(self.0, other.0)
    }
}

impl Deref for Meters {
    type Target = f32;
    #[inline]
    fn deref(&self) -> &f32 {
        &self.0
    }
}

impl Meters {
    /// Create a new distance in meters
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn new(value: f32) -> Self {
        assert!(value >= 0.0, "Meters::new: negative distance is invalid");
        Meters(value)
    }

    /// Get the raw f32 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for Meters {
    fn from(v: f32) -> Self {
        Meters(v)
    }
}

impl From<Meters> for f32 {
    fn from(m: Meters) -> f32 {
        m.0
    }
}

impl fmt::Display for Meters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} m", self.0)
    }
}

impl Mul<f32> for Meters {
    type Output = Meters;
    fn mul(self, rhs: f32) -> Meters {
        Meters(self.0 * rhs)
    }
}

// ============================================================================
// MASS
// ============================================================================

/// Mass in kilograms
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilograms(f32);

impl Eq for Kilograms {}

impl PartialOrd for Kilograms {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Kilograms {
    fn cmp(&self, other: &Self) -> Ordering {
        f32_total_cmp(self.0, other.0)
    }
}

impl Deref for Kilograms {
    type Target = f32;
    #[inline]
    fn deref(&self) -> &f32 {
        &self.0
    }
}

impl Kilograms {
    /// Create a new mass in kilograms. Asserts value >= 0 (non-negative mass).
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn new(value: f32) -> Self {
        assert!(value >= 0.0, "Kilograms::new: negative mass is invalid");
        Kilograms(value)
    }

    /// Get the raw f32 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for Kilograms {
    fn from(v: f32) -> Self {
        Kilograms(v)
    }
}

impl From<Kilograms> for f32 {
    fn from(k: Kilograms) -> f32 {
        k.0
    }
}

impl fmt::Display for Kilograms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} kg", self.0)
    }
}

impl Add for Kilograms {
    type Output = Kilograms;
    fn add(self, rhs: Kilograms) -> Kilograms {
        Kilograms(self.0 + rhs.0)
    }
}

impl SubAssign<f32> for Kilograms {
    fn sub_assign(&mut self, rhs: f32) {
        // Consumption - clamp to 0 since mass can't be negative
        self.0 = (self.0 - rhs).max(0.0);
    }
}

impl Mul<f32> for Kilograms {
    type Output = Kilograms;
    fn mul(self, rhs: f32) -> Kilograms {
        Kilograms(self.0 * rhs)
    }
}

// ============================================================================
// DENSITY
// ============================================================================

/// Density in kg/m³
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct KgPerCubicMeter(f32);

impl Eq for KgPerCubicMeter {}

impl PartialOrd for KgPerCubicMeter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KgPerCubicMeter {
    fn cmp(&self, other: &Self) -> Ordering {
        f32_total_cmp(self.0, other.0)
    }
}

impl Deref for KgPerCubicMeter {
    type Target = f32;
    #[inline]
    fn deref(&self) -> &f32 {
        &self.0
    }
}

impl KgPerCubicMeter {
    /// Typical seasoned hardwood
    pub const HARDWOOD: KgPerCubicMeter = KgPerCubicMeter(800.0);

    /// Density of air at sea level, 15°C
    pub const AIR_SEA_LEVEL: KgPerCubicMeter = KgPerCubicMeter(1.225);

    /// Create a new density. Asserts value >= 0 (non-negative density).
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn new(value: f32) -> Self {
        assert!(
            value >= 0.0,
            "KgPerCubicMeter::new: negative density is invalid"
        );
        KgPerCubicMeter(value)
    }

    /// Get the raw f32 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for KgPerCubicMeter {
    fn from(v: f32) -> Self {
        KgPerCubicMeter(v)
    }
}

impl From<KgPerCubicMeter> for f32 {
    fn from(d: KgPerCubicMeter) -> f32 {
        d.0
    }
}

impl fmt::Display for KgPerCubicMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} kg/m³", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_consumption_clamps_at_zero() {
        let mut mass = Kilograms::new(1.0);
        mass -= 0.4;
        assert!((*mass - 0.6).abs() < 1e-6);
        mass -= 5.0;
        assert_eq!(*mass, 0.0);
    }

    #[test]
    fn test_total_ordering() {
        let a = Meters::new(1.0);
        let b = Meters::new(2.0);
        assert_eq!(a.max(b), b);
        assert!(KgPerCubicMeter::AIR_SEA_LEVEL < KgPerCubicMeter::HARDWOOD);
    }

    #[test]
    #[should_panic(expected = "negative distance")]
    fn test_negative_distance_rejected() {
        let _ = Meters::new(-1.0);
    }
}
