//! # Unit System
//!
//! The model declares its unit system once, at model scope. Every coordinate,
//! length, force and modulus stored in the registry is interpreted in that
//! system; nothing in this crate converts values on the way to the engine.
//!
//! ## Conventions
//!
//! - Default: SI (metres, newtons, pascals, kg/m³)
//! - Global frame: right-handed Cartesian, Z up, gravity along −Z
//! - Angles (element orientation β): degrees
//!
//! ## Example
//!
//! ```rust
//! use bridge_core::units::{ForceUnit, LengthUnit, UnitSystem};
//!
//! let units = UnitSystem::default();
//! assert_eq!(units.length, LengthUnit::Meter);
//! assert_eq!(units.force, ForceUnit::Newton);
//! assert_eq!(units.describe(), "m, N");
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

// ============================================================================
// Unit Declarations
// ============================================================================

/// Length unit for coordinates, positions and section dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    Meter,
    Millimeter,
}

impl LengthUnit {
    /// Short symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            LengthUnit::Meter => "m",
            LengthUnit::Millimeter => "mm",
        }
    }
}

/// Force unit for loads and spring stiffness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceUnit {
    #[default]
    Newton,
    Kilonewton,
}

impl ForceUnit {
    /// Short symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            ForceUnit::Newton => "N",
            ForceUnit::Kilonewton => "kN",
        }
    }
}

/// Unit system declared once per model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitSystem {
    #[serde(default)]
    pub length: LengthUnit,
    #[serde(default)]
    pub force: ForceUnit,
}

impl UnitSystem {
    /// Human-readable description, e.g. "m, N"
    pub fn describe(&self) -> String {
        format!("{}, {}", self.length.symbol(), self.force.symbol())
    }
}

// ============================================================================
// Vector Type
// ============================================================================

/// A 3-component vector in the global frame (position, force or moment)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length(&self) -> f64 {
        self.dot(*self).sqrt()
    }

    pub fn distance(&self, other: Vec3) -> f64 {
        (*self - other).length()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}
