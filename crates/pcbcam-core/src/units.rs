//! Unit handling
//!
//! Documents carry their coordinates in either inches or millimeters.
//! Switching units rescales coordinates in place by the factor returned
//! from [`Units::conversion_factor`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Document units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Units {
    /// Inches
    #[serde(rename = "IN")]
    In,
    /// Millimeters
    #[serde(rename = "MM")]
    Mm,
}

impl Default for Units {
    fn default() -> Self {
        Self::In
    }
}

impl Units {
    /// Factor that converts a length in `self` into `target`.
    ///
    /// Returns exactly `1.0` when the units already match.
    pub fn conversion_factor(self, target: Units) -> f64 {
        match (self, target) {
            (Units::In, Units::Mm) => MM_PER_INCH,
            (Units::Mm, Units::In) => 1.0 / MM_PER_INCH,
            _ => 1.0,
        }
    }

    /// G-Code unit selection word
    pub fn gcode(self) -> &'static str {
        match self {
            Units::In => "G20",
            Units::Mm => "G21",
        }
    }

    /// Upper-case tag as written in documents and project files
    pub fn as_str(self) -> &'static str {
        match self {
            Units::In => "IN",
            Units::Mm => "MM",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" | "INCH" | "G20" => Ok(Self::In),
            "MM" | "METRIC" | "G21" => Ok(Self::Mm),
            _ => Err(format!("Unknown units: {}", s)),
        }
    }
}
