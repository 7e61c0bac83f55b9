//! Error types for the CAM library.
//!
//! Parse, geometry and I/O failures come from `pcbcam_core`; this module
//! adds parameter validation for CAM operations.

use pcbcam_core::{GeometryError, ParseError};
use std::io;
use thiserror::Error;

/// Errors that can occur during CAM operations.
#[derive(Error, Debug)]
pub enum CamError {
    /// Parse, geometry, project or I/O failure.
    #[error(transparent)]
    Core(#[from] pcbcam_core::Error),

    /// A parameter validation error occurred.
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),
}

impl From<ParseError> for CamError {
    fn from(e: ParseError) -> Self {
        CamError::Core(e.into())
    }
}

impl From<GeometryError> for CamError {
    fn from(e: GeometryError) -> Self {
        CamError::Core(e.into())
    }
}

impl From<io::Error> for CamError {
    fn from(e: io::Error) -> Self {
        CamError::Core(e.into())
    }
}

impl From<serde_json::Error> for CamError {
    fn from(e: serde_json::Error) -> Self {
        CamError::Core(e.into())
    }
}

impl CamError {
    /// True for Gerber/Excellon/macro parse failures
    pub fn is_parse_error(&self) -> bool {
        matches!(self, CamError::Core(e) if e.is_parse_error())
    }

    /// True for geometric failures
    pub fn is_geometry_error(&self) -> bool {
        matches!(self, CamError::Core(e) if e.is_geometry_error())
    }
}

/// Errors related to CAM parameter validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// A required parameter is missing.
    #[error("Missing required parameter: {0}")]
    Missing(String),

    /// A parameter value is out of the valid range.
    #[error("Parameter '{name}' out of range: {value} (valid: {min}..{max})")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A parameter value is invalid.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },
}

impl ParameterError {
    /// Fails unless `value > 0`.
    pub fn require_positive(name: &str, value: f64) -> Result<(), ParameterError> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(ParameterError::OutOfRange {
                name: name.to_string(),
                value,
                min: 0.0,
                max: f64::INFINITY,
            })
        }
    }

    /// Fails unless `min <= value < max`.
    pub fn require_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ParameterError> {
        if value >= min && value < max {
            Ok(())
        } else {
            Err(ParameterError::OutOfRange {
                name: name.to_string(),
                value,
                min,
                max,
            })
        }
    }
}

/// Result type alias for CAM operations.
pub type CamResult<T> = Result<T, CamError>;
