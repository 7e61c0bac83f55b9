//! Error handling for PcbCam
//!
//! Provides the error types shared by every layer of the pipeline:
//! - Parse errors (Gerber, Excellon, aperture macros, expressions)
//! - Geometry errors (offsetting, boolean operations, lookups)
//! - Project errors (object collection, promises)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Parse error type
///
/// A fatal failure while decoding one of the supported text formats.
/// Line numbers are 1-based.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Gerber line could not be processed
    #[error("Line {line}: {text} ({reason})")]
    Gerber {
        /// The line number where parsing failed.
        line: usize,
        /// The offending line.
        text: String,
        /// What went wrong.
        reason: String,
    },

    /// Excellon line could not be processed
    #[error("Line {line}: {text} ({reason})")]
    Excellon {
        /// The line number where parsing failed.
        line: usize,
        /// The offending line.
        text: String,
        /// What went wrong.
        reason: String,
    },

    /// Aperture macro evaluation failed
    #[error("Aperture macro {macro_name}: {reason}")]
    ApertureMacro {
        /// Name of the macro.
        macro_name: String,
        /// What went wrong.
        reason: String,
    },

    /// Arithmetic expression could not be evaluated
    #[error("Invalid expression '{expression}': {reason}")]
    Expression {
        /// The expression text after substitution.
        expression: String,
        /// What went wrong.
        reason: String,
    },

    /// Numeric field could not be decoded
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
}

/// Geometry error type
///
/// Failures of geometric operations, scoped to the object being generated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Operation needs geometry but there is none
    #[error("Geometry is empty")]
    EmptyGeometry,

    /// Polygon is invalid and could not be repaired
    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    /// Polygon offsetting failed
    #[error("Offset by {distance} failed: {reason}")]
    OffsetFailed {
        /// Requested offset distance.
        distance: f64,
        /// What went wrong.
        reason: String,
    },

    /// Geometry variant not supported by this operation
    #[error("Operation {operation} not supported for {kind}")]
    UnsupportedType {
        /// Operation name.
        operation: String,
        /// Geometry variant name.
        kind: String,
    },

    /// No polygon contains the given point
    #[error("No polygon found at ({x}, {y})")]
    NoPolygonAtPoint {
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
    },
}

/// Project error type
///
/// Failures of the object collection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectError {
    /// Named object does not exist
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Name is already taken
    #[error("Object name already in use: {0}")]
    DuplicateName(String),

    /// Promise was never registered
    #[error("No pending promise for: {0}")]
    PromiseNotFound(String),

    /// Object exists but is of another kind
    #[error("Object {name} is a {actual}, expected {expected}")]
    KindMismatch {
        /// Object name.
        name: String,
        /// Kind that was required.
        expected: String,
        /// Kind that was found.
        actual: String,
    },
}

/// Main error type for PcbCam
///
/// Wraps all error types for unified error handling.
#[derive(Error, Debug)]
pub enum Error {
    /// Parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Geometry error
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Project error
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    /// Check if this is a geometry error
    pub fn is_geometry_error(&self) -> bool {
        matches!(self, Error::Geometry(_))
    }

    /// Check if this is a project error
    pub fn is_project_error(&self) -> bool {
        matches!(self, Error::Project(_))
    }
}

/// Result type for PcbCam operations
pub type Result<T> = std::result::Result<T, Error>;
