//! # PcbCam CAM Library
//!
//! Turns PCB fabrication data into machine code.
//!
//! ## Parsers
//!
//! - **Gerber**: RS-274X layers, including aperture macros and regions
//! - **Excellon**: drill files with tool tables
//!
//! ## Geometry
//!
//! - **Geometry kernel**: the [`Geom`] variant, offsetting, unions
//! - **Clearing**: shrink-and-trace and seed-based polygon painting
//! - **Spatial index**: nearest-endpoint lookup for path ordering
//!
//! ## Machining
//!
//! - **CNC jobs**: G-Code from geometry and drills, and back to geometry
//! - **Operations**: isolation, non-copper clearing, cutouts, drill milling

pub mod aperture;
pub mod aperture_macro;
pub mod cncjob;
pub mod document;
pub mod error;
pub mod excellon;
pub mod geometry;
pub mod gerber;
pub mod operations;
pub mod options;
pub mod spatial_index;

// Re-export commonly used items
pub use aperture::Aperture;
pub use aperture_macro::{eval_expression, ApertureMacro};
pub use cncjob::{codes_split, printf, CncJob, LinearMove, Motion, ParsedPath, PathKind, Speed};
pub use document::{Document, Geometry};
pub use error::{CamError, CamResult, ParameterError};
pub use excellon::{Drill, Excellon, Tool, Zeros};
pub use geometry::{Axis, Geom};
pub use gerber::{ArcTolerance, Gerber, UnionStrategy};
pub use operations::{
    bounding_box, cutout, excellon_to_cncjob, excellon_to_cncjob_with, follow, geometry_to_cncjob,
    geometry_to_cncjob_with, isolate, mill_drills, ncc, non_copper, paint,
};
pub use options::{CncJobOptions, ExcellonOptions, Gaps, GerberOptions, GeometryOptions, ObjectOptions, PaintMethod};
pub use spatial_index::{Endpoints, PathHandle, PathStorage, SpatialPointIndex};

pub use pcbcam_core::Units;
