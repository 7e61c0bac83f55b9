//! CNC jobs: G-Code generation from geometry and drills, and parsing of
//! G-Code back into toolpath geometry.

mod generate;
mod parse;

use geo::{Coord, LineString};
use pcbcam_core::Units;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::geometry::{Axis, Geom};

pub use generate::{printf, LinearMove};
pub use parse::codes_split;

/// Motion class of a parsed toolpath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Motion {
    /// Tool above the work (`T`).
    Travel,
    /// Tool at or below the surface (`C`).
    Cut,
}

/// Feed class of a parsed toolpath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speed {
    /// Rapid move (`F`).
    Fast,
    /// Feed-rate move (`S`).
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathKind {
    pub motion: Motion,
    pub speed: Speed,
}

impl PathKind {
    /// Two-letter tag such as `"CF"` or `"TS"`.
    pub fn tag(&self) -> String {
        let m = match self.motion {
            Motion::Travel => 'T',
            Motion::Cut => 'C',
        };
        let s = match self.speed {
            Speed::Fast => 'F',
            Speed::Slow => 'S',
        };
        format!("{}{}", m, s)
    }
}

impl Default for PathKind {
    fn default() -> Self {
        Self {
            motion: Motion::Cut,
            speed: Speed::Fast,
        }
    }
}

/// One segment of parsed G-Code between height changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPath {
    pub path: LineString<f64>,
    pub kind: PathKind,
}

/// A machining job and its G-Code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CncJob {
    pub units: Units,
    pub solid_geometry: Geom,
    pub kind: String,
    pub z_cut: f64,
    pub z_move: f64,
    pub feedrate: f64,
    pub tooldia: f64,
    pub zdownrate: Option<f64>,
    pub spindlespeed: Option<f64>,
    /// printf-style template with two `%.Nf` slots for X and Y.
    pub coordinate_format: String,
    /// Segments per full circle when parsing arcs.
    pub steps_per_circle: usize,
    pub gcode: String,
    pub gcode_parsed: Vec<ParsedPath>,
    pub input_geometry_bounds: Option<(f64, f64, f64, f64)>,
}

impl Default for CncJob {
    fn default() -> Self {
        Self {
            units: Units::In,
            solid_geometry: Geom::default(),
            kind: "generic".to_string(),
            z_cut: -0.002,
            z_move: 0.1,
            feedrate: 3.0,
            tooldia: 0.0,
            zdownrate: None,
            spindlespeed: None,
            coordinate_format: "X%.4fY%.4f".to_string(),
            steps_per_circle: 20,
            gcode: String::new(),
            gcode_parsed: Vec::new(),
            input_geometry_bounds: None,
        }
    }
}

impl CncJob {
    pub fn new(units: Units) -> Self {
        Self {
            units,
            ..Self::default()
        }
    }

    /// `solid_geometry` becomes the parsed toolpaths.
    pub fn create_geometry(&mut self) {
        self.solid_geometry = Geom::Collection(
            self.gcode_parsed
                .iter()
                .map(|p| Geom::LineString(p.path.clone()))
                .collect(),
        );
    }

    fn transform_paths(&mut self, f: impl Fn(Coord<f64>) -> Coord<f64> + Copy) {
        for parsed in &mut self.gcode_parsed {
            for c in parsed.path.0.iter_mut() {
                *c = f(*c);
            }
        }
        self.create_geometry();
    }
}

impl Document for CncJob {
    fn kind(&self) -> &'static str {
        "cncjob"
    }

    fn units(&self) -> Units {
        self.units
    }

    fn set_units(&mut self, units: Units) {
        self.units = units;
    }

    fn solid_geometry(&self) -> &Geom {
        &self.solid_geometry
    }

    fn scale(&mut self, factor: f64) {
        self.transform_paths(|c| Coord {
            x: c.x * factor,
            y: c.y * factor,
        });
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.transform_paths(|c| Coord {
            x: c.x + dx,
            y: c.y + dy,
        });
    }

    fn mirror(&mut self, axis: Axis, point: Coord<f64>) {
        let (xs, ys) = match axis {
            Axis::X => (1.0, -1.0),
            Axis::Y => (-1.0, 1.0),
        };
        self.transform_paths(|c| Coord {
            x: point.x + (c.x - point.x) * xs,
            y: point.y + (c.y - point.y) * ys,
        });
    }

    /// Machining depths, feed rate and tool diameter follow the units.
    fn convert_units(&mut self, units: Units) -> f64 {
        if self.units == units {
            return 1.0;
        }
        let factor = self.units.conversion_factor(units);
        self.units = units;
        self.scale(factor);
        self.z_cut *= factor;
        self.z_move *= factor;
        self.feedrate *= factor;
        self.tooldia *= factor;
        factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(PathKind::default().tag(), "CF");
        let travel = PathKind {
            motion: Motion::Travel,
            speed: Speed::Slow,
        };
        assert_eq!(travel.tag(), "TS");
    }

    #[test]
    fn test_convert_units_scales_machining_values() {
        let mut job = CncJob::default();
        job.gcode_parsed.push(ParsedPath {
            path: LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
            kind: PathKind::default(),
        });
        assert_eq!(job.convert_units(Units::In), 1.0);
        assert_eq!(job.convert_units(Units::Mm), 25.4);
        assert!((job.z_move - 2.54).abs() < 1e-12);
        assert!((job.feedrate - 76.2).abs() < 1e-9);
        assert_eq!(job.bounds(), (0.0, 0.0, 25.4, 25.4));
    }

    #[test]
    fn test_offset_rebuilds_geometry() {
        let mut job = CncJob::default();
        job.gcode_parsed.push(ParsedPath {
            path: LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
            kind: PathKind::default(),
        });
        job.offset(1.0, 2.0);
        assert_eq!(job.bounds(), (1.0, 2.0, 2.0, 2.0));
    }
}
