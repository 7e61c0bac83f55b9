//! Excellon drill file parser

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use geo::{Coord, Point};
use pcbcam_core::{ParseError, Units};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::error::CamResult;
use crate::geometry::{circle, Axis, Geom, DEFAULT_CIRCLE_STEPS};

/// Which zeros are kept in fixed-point coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zeros {
    /// Leading zeros kept, trailing zeros may be dropped.
    #[default]
    L,
    /// Trailing zeros kept.
    T,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub diameter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drill {
    pub point: Coord<f64>,
    pub tool: String,
}

/// A parsed drill file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Excellon {
    pub units: Units,
    pub tools: BTreeMap<String, Tool>,
    pub drills: Vec<Drill>,
    pub zeros: Zeros,
    pub solid_geometry: Geom,
}

struct Patterns {
    header_begin: Regex,
    header_end: Regex,
    units: Regex,
    tool_set: Regex,
    tool_diameter: Regex,
    tool_select: Regex,
    comment: Regex,
    absolute: Regex,
    modes: Regex,
    measure: Regex,
    stop: Regex,
    coord_x_period: Regex,
    coord_y_period: Regex,
    coord_x: Regex,
    coord_y: Regex,
    leading_zeros: Regex,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid regex pattern")
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        header_begin: re(r"^M48$"),
        header_end: re(r"^(?:M95|%)$"),
        units: re(r"^(INCH|METRIC)(?:,([TL])Z)?$"),
        tool_set: re(r"^T(\d+)[CFSBHTZ]"),
        tool_diameter: re(r"C(\d*\.?\d*)"),
        tool_select: re(r"^T(\d+)"),
        comment: re(r"^;(.*)$"),
        absolute: re(r"^G9([01])$"),
        modes: re(r"^G0([012345])"),
        measure: re(r"^M7([12])$"),
        stop: re(r"^(?:G04|M09|M06|M00|M30)"),
        coord_x_period: re(r"X([-\+]?\d*\.\d*)"),
        coord_y_period: re(r"Y([-\+]?\d*\.\d*)"),
        coord_x: re(r"X([-\+]?\d*)"),
        coord_y: re(r"Y([-\+]?\d*)"),
        leading_zeros: re(r"^[-\+]?(0*)(\d*)"),
    })
}

/// Tool number normalised by integer round trip.
fn tool_id(text: &str) -> Result<String, String> {
    text.parse::<u64>()
        .map(|n| n.to_string())
        .map_err(|_| format!("invalid tool number {:?}", text))
}

fn diameter(text: &str) -> Result<f64, String> {
    text.parse::<f64>()
        .map_err(|_| format!("invalid tool diameter {:?}", text))
}

impl Excellon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zeros(zeros: Zeros) -> Self {
        Self {
            zeros,
            ..Self::default()
        }
    }

    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> CamResult<()> {
        let text = std::fs::read_to_string(path.as_ref())?;
        info!("Parsing Excellon {}", path.as_ref().display());
        self.parse_lines(text.lines())
    }

    pub fn parse_str(&mut self, text: &str) -> CamResult<()> {
        self.parse_lines(text.lines())
    }

    /// Parse drill file lines and rebuild the geometry.
    pub fn parse_lines<I, S>(&mut self, lines: I) -> CamResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current_tool = String::new();
        let mut in_header = false;
        let mut current_x: Option<f64> = None;
        let mut current_y: Option<f64> = None;
        let mut line_num = 0;

        for raw in lines {
            line_num += 1;
            let eline = raw.as_ref().trim_matches(|c| c == ' ' || c == '\r' || c == '\n');
            if eline.is_empty() {
                continue;
            }
            let result = self.parse_line(
                eline,
                &mut in_header,
                &mut current_tool,
                &mut current_x,
                &mut current_y,
            );
            if let Err(reason) = result {
                error!("PARSING FAILED. Line {}: {}", line_num, eline);
                return Err(ParseError::Excellon {
                    line: line_num,
                    text: eline.to_string(),
                    reason,
                }
                .into());
            }
        }

        info!("Zeros: {:?}, Units {}.", self.zeros, self.units);
        self.create_geometry();
        Ok(())
    }

    fn parse_line(
        &mut self,
        eline: &str,
        in_header: &mut bool,
        current_tool: &mut String,
        current_x: &mut Option<f64>,
        current_y: &mut Option<f64>,
    ) -> Result<(), String> {
        let p = patterns();

        if p.header_begin.is_match(eline) {
            *in_header = true;
            return Ok(());
        }
        if p.header_end.is_match(eline) {
            *in_header = false;
            return Ok(());
        }

        // Meant for the body, but some tools put it in the header.
        if let Some(c) = p.measure.captures(eline) {
            let units = if &c[1] == "1" { Units::Mm } else { Units::In };
            self.convert_units(units);
            debug!("  Units: {}", self.units);
            return Ok(());
        }

        if p.comment.is_match(eline) {
            return Ok(());
        }

        if !*in_header {
            if let Some(c) = p.tool_select.captures(eline) {
                let id = tool_id(&c[1])?;
                if let Some(d) = p.tool_diameter.captures(eline) {
                    let dia = diameter(&d[1])?;
                    debug!("Tool definition in body: {} {}", id, dia);
                    self.tools.insert(id.clone(), Tool { diameter: dia });
                }
                debug!("Tool change: {}", id);
                *current_tool = id;
                return Ok(());
            }

            if eline.contains('X') || eline.contains('Y') {
                let (x, y) = if eline.contains('.') {
                    (
                        self.literal(&p.coord_x_period, eline)?,
                        self.literal(&p.coord_y_period, eline)?,
                    )
                } else {
                    (
                        self.fixed_point(&p.coord_x, eline)?,
                        self.fixed_point(&p.coord_y, eline)?,
                    )
                };
                if x.is_some() {
                    *current_x = x;
                }
                if y.is_some() {
                    *current_y = y;
                }
                let (Some(x), Some(y)) = (*current_x, *current_y) else {
                    error!("Missing coordinates: {}", eline);
                    return Ok(());
                };
                self.drills.push(Drill {
                    point: Coord { x, y },
                    tool: current_tool.clone(),
                });
                debug!("{:15} {:8} {:8}", eline, x, y);
                return Ok(());
            }

            if p.absolute.is_match(eline) || p.modes.is_match(eline) || p.stop.is_match(eline) {
                return Ok(());
            }
        } else {
            if let Some(c) = p.tool_set.captures(eline) {
                let id = tool_id(&c[1])?;
                match p.tool_diameter.captures(eline) {
                    Some(d) => {
                        let dia = diameter(&d[1])?;
                        debug!("  Tool definition: {} {}", id, dia);
                        self.tools.insert(id, Tool { diameter: dia });
                    }
                    None => warn!("Tool {} defined without a diameter", id),
                }
                return Ok(());
            }

            if let Some(c) = p.units.captures(eline) {
                if let Some(z) = c.get(2) {
                    self.zeros = if z.as_str() == "T" { Zeros::T } else { Zeros::L };
                }
                let units = if &c[1] == "INCH" { Units::In } else { Units::Mm };
                self.convert_units(units);
                debug!("  Units/Format: {} {:?}", self.units, self.zeros);
                return Ok(());
            }
        }

        warn!("Line ignored: {}", eline);
        Ok(())
    }

    fn literal(&self, re: &Regex, line: &str) -> Result<Option<f64>, String> {
        match re.captures(line) {
            Some(c) => c[1]
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("invalid coordinate {:?}", &c[1])),
            None => Ok(None),
        }
    }

    fn fixed_point(&self, re: &Regex, line: &str) -> Result<Option<f64>, String> {
        match re.captures(line) {
            Some(c) if c[1].chars().any(|ch| ch.is_ascii_digit()) => self.parse_number(&c[1]).map(Some),
            _ => Ok(None),
        }
    }

    /// Decode a coordinate written without a decimal point.
    pub fn parse_number(&self, number: &str) -> Result<f64, String> {
        let value = number
            .parse::<f64>()
            .map_err(|_| format!("invalid coordinate {:?}", number))?;
        let divisor = match self.zeros {
            Zeros::L => {
                let c = patterns()
                    .leading_zeros
                    .captures(number)
                    .ok_or_else(|| format!("invalid coordinate {:?}", number))?;
                let digits = (c[1].len() + c[2].len()) as i32;
                let shift = match self.units {
                    Units::In => 2,
                    Units::Mm => 3,
                };
                10f64.powi(digits - shift)
            }
            Zeros::T => match self.units {
                Units::In => 10000.0,
                Units::Mm => 1000.0,
            },
        };
        Ok(value / divisor)
    }

    /// Rebuild `solid_geometry` as one circle per drill.
    pub fn create_geometry(&mut self) {
        let mut shapes = Vec::with_capacity(self.drills.len());
        for drill in &self.drills {
            match self.tools.get(&drill.tool) {
                Some(tool) => shapes.push(Geom::Polygon(circle(
                    drill.point,
                    tool.diameter / 2.0,
                    DEFAULT_CIRCLE_STEPS,
                ))),
                None => warn!("Drill at ({}, {}) uses undefined tool {:?}", drill.point.x, drill.point.y, drill.tool),
            }
        }
        self.solid_geometry = Geom::Collection(shapes);
    }

    /// Drill points of one tool, in file order.
    pub fn points_for_tool(&self, tool: &str) -> Vec<Point<f64>> {
        self.drills
            .iter()
            .filter(|d| d.tool == tool)
            .map(|d| Point::from(d.point))
            .collect()
    }

    fn transform_points(&mut self, f: impl Fn(Coord<f64>) -> Coord<f64>) {
        for drill in &mut self.drills {
            drill.point = f(drill.point);
        }
        self.create_geometry();
    }
}

impl Document for Excellon {
    fn kind(&self) -> &'static str {
        "excellon"
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
        self.transform_points(|c| Coord {
            x: c.x * factor,
            y: c.y * factor,
        });
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.transform_points(|c| Coord {
            x: c.x + dx,
            y: c.y + dy,
        });
    }

    fn mirror(&mut self, axis: Axis, point: Coord<f64>) {
        let (xs, ys) = match axis {
            Axis::X => (1.0, -1.0),
            Axis::Y => (-1.0, 1.0),
        };
        self.transform_points(|c| Coord {
            x: point.x + (c.x - point.x) * xs,
            y: point.y + (c.y - point.y) * ys,
        });
    }

    /// Tool diameters follow the coordinates.
    fn convert_units(&mut self, units: Units) -> f64 {
        if self.units == units {
            return 1.0;
        }
        let factor = self.units.conversion_factor(units);
        self.units = units;
        for tool in self.tools.values_mut() {
            tool.diameter *= factor;
        }
        self.scale(factor);
        factor
    }
}
