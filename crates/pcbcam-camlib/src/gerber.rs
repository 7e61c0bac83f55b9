//! Gerber RS-274X parser
//!
//! [`Gerber::parse_lines`] walks the statements once, keeping the drawing
//! state in a [`ParseState`]. Strokes, flashes and regions collect in a
//! buffer that is merged into `solid_geometry` whenever the layer
//! polarity changes and at the end of input.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::Path;
use std::sync::OnceLock;

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use pcbcam_core::{ParseError, Units};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::aperture::{normalize_id, Aperture};
use crate::aperture_macro::ApertureMacro;
use crate::document::Document;
use crate::error::CamResult;
use crate::geometry::{
    arc, arc_angle, buffer, buffer_line, envelope, grow_rect, grow_shrink, repair, unary_union, ArcDirection,
    Axis, Geom,
};

/// Width of the grow/shrink pass that merges the buffered shapes.
const UNION_EPSILON: f64 = 1e-8;

/// How the shapes buffered between polarity changes are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnionStrategy {
    /// Union, then grow and shrink by a tiny distance to close hairline gaps.
    #[default]
    BufferGrowShrink,
    /// Union, then a zero-width repair.
    Exact,
}

/// Acceptance window for single-quadrant arc centres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcTolerance {
    /// Allowed relative difference between start and end radius.
    pub radius: f64,
    /// Slack on the quarter-turn sweep limit, in radians.
    pub sweep_epsilon: f64,
}

impl Default for ArcTolerance {
    fn default() -> Self {
        Self {
            radius: 0.05,
            sweep_epsilon: 1e-6,
        }
    }
}

/// A parsed Gerber layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gerber {
    pub units: Units,
    pub solid_geometry: Geom,
    pub int_digits: u32,
    pub frac_digits: u32,
    pub apertures: BTreeMap<String, Aperture>,
    pub aperture_macros: BTreeMap<String, ApertureMacro>,
    pub steps_per_circle: usize,
    pub union_strategy: UnionStrategy,
    pub arc_tolerance: ArcTolerance,
    /// Keep strokes as centre lines and drop flashes and regions.
    pub follow: bool,
}

impl Default for Gerber {
    fn default() -> Self {
        Self {
            units: Units::In,
            solid_geometry: Geom::MultiPolygon(MultiPolygon::new(vec![])),
            int_digits: 3,
            frac_digits: 4,
            apertures: BTreeMap::new(),
            aperture_macros: BTreeMap::new(),
            steps_per_circle: 40,
            union_strategy: UnionStrategy::default(),
            arc_tolerance: ArcTolerance::default(),
            follow: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Dark,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuadrantMode {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interpolation {
    Linear,
    Cw,
    Ccw,
}

impl Interpolation {
    fn from_code(code: &str) -> Option<Self> {
        match code.parse::<u8>().ok()? {
            1 => Some(Self::Linear),
            2 => Some(Self::Cw),
            3 => Some(Self::Ccw),
            _ => None,
        }
    }

    fn direction(self) -> Option<ArcDirection> {
        match self {
            Self::Linear => None,
            Self::Cw => Some(ArcDirection::Cw),
            Self::Ccw => Some(ArcDirection::Ccw),
        }
    }
}

struct Patterns {
    format: Regex,
    mode: Regex,
    comment: Regex,
    aperture_def: Regex,
    tool: Regex,
    linear: Regex,
    circular: Regex,
    opcode: Regex,
    interpolation: Regex,
    quadrant: Regex,
    region_on: Regex,
    region_off: Regex,
    eof: Regex,
    image_polarity: Regex,
    layer_polarity: Regex,
    units: Regex,
    absolute: Regex,
    macro_start: Regex,
    macro_end: Regex,
    coord_x: Regex,
    coord_y: Regex,
    coord_i: Regex,
    coord_j: Regex,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid regex pattern")
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        format: re(r"^%FS([LT])([AI])X(\d)(\d)Y\d\d\*%$"),
        mode: re(r"^%MO(IN|MM)\*%$"),
        comment: re(r"^G0?4(.*)$"),
        aperture_def: re(r"^%ADD(\d\d+)([a-zA-Z_$\.][a-zA-Z0-9_$\.\-]*)(?:,(.*))?\*%$"),
        tool: re(r"^(?:G54)?D(\d\d+)\*$"),
        linear: re(r"^(?:G0?(1))?([XY][^DIJ]*)(?:D0?([123]))?\*$"),
        circular: re(r"^(?:G0?([23]))?([XYIJ][^D]*)(?:D0([12]))?\*$"),
        opcode: re(r"^D0?([123])\*$"),
        interpolation: re(r"^(?:G0?([123]))\*"),
        quadrant: re(r"^G7([45])\*$"),
        region_on: re(r"^G36\*$"),
        region_off: re(r"^G37\*$"),
        eof: re(r"^M02\*"),
        image_polarity: re(r"^%IP(POS|NEG)\*%$"),
        layer_polarity: re(r"^%LP([DC])\*%$"),
        units: re(r"^G7([01])\*$"),
        absolute: re(r"^G9([01])\*$"),
        macro_start: re(r"^%AM([^\*]+)\*([^%]+)?(%)?$"),
        macro_end: re(r"(.*)%$"),
        coord_x: re(r"X([\+-]?\d+)"),
        coord_y: re(r"Y([\+-]?\d+)"),
        coord_i: re(r"I([\+-]?\d+)"),
        coord_j: re(r"J([\+-]?\d+)"),
    })
}

/// Split raw text into statements: a line ending in `%` stays whole,
/// any other line is cut after every `*`.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let mut line = raw.trim_matches(|c| c == ' ' || c == '\r' || c == '\n');
        while !line.is_empty() {
            if line.ends_with('%') {
                out.push(line.to_string());
                break;
            }
            match line.find('*') {
                Some(pos) => {
                    out.push(line[..=pos].to_string());
                    line = &line[pos + 1..];
                }
                None => {
                    out.push(line.to_string());
                    break;
                }
            }
        }
    }
    out
}

/// Signed integer coordinate scaled by `10^-frac_digits`.
fn parse_gerber_number(text: &str, frac_digits: u32) -> Result<f64, String> {
    text.parse::<i64>()
        .map(|v| v as f64 / 10f64.powi(frac_digits as i32))
        .map_err(|_| format!("invalid coordinate {:?}", text))
}

fn axis(re: &Regex, block: &str, frac_digits: u32) -> Result<Option<f64>, String> {
    match re.captures(block) {
        Some(c) => parse_gerber_number(&c[1], frac_digits).map(Some),
        None => Ok(None),
    }
}

/// Drawing state carried from one statement to the next.
struct ParseState {
    current_aperture: Option<String>,
    last_path_aperture: Option<String>,
    current: Coord<f64>,
    polarity: Polarity,
    quadrant: Option<QuadrantMode>,
    interpolation: Option<Interpolation>,
    operation: Option<u8>,
    region: bool,
    current_macro: Option<String>,
    path: Vec<Coord<f64>>,
    poly_buffer: Vec<Geom>,
}

impl ParseState {
    fn new() -> Self {
        Self {
            current_aperture: None,
            last_path_aperture: None,
            current: Coord { x: 0.0, y: 0.0 },
            polarity: Polarity::Dark,
            quadrant: None,
            interpolation: None,
            operation: None,
            region: false,
            current_macro: None,
            path: Vec::new(),
            poly_buffer: Vec::new(),
        }
    }

    /// Stroke the pending path with the aperture that drew it.
    fn stroke(&mut self, doc: &Gerber, line_num: usize) {
        if self.path.len() < 2 {
            return;
        }
        if doc.follow {
            self.poly_buffer
                .push(Geom::LineString(LineString::from(self.path.clone())));
            return;
        }
        let Some(id) = self.last_path_aperture.as_deref() else {
            warn!("No aperture defined for current path. ({})", line_num);
            return;
        };
        let Some(width) = doc.apertures.get(id).and_then(Aperture::size) else {
            warn!("Aperture {} cannot stroke a path. ({})", id, line_num);
            return;
        };
        let stroked = buffer_line(&self.path, width / 2.0, doc.steps_per_circle);
        if !stroked.0.is_empty() {
            self.poly_buffer.push(Geom::MultiPolygon(stroked));
        }
    }

    /// Close the pending path as a region contour.
    fn close_region(&mut self, doc: &Gerber, line_num: usize) {
        if doc.follow {
            return;
        }
        if self.path.len() < 3 {
            debug!("Region contour with {} points ignored. ({})", self.path.len(), line_num);
            return;
        }
        let polygon = Polygon::new(LineString::from(self.path.clone()), vec![]);
        let region = repair(&MultiPolygon::new(vec![polygon]));
        if !region.0.is_empty() {
            self.poly_buffer.push(Geom::MultiPolygon(region));
        }
    }

    fn flash(&mut self, doc: &Gerber, line_num: usize) {
        if doc.follow {
            return;
        }
        let Some(id) = self.current_aperture.as_deref() else {
            warn!("Line {}: nothing there to flash!", line_num);
            return;
        };
        let Some(aperture) = doc.apertures.get(id) else {
            warn!("Line {}: aperture {} is not defined", line_num, id);
            return;
        };
        match aperture.flash(self.current, &doc.aperture_macros, doc.steps_per_circle) {
            Ok(shape) if !shape.0.is_empty() => self.poly_buffer.push(Geom::MultiPolygon(shape)),
            Ok(_) => {}
            Err(e) => warn!("Line {}: flash of aperture {} failed: {}", line_num, id, e),
        }
    }

    /// Merge the buffer into the document with the current polarity.
    fn apply_buffer(&mut self, doc: &mut Gerber, strategy: Option<UnionStrategy>) {
        if doc.follow || self.poly_buffer.is_empty() {
            return;
        }
        let parts: Vec<MultiPolygon<f64>> = self.poly_buffer.drain(..).map(|g| g.to_multi_polygon()).collect();
        debug!("Joining {} polygons", parts.len());
        let merged = unary_union(parts);
        let merged = match strategy {
            Some(UnionStrategy::BufferGrowShrink) => grow_shrink(&merged, UNION_EPSILON),
            Some(UnionStrategy::Exact) => repair(&merged),
            None => merged,
        };
        let solid = doc.solid_geometry.to_multi_polygon();
        doc.solid_geometry = Geom::MultiPolygon(match self.polarity {
            Polarity::Dark => solid.union(&merged),
            Polarity::Clear => solid.difference(&merged),
        });
    }
}

impl Gerber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a file from disk.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> CamResult<()> {
        let text = std::fs::read_to_string(path.as_ref())?;
        info!("Parsing Gerber {}", path.as_ref().display());
        self.parse_str(&text)
    }

    pub fn parse_str(&mut self, text: &str) -> CamResult<()> {
        self.parse_lines(split_lines(text))
    }

    /// Parse statements, one per item. Errors carry the 1-based
    /// statement number and abort parsing.
    pub fn parse_lines<I, S>(&mut self, lines: I) -> CamResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = ParseState::new();
        let mut line_num = 0;

        for raw in lines {
            line_num += 1;
            let gline = raw.as_ref().trim_matches(|c| c == ' ' || c == '\r' || c == '\n');
            if gline.is_empty() {
                continue;
            }
            if let Err(reason) = self.parse_statement(&mut state, gline, line_num) {
                error!("PARSING FAILED. Line {}: {}", line_num, gline);
                return Err(ParseError::Gerber {
                    line: line_num,
                    text: gline.to_string(),
                    reason,
                }
                .into());
            }
        }

        state.stroke(self, line_num);
        if self.follow {
            let lines = std::mem::take(&mut state.poly_buffer);
            let mut items = match std::mem::take(&mut self.solid_geometry) {
                Geom::Collection(items) => items,
                other if other.is_empty() => Vec::new(),
                other => vec![other],
            };
            items.extend(lines);
            self.solid_geometry = Geom::Collection(items);
            info!("Gerber parsed in follow mode: {} paths", self.solid_geometry.flatten(true).len());
            return Ok(());
        }

        let strategy = self.union_strategy;
        state.apply_buffer(self, Some(strategy));
        info!(
            "Gerber parsed: {} apertures, {} polygons",
            self.apertures.len(),
            self.solid_geometry.polygons().len()
        );
        Ok(())
    }

    fn parse_statement(&mut self, state: &mut ParseState, gline: &str, line_num: usize) -> Result<(), String> {
        let p = patterns();

        // Macros first: their bodies look like anything else.
        match state.current_macro.clone() {
            None => {
                if let Some(c) = p.macro_start.captures(gline) {
                    let name = c[1].to_string();
                    debug!("Starting macro. Line {}: {}", line_num, gline);
                    let mut am = ApertureMacro::new(name.clone());
                    if let Some(body) = c.get(2) {
                        am.append(body.as_str());
                    }
                    self.aperture_macros.insert(name.clone(), am);
                    if c.get(3).is_none() {
                        state.current_macro = Some(name);
                    }
                    return Ok(());
                }
            }
            Some(name) => {
                let (data, done) = match p.macro_end.captures(gline) {
                    Some(c) => (c.get(1).map_or("", |m| m.as_str()).to_string(), true),
                    None => (gline.to_string(), false),
                };
                if let Some(am) = self.aperture_macros.get_mut(&name) {
                    am.append(&data);
                }
                if done {
                    debug!("End of macro. Line {}.", line_num);
                    state.current_macro = None;
                }
                return Ok(());
            }
        }

        if let Some(c) = p.linear.captures(gline) {
            return self.linear(state, &c, line_num);
        }

        if let Some(c) = p.circular.captures(gline) {
            if self.circular(state, &c, line_num)? {
                return Ok(());
            }
            warn!("Invalid arc in line {}.", line_num);
        }

        if let Some(c) = p.opcode.captures(gline) {
            let code = c[1].parse::<u8>().map_err(|e| e.to_string())?;
            state.operation = Some(code);
            if code == 3 {
                debug!("Bare op-code {}.", code);
                state.flash(self, line_num);
            }
            return Ok(());
        }

        if let Some(c) = p.quadrant.captures(gline) {
            state.quadrant = Some(if &c[1] == "4" {
                QuadrantMode::Single
            } else {
                QuadrantMode::Multi
            });
            return Ok(());
        }

        if p.region_on.is_match(gline) {
            if state.path.len() > 1 {
                state.stroke(self, line_num);
                state.path = vec![state.current];
            }
            state.region = true;
            return Ok(());
        }

        if p.region_off.is_match(gline) {
            state.region = false;
            if state.path.len() < 3 {
                return Ok(());
            }
            state.close_region(self, line_num);
            state.path = vec![state.current];
            return Ok(());
        }

        if let Some(c) = p.aperture_def.captures(gline) {
            info!("Found aperture definition. Line {}: {}", line_num, gline);
            let id = normalize_id(&c[1]).map_err(|e| e.to_string())?;
            let params = c.get(3).map(|m| m.as_str());
            match Aperture::parse(&c[2], params, &self.aperture_macros).map_err(|e| e.to_string())? {
                Some(aperture) => {
                    self.apertures.insert(id, aperture);
                }
                None => warn!("Aperture not implemented: {}", &c[2]),
            }
            return Ok(());
        }

        if let Some(c) = p.interpolation.captures(gline) {
            state.interpolation = Interpolation::from_code(&c[1]);
            return Ok(());
        }

        if let Some(c) = p.tool.captures(gline) {
            let id = normalize_id(&c[1]).map_err(|e| e.to_string())?;
            debug!("Line {}: Aperture change to ({})", line_num, id);
            if state.path.len() > 1 {
                state.stroke(self, line_num);
                state.path = vec![state.current];
            }
            state.current_aperture = Some(id);
            return Ok(());
        }

        if let Some(c) = p.layer_polarity.captures(gline) {
            let polarity = if &c[1] == "D" { Polarity::Dark } else { Polarity::Clear };
            if state.path.len() > 1 && polarity != state.polarity {
                state.stroke(self, line_num);
                state.path = vec![state.current];
            }
            state.apply_buffer(self, None);
            state.polarity = polarity;
            return Ok(());
        }

        if let Some(c) = p.format.captures(gline) {
            self.int_digits = c[3].parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
            self.frac_digits = c[4].parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
            if &c[2] == "I" {
                warn!("Incremental coordinates are not supported, reading as absolute");
            }
            return Ok(());
        }

        if let Some(c) = p.mode.captures(gline) {
            let units = c[1].parse::<Units>().map_err(|e| e.to_string())?;
            self.convert_units(units);
            return Ok(());
        }

        if let Some(c) = p.units.captures(gline) {
            let units = if &c[1] == "0" { Units::In } else { Units::Mm };
            self.convert_units(units);
            return Ok(());
        }

        if p.absolute.is_match(gline) || p.comment.is_match(gline) || p.eof.is_match(gline) {
            return Ok(());
        }

        if p.image_polarity.is_match(gline) {
            debug!("Image polarity ignored. Line {}", line_num);
            return Ok(());
        }

        warn!("Line ignored ({}): {}", line_num, gline);
        Ok(())
    }

    /// Linear move or flash.
    fn linear(&mut self, state: &mut ParseState, c: &Captures<'_>, line_num: usize) -> Result<(), String> {
        let p = patterns();
        let block = &c[2];
        if let Some(x) = axis(&p.coord_x, block, self.frac_digits)? {
            state.current.x = x;
        }
        if let Some(y) = axis(&p.coord_y, block, self.frac_digits)? {
            state.current.y = y;
        }
        if c.get(1).is_some() {
            state.interpolation = Some(Interpolation::Linear);
        }
        if let Some(code) = c.get(3) {
            state.operation = code.as_str().parse().ok();
        }

        match state.operation {
            Some(1) => {
                state.path.push(state.current);
                state.last_path_aperture = state.current_aperture.clone();
            }
            Some(2) => {
                if state.path.len() > 1 {
                    if state.region {
                        state.close_region(self, line_num);
                    } else {
                        state.stroke(self, line_num);
                    }
                }
                state.path = vec![state.current];
            }
            Some(3) => {
                state.stroke(self, line_num);
                state.path = vec![state.current];
                state.flash(self, line_num);
            }
            _ => debug!("Coordinates without operation code. ({})", line_num),
        }
        Ok(())
    }

    /// Circular move. `Ok(false)` when no single-quadrant centre fits, so
    /// later patterns get a chance at the line.
    fn circular(&mut self, state: &mut ParseState, c: &Captures<'_>, line_num: usize) -> Result<bool, String> {
        let p = patterns();
        let block = &c[2];
        let x = axis(&p.coord_x, block, self.frac_digits)?.unwrap_or(state.current.x);
        let y = axis(&p.coord_y, block, self.frac_digits)?.unwrap_or(state.current.y);
        let i = axis(&p.coord_i, block, self.frac_digits)?.unwrap_or(0.0);
        let j = axis(&p.coord_j, block, self.frac_digits)?.unwrap_or(0.0);

        let Some(quadrant) = state.quadrant else {
            error!(
                "Found arc before a G74 or G75 quadrant mode. ({})",
                line_num
            );
            return Ok(true);
        };

        match c.get(1) {
            Some(mode) => state.interpolation = Interpolation::from_code(mode.as_str()),
            None if state.interpolation.and_then(Interpolation::direction).is_none() => {
                error!("Found arc without circular interpolation mode defined. ({})", line_num);
                return Ok(true);
            }
            None => {}
        }
        let Some(direction) = state.interpolation.and_then(Interpolation::direction) else {
            return Ok(true);
        };

        if let Some(code) = c.get(3) {
            state.operation = code.as_str().parse().ok();
        }

        match state.operation {
            Some(2) => {
                warn!("Arc with D2. ({})", line_num);
                state.stroke(self, line_num);
                state.current = Coord { x, y };
                state.path = vec![state.current];
                return Ok(true);
            }
            Some(3) => {
                error!("Trying to flash within arc. ({})", line_num);
                return Ok(true);
            }
            _ => {}
        }

        let start_pt = state.current;
        let target = Coord { x, y };
        let radius = i.hypot(j);

        let candidates: Vec<(f64, f64)> = match quadrant {
            QuadrantMode::Multi => vec![(i, j)],
            QuadrantMode::Single => vec![(i, j), (-i, j), (i, -j), (-i, -j)],
        };

        for (ci, cj) in candidates {
            let center = Coord {
                x: start_pt.x + ci,
                y: start_pt.y + cj,
            };
            let start = (-cj).atan2(-ci);
            let stop = if quadrant == QuadrantMode::Multi && start_pt == target {
                start
            } else {
                (y - center.y).atan2(x - center.x)
            };

            if quadrant == QuadrantMode::Single {
                let radius2 = (center.x - x).hypot(center.y - y);
                let tol = self.arc_tolerance.radius;
                if radius2 < radius * (1.0 - tol) || radius2 > radius * (1.0 + tol) {
                    continue;
                }
                let sweep = arc_angle(start, stop, direction).abs();
                if sweep > (PI + self.arc_tolerance.sweep_epsilon) / 2.0 {
                    continue;
                }
            }

            let mut points = arc(center, radius, start, stop, direction, self.steps_per_circle);
            if let Some(last) = points.last_mut() {
                *last = target;
            }
            state.current = target;
            state.path.extend(points);
            state.last_path_aperture = state.current_aperture.clone();
            return Ok(true);
        }
        Ok(false)
    }

    /// Envelope of the geometry grown by `margin`; rounded corners
    /// when `rounded`, else squared off.
    pub fn get_bounding_box(&self, margin: f64, rounded: bool) -> CamResult<MultiPolygon<f64>> {
        let rect = self
            .solid_geometry
            .bounding_rect()
            .ok_or(pcbcam_core::GeometryError::EmptyGeometry)?;
        if rounded {
            Ok(buffer(&Geom::Polygon(envelope(rect)), margin)?)
        } else {
            Ok(MultiPolygon::new(vec![grow_rect(rect, margin)]))
        }
    }
}

impl Document for Gerber {
    fn kind(&self) -> &'static str {
        "gerber"
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
        self.solid_geometry.scale(factor, factor, Coord { x: 0.0, y: 0.0 });
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.solid_geometry.translate(dx, dy);
    }

    fn mirror(&mut self, axis: Axis, point: Coord<f64>) {
        self.solid_geometry.mirror(axis, point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect};

    fn parse(text: &str) -> Gerber {
        let mut g = Gerber::new();
        g.parse_str(text).unwrap();
        g
    }

    #[test]
    fn test_split_lines() {
        let lines = split_lines("G54D11*G36*\n%FSLAX24Y24*%\r\nX0Y0D02");
        assert_eq!(lines, vec!["G54D11*", "G36*", "%FSLAX24Y24*%", "X0Y0D02"]);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_gerber_number("+10000", 4).unwrap(), 1.0);
        assert_eq!(parse_gerber_number("-5", 1).unwrap(), -0.5);
        assert!(parse_gerber_number("1.5", 4).is_err());
    }

    #[test]
    fn test_parse_number_divides_exactly() {
        assert_eq!(parse_gerber_number("3", 4).unwrap(), 3.0 / 1e4);
        assert_eq!(parse_gerber_number("-7", 5).unwrap(), -7.0 / 1e5);
        assert_eq!(parse_gerber_number("12345", 6).unwrap(), 12345.0 / 1e6);
    }

    #[test]
    fn test_format_and_aperture_ids() {
        let g = parse("%FSLAX25Y25*%\n%MOIN*%\n%ADD010C,0.01*%\n%ADD11R,0.03X0.04*%\nM02*");
        assert_eq!(g.frac_digits, 5);
        assert!(g.apertures.contains_key("10"));
        assert_eq!(g.apertures["11"].size(), Some(0.05));
    }

    #[test]
    fn test_flash_circle() {
        let g = parse("%FSLAX24Y24*%\n%ADD10C,0.1*%\nD10*\nX10000Y10000D03*\nM02*");
        let r = g.solid_geometry.bounding_rect().unwrap();
        assert!((r.min().x - 0.95).abs() < 1e-6);
        assert!((r.max().y - 1.05).abs() < 1e-6);
    }

    #[test]
    fn test_stroke_is_buffered() {
        let g = parse("%FSLAX24Y24*%\n%ADD10C,0.1*%\nD10*\nX0Y0D02*\nX10000Y0D01*\nM02*");
        let area = g.solid_geometry.area();
        let expected = 1.0 * 0.1 + PI * 0.05 * 0.05;
        assert!((area - expected).abs() < 1e-3);
    }

    #[test]
    fn test_unknown_statement_is_skipped() {
        let g = parse("%FSLAX24Y24*%\nG99*\n%ADD10C,0.1*%\nD10*\nX0Y0D03*\nM02*");
        assert!(!g.solid_geometry.is_empty());
    }

    #[test]
    fn test_bad_coordinate_reports_line() {
        let mut g = Gerber::new();
        let err = g
            .parse_lines(["%FSLAX24Y24*%", "X999999999999999999999Y0D01*"])
            .unwrap_err();
        assert!(err.is_parse_error());
        assert!(err.to_string().starts_with("Line 2: "));
    }

    #[test]
    fn test_bounding_box() {
        let g = parse("%FSLAX24Y24*%\n%ADD10R,1X1*%\nD10*\nX0Y0D03*\nM02*");
        let sq = g.get_bounding_box(0.5, false).unwrap();
        assert!((sq.unsigned_area() - 4.0).abs() < 1e-9);
        let round = g.get_bounding_box(0.5, true).unwrap();
        assert!(round.unsigned_area() < 4.0);
        assert!(Gerber::new().get_bounding_box(0.1, false).is_err());
    }

    #[test]
    fn test_scale_only_touches_geometry() {
        let mut g = parse("%FSLAX24Y24*%\n%ADD10R,1X1*%\nD10*\nX0Y0D03*\nM02*");
        let before = g.solid_geometry.area();
        g.convert_units(Units::Mm);
        assert!((g.solid_geometry.area() - before * 25.4 * 25.4).abs() < 1e-6);
        assert_eq!(g.apertures["10"].size(), Some(2f64.sqrt()));
    }
}
