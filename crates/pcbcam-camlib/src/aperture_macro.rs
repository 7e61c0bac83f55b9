//! Gerber aperture macros
//!
//! A macro is stored as its raw source and evaluated for each aperture
//! that instantiates it. Evaluation binds the aperture modifiers to `$1`,
//! `$2`, ..., runs the variable definitions, evaluates every primitive
//! and combines them by exposure.

use std::collections::HashMap;
use std::f64::consts::PI;

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use pcbcam_core::ParseError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{circle, DEFAULT_CIRCLE_STEPS};

/// Named macro body as it appeared in the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApertureMacro {
    pub name: String,
    pub raw: String,
}

/// One evaluated primitive: exposure on (true) or off, and its shape.
struct Primitive {
    exposure: bool,
    shape: MultiPolygon<f64>,
}

impl ApertureMacro {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw: String::new(),
        }
    }

    /// Append source text read from a continuation line.
    pub fn append(&mut self, data: &str) {
        self.raw.push_str(data);
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError::ApertureMacro {
            macro_name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Numeric field lists of every primitive, variables resolved.
    pub fn primitives(&self, modifiers: &[f64]) -> Result<Vec<Vec<f64>>, ParseError> {
        let mut locals: HashMap<String, f64> = modifiers
            .iter()
            .enumerate()
            .map(|(i, v)| ((i + 1).to_string(), *v))
            .collect();

        let cleaned: String = self.raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        let cleaned = cleaned.trim_matches(|c| c == ' ' || c == '*');

        let mut primitives = Vec::new();
        for part in cleaned.split('*') {
            let part = part.trim();
            if part.is_empty() || part.starts_with('0') {
                continue;
            }

            if let Some(definition) = part.strip_prefix('$') {
                let Some((var, expr)) = definition.split_once('=') else {
                    warn!("Unknown syntax of aperture macro part: {}", part);
                    continue;
                };
                if var.is_empty() || !var.chars().all(|c| c.is_ascii_alphanumeric()) {
                    warn!("Unknown syntax of aperture macro part: {}", part);
                    continue;
                }
                let value = eval_expression(&prepare(expr, &locals))?;
                if modifiers.len() >= var.parse::<usize>().unwrap_or(usize::MAX) {
                    debug!("{}: ${} is bound by a modifier, keeping it", self.name, var);
                    continue;
                }
                locals.insert(var.to_string(), value);
                continue;
            }

            if part.starts_with(|c: char| ('1'..='9').contains(&c)) {
                let prepared = prepare(part, &locals);
                let fields = prepared
                    .split(',')
                    .map(eval_expression)
                    .collect::<Result<Vec<_>, _>>()?;
                primitives.push(fields);
                continue;
            }

            warn!("Unknown syntax of aperture macro part: {}", part);
        }
        Ok(primitives)
    }

    /// Shape of the macro for one set of modifiers, centred on the
    /// aperture origin.
    pub fn evaluate(&self, modifiers: &[f64]) -> Result<MultiPolygon<f64>, ParseError> {
        let mut geometry = MultiPolygon::new(vec![]);
        for fields in self.primitives(modifiers)? {
            let code = fields.first().copied().unwrap_or(0.0) as i64;
            let mods = &fields[1..];
            let primitive = match code {
                1 => make_circle(mods),
                2 | 20 => make_vectorline(mods),
                21 => make_centerline(mods),
                22 => make_lowerleftline(mods),
                4 => make_outline(mods),
                5 => make_polygon(mods),
                6 => make_moire(mods),
                7 => make_thermal(mods),
                other => return Err(self.error(format!("unknown primitive code {}", other))),
            };
            geometry = if primitive.exposure {
                geometry.union(&primitive.shape)
            } else {
                geometry.difference(&primitive.shape)
            };
        }
        Ok(geometry)
    }
}

/// Substitute `$name` references and turn `x`/`X` into multiplication.
///
/// Unbound references become `0`. A reference takes the whole
/// alphanumeric run after `$`, so `$1` never matches inside `$10`.
fn prepare(text: &str, locals: &HashMap<String, f64>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match locals.get(&name) {
                    Some(v) => out.push_str(&format!("({})", v)),
                    None => out.push('0'),
                }
            }
            'x' | 'X' => out.push('*'),
            other => out.push(other),
        }
    }
    out
}

/// Evaluate an arithmetic expression: numbers, `+ - * /`, unary signs
/// and parentheses.
pub fn eval_expression(expr: &str) -> Result<f64, ParseError> {
    let mut parser = ExprParser {
        src: expr.as_bytes(),
        pos: 0,
        text: expr,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.fail("unexpected trailing input"));
    }
    if !value.is_finite() {
        return Err(parser.fail("result is not finite"));
    }
    Ok(value)
}

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
    text: &'a str,
}

impl ExprParser<'_> {
    fn fail(&self, reason: &str) -> ParseError {
        ParseError::Expression {
            expression: self.text.to_string(),
            reason: format!("{} at {}", reason, self.pos),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, ParseError> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ParseError> {
        let mut value = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == b'/' {
                if rhs == 0.0 {
                    return Err(self.fail("division by zero"));
                }
                value /= rhs;
            } else {
                value *= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, ParseError> {
        match self.peek() {
            Some(b'+') => {
                self.pos += 1;
                self.factor()
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(self.fail("missing ')'"));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(_) => Err(self.fail("unexpected character")),
            None => Err(self.fail("unexpected end")),
        }
    }

    fn number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        while self.pos < self.src.len() && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.') {
            self.pos += 1;
        }
        if self.pos < self.src.len() && (self.src[self.pos] == b'e' || self.src[self.pos] == b'E') {
            let mark = self.pos;
            self.pos += 1;
            if self.pos < self.src.len() && (self.src[self.pos] == b'+' || self.src[self.pos] == b'-') {
                self.pos += 1;
            }
            let digits = self.pos;
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            if digits == self.pos {
                self.pos = mark;
            }
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber(literal.to_string()))
    }
}

/// Zero-pad `mods` to at least `n` fields.
fn default2zero<const N: usize>(mods: &[f64]) -> [f64; N] {
    let mut out = [0.0; N];
    for (slot, v) in out.iter_mut().zip(mods) {
        *slot = *v;
    }
    out
}

fn rotate_coords(coords: Vec<Coord<f64>>, degrees: f64) -> Vec<Coord<f64>> {
    if degrees == 0.0 {
        return coords;
    }
    let (s, c) = (degrees * PI / 180.0).sin_cos();
    coords
        .into_iter()
        .map(|p| Coord {
            x: p.x * c - p.y * s,
            y: p.x * s + p.y * c,
        })
        .collect()
}

fn rotate(mp: MultiPolygon<f64>, degrees: f64) -> MultiPolygon<f64> {
    if degrees == 0.0 {
        return mp;
    }
    let rotate_ring = |ls: &LineString<f64>| LineString::from(rotate_coords(ls.0.clone(), degrees));
    MultiPolygon::new(
        mp.0.iter()
            .map(|p| Polygon::new(rotate_ring(p.exterior()), p.interiors().iter().map(rotate_ring).collect()))
            .collect(),
    )
}

fn ring_polygon(coords: Vec<Coord<f64>>, degrees: f64) -> MultiPolygon<f64> {
    if coords.len() < 3 {
        return MultiPolygon::new(vec![]);
    }
    MultiPolygon::new(vec![Polygon::new(LineString::from(rotate_coords(coords, degrees)), vec![])])
}

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Coord<f64>> {
    vec![
        Coord { x: x0, y: y0 },
        Coord { x: x1, y: y0 },
        Coord { x: x1, y: y1 },
        Coord { x: x0, y: y1 },
    ]
}

/// Rectangle around a segment, ends flush (`extend = 0`) or pushed out.
fn segment_box(a: Coord<f64>, b: Coord<f64>, width: f64, extend: f64) -> Vec<Coord<f64>> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx.hypot(dy);
    if len == 0.0 || width <= 0.0 {
        return Vec::new();
    }
    let (ux, uy) = (dx / len, dy / len);
    let (nx, ny) = (-uy * width / 2.0, ux * width / 2.0);
    let a = Coord { x: a.x - ux * extend, y: a.y - uy * extend };
    let b = Coord { x: b.x + ux * extend, y: b.y + uy * extend };
    vec![
        Coord { x: a.x + nx, y: a.y + ny },
        Coord { x: a.x - nx, y: a.y - ny },
        Coord { x: b.x - nx, y: b.y - ny },
        Coord { x: b.x + nx, y: b.y + ny },
    ]
}

fn disc(x: f64, y: f64, radius: f64) -> MultiPolygon<f64> {
    if radius <= 0.0 {
        return MultiPolygon::new(vec![]);
    }
    MultiPolygon::new(vec![circle(Coord { x, y }, radius, DEFAULT_CIRCLE_STEPS)])
}

fn annulus(x: f64, y: f64, outer: f64, inner: f64) -> MultiPolygon<f64> {
    let outer = disc(x, y, outer);
    if inner <= 0.0 {
        outer
    } else {
        outer.difference(&disc(x, y, inner))
    }
}

fn make_circle(mods: &[f64]) -> Primitive {
    let [pol, dia, x, y, angle] = default2zero::<5>(mods);
    Primitive {
        exposure: pol as i64 == 1,
        shape: rotate(disc(x, y, dia / 2.0), angle),
    }
}

fn make_vectorline(mods: &[f64]) -> Primitive {
    let [pol, width, xs, ys, xe, ye, angle] = default2zero::<7>(mods);
    let quad = segment_box(Coord { x: xs, y: ys }, Coord { x: xe, y: ye }, width, 0.0);
    Primitive {
        exposure: pol as i64 == 1,
        shape: ring_polygon(quad, angle),
    }
}

fn make_centerline(mods: &[f64]) -> Primitive {
    let [pol, width, height, x, y, angle] = default2zero::<6>(mods);
    let corners = rect(x - width / 2.0, y - height / 2.0, x + width / 2.0, y + height / 2.0);
    Primitive {
        exposure: pol as i64 == 1,
        shape: ring_polygon(corners, angle),
    }
}

fn make_lowerleftline(mods: &[f64]) -> Primitive {
    let [pol, width, height, x, y, angle] = default2zero::<6>(mods);
    Primitive {
        exposure: pol as i64 == 1,
        shape: ring_polygon(rect(x, y, x + width, y + height), angle),
    }
}

fn make_outline(mods: &[f64]) -> Primitive {
    let pol = mods.first().copied().unwrap_or(0.0);
    let n = mods.get(1).copied().unwrap_or(0.0).max(0.0) as usize;
    let field = |i: usize| mods.get(i).copied().unwrap_or(0.0);
    let points: Vec<Coord<f64>> = (0..=n)
        .map(|i| Coord {
            x: field(2 * i + 2),
            y: field(2 * i + 3),
        })
        .collect();
    let angle = field(2 * n + 4);
    Primitive {
        exposure: pol as i64 == 1,
        shape: ring_polygon(points, angle),
    }
}

fn make_polygon(mods: &[f64]) -> Primitive {
    let [pol, nverts, x, y, dia, angle] = default2zero::<6>(mods);
    let n = nverts.max(0.0) as usize;
    let points = (0..n)
        .map(|i| {
            let t = 2.0 * PI * i as f64 / n as f64;
            Coord {
                x: x + 0.5 * dia * t.cos(),
                y: y + 0.5 * dia * t.sin(),
            }
        })
        .collect();
    Primitive {
        exposure: pol as i64 == 1,
        shape: ring_polygon(points, angle),
    }
}

fn make_moire(mods: &[f64]) -> Primitive {
    let [x, y, dia, thickness, gap, nrings, cross_th, cross_len, angle] = default2zero::<9>(mods);
    let half = thickness / 2.0;
    let mut r = dia / 2.0 - half;
    let mut result = annulus(x, y, r + half, r - half);
    let mut rings = 1;
    while (rings as f64) < nrings && r - half > 0.0 {
        r -= thickness + gap;
        if r <= 0.0 {
            break;
        }
        result = result.union(&annulus(x, y, r + half, r - half));
        rings += 1;
    }

    let hor = segment_box(Coord { x: x - cross_len, y }, Coord { x: x + cross_len, y }, cross_th, 0.0);
    let ver = segment_box(Coord { x, y: y - cross_len }, Coord { x, y: y + cross_len }, cross_th, 0.0);
    result = result.union(&ring_polygon(hor, 0.0)).union(&ring_polygon(ver, 0.0));

    Primitive {
        exposure: true,
        shape: rotate(result, angle),
    }
}

fn make_thermal(mods: &[f64]) -> Primitive {
    let [x, y, dout, din, t, angle] = default2zero::<6>(mods);
    let ring = annulus(x, y, dout / 2.0, din / 2.0);
    let h = segment_box(
        Coord { x: x - dout / 2.0, y },
        Coord { x: x + dout / 2.0, y },
        t,
        t / 2.0,
    );
    let v = segment_box(
        Coord { x, y: y - dout / 2.0 },
        Coord { x, y: y + dout / 2.0 },
        t,
        t / 2.0,
    );
    let cross = ring_polygon(h, 0.0).union(&ring_polygon(v, 0.0));
    Primitive {
        exposure: true,
        shape: rotate(ring.difference(&cross), angle),
    }
}
