//! Presentation of documents through abstract drawing sinks
//!
//! Rendering is left to whoever implements [`ShapeSink`] and
//! [`AnnotationSink`]. [`ObjectPresenter`] decides what to draw for each
//! document kind and in which colours.

use geo::{Coord, Simplify};
use pcbcam_camlib::geometry::buffer;
use pcbcam_camlib::{CamResult, Geom, Motion, ParsedPath};

use crate::project::{CamObject, ObjectHandle};

/// Tolerance used when simplifying buffered toolpaths for display.
pub const TOOL_TOLERANCE: f64 = 0.0005;

/// RGBA colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0x00, 0x00, 0x00, 0xFF);
    pub const RED: Color = Color::rgba(0xFF, 0x00, 0x00, 0xFF);
    pub const GREEN: Color = Color::rgba(0x00, 0x80, 0x00, 0xFF);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// `#RRGGBBAA` notation
    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// Distinct opaque colour for the `index`-th polygon of a layer.
    pub fn nth(index: usize) -> Self {
        // Golden-angle hue steps.
        let hue = (index as f64 * 137.507_764) % 360.0;
        let (r, g, b) = hsv_to_rgb(hue, 0.65, 0.85);
        Self::rgba(r, g, b, 0xFF)
    }
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let byte = |v: f64| ((v + m) * 255.0).round() as u8;
    (byte(r), byte(g), byte(b))
}

mod palette {
    use super::Color;

    pub const GERBER_EDGE: Color = Color::rgba(0x00, 0x6E, 0x20, 0xBF);
    pub const GERBER_FACE: Color = Color::rgba(0xBB, 0xF2, 0x68, 0xBF);
    pub const DRILL_EDGE: Color = Color::rgba(0x75, 0x00, 0x00, 0xBF);
    pub const DRILL_FACE: Color = Color::rgba(0xC4, 0x00, 0x00, 0xBF);
    pub const TRAVEL_FACE: Color = Color::rgba(0xF0, 0xE2, 0x4D, 0x4C);
    pub const TRAVEL_EDGE: Color = Color::rgba(0xB5, 0xAB, 0x3A, 0x4C);
    pub const CUT_FACE: Color = Color::rgba(0x5E, 0x6C, 0xFF, 0xFF);
    pub const CUT_EDGE: Color = Color::rgba(0x46, 0x50, 0xBD, 0xFF);
}

/// Receives the shapes of one document.
pub trait ShapeSink {
    /// Queue a shape. `face_color` fills polygons; `None` draws outlines only.
    fn add_shape(&mut self, shape: Geom, color: Color, face_color: Option<Color>, visible: bool, layer: u8);

    /// Remove all shapes, redrawing at once if `update` is set.
    fn clear(&mut self, update: bool);

    fn redraw(&mut self);
}

/// Receives text labels placed in document coordinates.
pub trait AnnotationSink {
    fn set(&mut self, texts: Vec<String>, positions: Vec<Coord<f64>>, visible: bool);

    fn clear(&mut self, update: bool);
}

/// Draws one project object into a pair of sinks.
pub struct ObjectPresenter<S, A> {
    object: ObjectHandle,
    shapes: S,
    annotations: A,
}

impl<S: ShapeSink, A: AnnotationSink> ObjectPresenter<S, A> {
    pub fn new(object: ObjectHandle, shapes: S, annotations: A) -> Self {
        Self {
            object,
            shapes,
            annotations,
        }
    }

    pub fn shapes(&self) -> &S {
        &self.shapes
    }

    pub fn annotations(&self) -> &A {
        &self.annotations
    }

    pub fn into_sinks(self) -> (S, A) {
        (self.shapes, self.annotations)
    }

    /// Clear both sinks.
    pub fn clear(&mut self, update: bool) {
        self.shapes.clear(update);
        self.annotations.clear(update);
    }

    /// Redraw the object from scratch. Nothing is drawn when its `plot`
    /// option is off.
    pub fn plot(&mut self) -> CamResult<()> {
        let object = self.object.read().clone();
        self.clear(false);
        if !object.plot_enabled() {
            return Ok(());
        }

        match &object {
            CamObject::Gerber { document, options } => {
                for (i, poly) in document.solid_geometry.polygons().into_iter().enumerate() {
                    let shape = Geom::Polygon(poly);
                    match (options.solid, options.multicolored) {
                        (true, true) => self.shapes.add_shape(shape, palette::GERBER_EDGE, Some(Color::nth(i)), true, 0),
                        (true, false) => {
                            self.shapes
                                .add_shape(shape, palette::GERBER_EDGE, Some(palette::GERBER_FACE), true, 0)
                        }
                        (false, true) => self.shapes.add_shape(shape, Color::nth(i), None, true, 0),
                        (false, false) => self.shapes.add_shape(shape, Color::BLACK, None, true, 0),
                    }
                }
            }
            CamObject::Excellon { document, options } => {
                for poly in document.solid_geometry.polygons() {
                    if options.solid {
                        self.shapes.add_shape(
                            Geom::Polygon(poly),
                            palette::DRILL_EDGE,
                            Some(palette::DRILL_FACE),
                            true,
                            2,
                        );
                    } else {
                        let (exterior, interiors) = poly.into_inner();
                        self.shapes.add_shape(Geom::LinearRing(exterior), Color::RED, None, true, 0);
                        for ring in interiors {
                            self.shapes.add_shape(Geom::LinearRing(ring), Color::GREEN, None, true, 0);
                        }
                    }
                }
            }
            CamObject::Geometry { document, .. } => {
                for element in document.solid_geometry.flatten(false) {
                    self.shapes.add_shape(element, Color::RED, None, true, 0);
                }
            }
            CamObject::CncJob { document, options } => {
                self.plot_toolpaths(&document.gcode_parsed, options.tooldia)?;
            }
        }

        self.shapes.redraw();
        Ok(())
    }

    fn plot_toolpaths(&mut self, paths: &[ParsedPath], tooldia: f64) -> CamResult<()> {
        let colors = |path: &ParsedPath| match path.kind.motion {
            Motion::Travel => (palette::TRAVEL_FACE, palette::TRAVEL_EDGE, 2),
            Motion::Cut => (palette::CUT_FACE, palette::CUT_EDGE, 1),
        };

        if tooldia == 0.0 {
            for path in paths {
                let (_, edge, _) = colors(path);
                self.shapes
                    .add_shape(Geom::LineString(path.path.clone()), edge, None, true, 0);
            }
            return Ok(());
        }

        let mut texts = Vec::with_capacity(paths.len());
        let mut positions = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let Some(start) = path.path.0.first() else {
                continue;
            };
            texts.push((i + 1).to_string());
            positions.push(*start);

            let outline = buffer(&Geom::LineString(path.path.clone()), tooldia / 2.0)?.simplify(&TOOL_TOLERANCE);
            let (face, edge, layer) = colors(path);
            self.shapes
                .add_shape(Geom::MultiPolygon(outline), edge, Some(face), true, layer);
        }
        self.annotations.set(texts, positions, true);
        Ok(())
    }
}

/// Sink that keeps everything it is given. Useful for tests and exports.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub shapes: Vec<(Geom, Color, Option<Color>, u8)>,
    pub texts: Vec<String>,
    pub positions: Vec<Coord<f64>>,
    pub redraws: usize,
}

impl ShapeSink for RecordingSink {
    fn add_shape(&mut self, shape: Geom, color: Color, face_color: Option<Color>, visible: bool, layer: u8) {
        if visible {
            self.shapes.push((shape, color, face_color, layer));
        }
    }

    fn clear(&mut self, _update: bool) {
        self.shapes.clear();
    }

    fn redraw(&mut self) {
        self.redraws += 1;
    }
}

impl AnnotationSink for RecordingSink {
    fn set(&mut self, texts: Vec<String>, positions: Vec<Coord<f64>>, visible: bool) {
        if visible {
            self.texts = texts;
            self.positions = positions;
        }
    }

    fn clear(&mut self, _update: bool) {
        self.texts.clear();
        self.positions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(palette::GERBER_EDGE.hex(), "#006E20BF");
        assert_eq!(Color::BLACK.hex(), "#000000FF");
    }

    #[test]
    fn test_nth_colours_differ() {
        assert_ne!(Color::nth(0), Color::nth(1));
        assert_eq!(Color::nth(3).a, 0xFF);
    }
}
