//! Geometry kernel
//!
//! [`Geom`] is the closed set of shapes a document can hold. Boolean
//! operations come from `geo`; polygon offsetting goes through
//! `cavalier_contours` in [`buffer`].

pub mod arc;
pub mod buffer;
pub mod clearing;

use geo::{Area, BoundingRect, Coord, LineString, MapCoordsInPlace, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::spatial_index::Endpoints;

pub use arc::{arc, arc_angle, ArcDirection};
pub use buffer::{
    buffer, buffer_line, buffer_with_steps, circle, envelope, grow_rect, grow_shrink, repair, stadium,
    unary_union, DEFAULT_CIRCLE_STEPS,
};
pub use clearing::{clear_polygon, clear_polygon2, paint_connect, path_connect};

/// Axis for [`Geom::mirror`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    /// Flip Y about a horizontal line.
    X,
    /// Flip X about a vertical line.
    Y,
}

/// A document's geometry.
///
/// `Collection` is an un-unioned list; every other variant is a single
/// value. A `LinearRing` is a closed `LineString`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "geometry")]
pub enum Geom {
    Point(Point<f64>),
    LineString(LineString<f64>),
    LinearRing(LineString<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
    Collection(Vec<Geom>),
}

impl Default for Geom {
    fn default() -> Self {
        Geom::Collection(Vec::new())
    }
}

impl From<Polygon<f64>> for Geom {
    fn from(p: Polygon<f64>) -> Self {
        Geom::Polygon(p)
    }
}

impl From<MultiPolygon<f64>> for Geom {
    fn from(mp: MultiPolygon<f64>) -> Self {
        Geom::MultiPolygon(mp)
    }
}

impl From<LineString<f64>> for Geom {
    fn from(ls: LineString<f64>) -> Self {
        if ls.is_closed() && ls.0.len() > 2 {
            Geom::LinearRing(ls)
        } else {
            Geom::LineString(ls)
        }
    }
}

impl From<Point<f64>> for Geom {
    fn from(p: Point<f64>) -> Self {
        Geom::Point(p)
    }
}

impl From<Vec<Geom>> for Geom {
    fn from(items: Vec<Geom>) -> Self {
        Geom::Collection(items)
    }
}

impl Geom {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geom::Point(_) => "Point",
            Geom::LineString(_) => "LineString",
            Geom::LinearRing(_) => "LinearRing",
            Geom::Polygon(_) => "Polygon",
            Geom::MultiPolygon(_) => "MultiPolygon",
            Geom::Collection(_) => "Collection",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geom::Point(_) => false,
            Geom::LineString(ls) | Geom::LinearRing(ls) => ls.0.is_empty(),
            Geom::Polygon(p) => p.exterior().0.is_empty(),
            Geom::MultiPolygon(mp) => mp.0.is_empty(),
            Geom::Collection(items) => items.iter().all(Geom::is_empty),
        }
    }

    /// True for a `Collection`, which defers unions.
    pub fn is_collection(&self) -> bool {
        matches!(self, Geom::Collection(_))
    }

    /// Non-nested primitives in order. With `pathonly`, polygons are
    /// exploded into their exterior followed by their interiors.
    pub fn flatten(&self, pathonly: bool) -> Vec<Geom> {
        let mut out = Vec::new();
        self.flatten_into(pathonly, &mut out);
        out
    }

    fn flatten_into(&self, pathonly: bool, out: &mut Vec<Geom>) {
        match self {
            Geom::Collection(items) => {
                for item in items {
                    item.flatten_into(pathonly, out);
                }
            }
            Geom::MultiPolygon(mp) => {
                for p in &mp.0 {
                    Geom::Polygon(p.clone()).flatten_into(pathonly, out);
                }
            }
            Geom::Polygon(p) if pathonly => {
                out.push(Geom::LinearRing(p.exterior().clone()));
                out.extend(p.interiors().iter().cloned().map(Geom::LinearRing));
            }
            other => out.push(other.clone()),
        }
    }

    /// Every polygon in the geometry, in order.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        self.flatten(false)
            .into_iter()
            .filter_map(|g| match g {
                Geom::Polygon(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Area members as one (not unioned) multipolygon. Lines and points
    /// are dropped.
    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(self.polygons())
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Geom::Point(p) => Some(p.bounding_rect()),
            Geom::LineString(ls) | Geom::LinearRing(ls) => ls.bounding_rect(),
            Geom::Polygon(p) => p.bounding_rect(),
            Geom::MultiPolygon(mp) => mp.bounding_rect(),
            Geom::Collection(items) => items
                .iter()
                .filter_map(Geom::bounding_rect)
                .reduce(|a, b| {
                    Rect::new(
                        Coord {
                            x: a.min().x.min(b.min().x),
                            y: a.min().y.min(b.min().y),
                        },
                        Coord {
                            x: a.max().x.max(b.max().x),
                            y: a.max().y.max(b.max().y),
                        },
                    )
                }),
        }
    }

    /// `(xmin, ymin, xmax, ymax)`, all zero when empty.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self.bounding_rect() {
            Some(r) => (r.min().x, r.min().y, r.max().x, r.max().y),
            None => (0.0, 0.0, 0.0, 0.0),
        }
    }

    /// Sum of polygon areas. Overlaps inside a collection count twice.
    pub fn area(&self) -> f64 {
        match self {
            Geom::Polygon(p) => p.unsigned_area(),
            Geom::MultiPolygon(mp) => mp.unsigned_area(),
            Geom::Collection(items) => items.iter().map(Geom::area).sum(),
            _ => 0.0,
        }
    }

    /// Coordinates of a point or path. Empty for areas.
    pub fn coords(&self) -> Vec<Coord<f64>> {
        match self {
            Geom::Point(p) => vec![p.0],
            Geom::LineString(ls) | Geom::LinearRing(ls) => ls.0.clone(),
            _ => Vec::new(),
        }
    }

    pub fn map_coords_in_place(&mut self, f: impl Fn(Coord<f64>) -> Coord<f64> + Copy) {
        match self {
            Geom::Point(p) => p.map_coords_in_place(f),
            Geom::LineString(ls) | Geom::LinearRing(ls) => ls.map_coords_in_place(f),
            Geom::Polygon(p) => p.map_coords_in_place(f),
            Geom::MultiPolygon(mp) => mp.map_coords_in_place(f),
            Geom::Collection(items) => {
                for item in items {
                    item.map_coords_in_place(f);
                }
            }
        }
    }

    /// Scale about `origin`.
    pub fn scale(&mut self, xfactor: f64, yfactor: f64, origin: Coord<f64>) {
        self.map_coords_in_place(|c| Coord {
            x: origin.x + (c.x - origin.x) * xfactor,
            y: origin.y + (c.y - origin.y) * yfactor,
        });
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.map_coords_in_place(|c| Coord {
            x: c.x + dx,
            y: c.y + dy,
        });
    }

    /// Reflect about the line through `point` parallel to `axis`.
    pub fn mirror(&mut self, axis: Axis, point: Coord<f64>) {
        let (xf, yf) = match axis {
            Axis::X => (1.0, -1.0),
            Axis::Y => (-1.0, 1.0),
        };
        self.scale(xf, yf, point);
    }

    /// Reverse the point order of a path.
    pub fn reverse(&mut self) {
        if let Geom::LineString(ls) | Geom::LinearRing(ls) = self {
            ls.0.reverse();
        }
    }
}

impl Endpoints for Geom {
    fn endpoints(&self) -> Vec<Coord<f64>> {
        match self {
            Geom::Point(p) => vec![p.0],
            Geom::LineString(ls) | Geom::LinearRing(ls) => ls.endpoints(),
            Geom::Polygon(p) => p.exterior().endpoints(),
            Geom::MultiPolygon(_) | Geom::Collection(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ]
    }

    fn square_with_hole() -> Polygon<f64> {
        Polygon::new(
            square().exterior().clone(),
            vec![LineString::from(vec![
                (0.5, 0.5),
                (0.5, 1.5),
                (1.5, 1.5),
                (1.5, 0.5),
                (0.5, 0.5),
            ])],
        )
    }

    #[test]
    fn test_flatten_pathonly_explodes_polygons() {
        let g = Geom::Collection(vec![
            Geom::Polygon(square_with_hole()),
            Geom::Collection(vec![Geom::Point(Point::new(5.0, 5.0))]),
        ]);
        let flat = g.flatten(true);
        assert_eq!(flat.len(), 3);
        assert!(matches!(flat[0], Geom::LinearRing(_)));
        assert!(matches!(flat[1], Geom::LinearRing(_)));
        assert!(matches!(flat[2], Geom::Point(_)));

        let flat = g.flatten(false);
        assert_eq!(flat.len(), 2);
        assert!(matches!(flat[0], Geom::Polygon(_)));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(Geom::default().bounds(), (0.0, 0.0, 0.0, 0.0));
        let g = Geom::Collection(vec![
            Geom::Polygon(square()),
            Geom::LineString(LineString::from(vec![(-1.0, 1.0), (1.0, 5.0)])),
        ]);
        assert_eq!(g.bounds(), (-1.0, 0.0, 2.0, 5.0));
    }

    #[test]
    fn test_mirror_and_translate() {
        let mut g = Geom::Point(Point::new(1.0, 2.0));
        g.mirror(Axis::X, Coord { x: 0.0, y: 1.0 });
        assert_eq!(g, Geom::Point(Point::new(1.0, 0.0)));
        g.mirror(Axis::Y, Coord { x: 2.0, y: 0.0 });
        assert_eq!(g, Geom::Point(Point::new(3.0, 0.0)));
        g.translate(-3.0, 1.0);
        assert_eq!(g, Geom::Point(Point::new(0.0, 1.0)));
    }

    #[test]
    fn test_area_and_empty() {
        assert!(Geom::default().is_empty());
        assert!(Geom::Collection(vec![Geom::Collection(vec![])]).is_empty());
        let g = Geom::Polygon(square_with_hole());
        assert!((g.area() - 3.0).abs() < 1e-12);
        assert!(!g.is_empty());
    }

    #[test]
    fn test_closed_linestring_becomes_ring() {
        let ring: Geom = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).into();
        assert_eq!(ring.kind_name(), "LinearRing");
        let open: Geom = LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]).into();
        assert_eq!(open.kind_name(), "LineString");
    }

    #[test]
    fn test_serde_tagging() {
        let g = Geom::Collection(vec![Geom::Point(Point::new(1.0, 2.0))]);
        let value = serde_json::to_value(&g).unwrap();
        assert_eq!(value["type"], "Collection");
        let back: Geom = serde_json::from_value(value).unwrap();
        assert_eq!(back, g);
    }
}
