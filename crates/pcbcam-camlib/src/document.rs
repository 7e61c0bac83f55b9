//! The base geometry document and the operations shared by every document
//! kind.

use geo::{BooleanOps, BoundingRect, Contains, Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use pcbcam_core::{GeometryError, Units};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CamResult;
use crate::geometry::{buffer, circle, envelope, repair, unary_union, Axis, Geom, DEFAULT_CIRCLE_STEPS};

/// Behaviour common to Gerber, Excellon, Geometry and CNC job documents.
pub trait Document {
    /// Short kind tag ("gerber", "excellon", "geometry", "cncjob").
    fn kind(&self) -> &'static str;

    fn units(&self) -> Units;

    fn set_units(&mut self, units: Units);

    fn solid_geometry(&self) -> &Geom;

    /// Scale about the origin.
    fn scale(&mut self, factor: f64);

    fn offset(&mut self, dx: f64, dy: f64);

    fn mirror(&mut self, axis: Axis, point: Coord<f64>);

    /// Switch to `units`, rescaling in place. Returns the factor applied;
    /// exactly 1.0 (and nothing touched) when already in `units`.
    fn convert_units(&mut self, units: Units) -> f64 {
        let factor = self.units().conversion_factor(units);
        if self.units() == units {
            return 1.0;
        }
        debug!("{}: converting units {} -> {}", self.kind(), self.units(), units);
        self.set_units(units);
        self.scale(factor);
        factor
    }

    fn bounds(&self) -> (f64, f64, f64, f64) {
        self.solid_geometry().bounds()
    }

    fn to_dict(&self) -> CamResult<serde_json::Value>
    where
        Self: Serialize + Sized,
    {
        Ok(serde_json::to_value(self)?)
    }

    fn from_dict(value: serde_json::Value) -> CamResult<Self>
    where
        Self: DeserializeOwned + Sized,
    {
        Ok(serde_json::from_value(value)?)
    }
}

/// Plain geometry: the result of isolation, clearing and other derived
/// operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub units: Units,
    pub solid_geometry: Geom,
}

impl Geometry {
    pub fn new(units: Units) -> Self {
        Self {
            units,
            solid_geometry: Geom::default(),
        }
    }

    pub fn with_geometry(units: Units, solid_geometry: Geom) -> Self {
        Self {
            units,
            solid_geometry,
        }
    }

    /// Append to a collection, otherwise union with the existing value.
    fn add(&mut self, item: Geom) {
        let existing = std::mem::take(&mut self.solid_geometry);
        self.solid_geometry = match existing {
            Geom::Collection(mut items) => {
                items.push(item);
                Geom::Collection(items)
            }
            area @ (Geom::Polygon(_) | Geom::MultiPolygon(_))
                if matches!(item, Geom::Polygon(_) | Geom::MultiPolygon(_)) =>
            {
                Geom::MultiPolygon(area.to_multi_polygon().union(&item.to_multi_polygon()))
            }
            other => Geom::Collection(vec![other, item]),
        };
    }

    pub fn add_circle(&mut self, origin: Coord<f64>, radius: f64) {
        self.add(Geom::Polygon(circle(origin, radius, DEFAULT_CIRCLE_STEPS)));
    }

    pub fn add_polygon(&mut self, points: &[Coord<f64>]) {
        self.add(Geom::Polygon(Polygon::new(LineString::from(points.to_vec()), vec![])));
    }

    pub fn add_polyline(&mut self, points: &[Coord<f64>]) {
        self.add(Geom::LineString(LineString::from(points.to_vec())));
    }

    pub fn is_empty(&self) -> bool {
        self.solid_geometry.is_empty()
    }

    /// Cut a polygon out of every path. Polygons are reduced to their
    /// boundary rings first, so the result is paths only.
    pub fn subtract_polygon(&mut self, points: &[Coord<f64>]) {
        let flat = self.solid_geometry.flatten(true);
        debug!("{} paths", flat.len());
        let tool = MultiPolygon::new(vec![Polygon::new(LineString::from(points.to_vec()), vec![])]);

        let mut diffs = Vec::new();
        for target in flat {
            match target {
                Geom::LineString(ls) | Geom::LinearRing(ls) => {
                    let outside = tool.clip(&MultiLineString::new(vec![ls]), true);
                    diffs.extend(outside.0.into_iter().filter(|l| l.0.len() > 1).map(Geom::LineString));
                }
                other => warn!("subtract_polygon: {} not supported", other.kind_name()),
            }
        }
        self.solid_geometry = Geom::Collection(diffs);
    }

    /// `(width, height)` of the bounds.
    pub fn size(&self) -> (f64, f64) {
        let (xmin, ymin, xmax, ymax) = self.solid_geometry.bounds();
        (xmax - xmin, ymax - ymin)
    }

    /// First polygon containing `point`.
    pub fn find_polygon(&self, point: Coord<f64>) -> Option<Polygon<f64>> {
        self.solid_geometry
            .polygons()
            .into_iter()
            .find(|p| p.contains(&Point::from(point)))
    }

    pub fn get_interiors(&self) -> Vec<LineString<f64>> {
        self.solid_geometry
            .polygons()
            .iter()
            .flat_map(|p| p.interiors().to_vec())
            .collect()
    }

    pub fn get_exteriors(&self) -> Vec<LineString<f64>> {
        self.solid_geometry
            .polygons()
            .iter()
            .map(|p| p.exterior().clone())
            .collect()
    }

    pub fn flatten(&self, pathonly: bool) -> Vec<Geom> {
        self.solid_geometry.flatten(pathonly)
    }

    /// Contours at `offset` around the geometry.
    pub fn isolation_geometry(&self, offset: f64) -> CamResult<MultiPolygon<f64>> {
        Ok(buffer(&self.solid_geometry, offset)?)
    }

    /// Area of `boundary` not covered by the geometry. The boundary
    /// defaults to the bounding box.
    pub fn get_empty_area(&self, boundary: Option<&MultiPolygon<f64>>) -> CamResult<MultiPolygon<f64>> {
        let solid = repair(&self.solid_geometry.to_multi_polygon());
        let boundary = match boundary {
            Some(b) => b.clone(),
            None => {
                let rect = self
                    .solid_geometry
                    .bounding_rect()
                    .ok_or(GeometryError::EmptyGeometry)?;
                MultiPolygon::new(vec![envelope(rect)])
            }
        };
        Ok(boundary.difference(&solid))
    }

    /// Replace a collection by the union of its areas. Paths are kept
    /// alongside the unioned areas.
    pub fn union(&mut self) {
        let flat = self.solid_geometry.flatten(false);
        let mut areas = Vec::new();
        let mut rest = Vec::new();
        for g in flat {
            match g {
                Geom::Polygon(p) => areas.push(MultiPolygon::new(vec![p])),
                Geom::MultiPolygon(mp) => areas.push(mp),
                other => rest.push(other),
            }
        }
        let merged = unary_union(areas);
        self.solid_geometry = if rest.is_empty() {
            Geom::MultiPolygon(merged)
        } else {
            rest.insert(0, Geom::MultiPolygon(merged));
            Geom::Collection(rest)
        };
    }

    /// Bounding rectangle of the geometry, if any.
    pub fn envelope(&self) -> Option<Polygon<f64>> {
        self.solid_geometry.to_multi_polygon().bounding_rect().map(envelope)
    }
}

impl Document for Geometry {
    fn kind(&self) -> &'static str {
        "geometry"
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
