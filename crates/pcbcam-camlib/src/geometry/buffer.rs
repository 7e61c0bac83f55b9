//! Buffering, unions and repair
//!
//! Polygons are offset with `cavalier_contours`, whose arc output is
//! linearised back into `geo` polygons. Lines are buffered as a union of
//! stadium segments and points as n-gon circles.

use std::f64::consts::PI;
use std::panic;

use cavalier_contours::polyline::{PlineSource, PlineSourceMut, PlineVertex, Polyline};
use cavalier_contours::shape_algorithms::{Shape, ShapeOffsetOptions};
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Contains, Coord, LineString, MultiPolygon, Point, Polygon, Rect};
use pcbcam_core::GeometryError;
use tracing::warn;

use super::arc::{arc, ArcDirection};
use super::Geom;

/// Segments used for a full circle when buffering.
pub const DEFAULT_CIRCLE_STEPS: usize = 64;

/// Cap resolution of the bands used by [`grow_shrink`].
const BAND_STEPS: usize = 8;

/// Drop repeated vertices and a duplicated closing vertex.
pub fn clean_polyline(mut pline: Polyline<f64>) -> Polyline<f64> {
    pline.remove_repeat_pos(1e-9);
    if pline.is_closed() && pline.vertex_count() > 1 {
        if let (Some(first), Some(last)) = (pline.get(0), pline.get(pline.vertex_count() - 1)) {
            if (first.x - last.x).abs() < 1e-9 && (first.y - last.y).abs() < 1e-9 {
                pline.remove(pline.vertex_count() - 1);
            }
        }
    }
    pline
}

/// Regular n-gon approximating a circle.
pub fn circle(center: Coord<f64>, radius: f64, steps: usize) -> Polygon<f64> {
    let steps = steps.max(3);
    let ring: Vec<Coord<f64>> = (0..steps)
        .map(|i| {
            let t = 2.0 * PI * i as f64 / steps as f64;
            Coord {
                x: center.x + radius * t.cos(),
                y: center.y + radius * t.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

/// Capsule of half-width `radius` around segment `a`-`b`.
pub fn stadium(a: Coord<f64>, b: Coord<f64>, radius: f64, steps: usize) -> Polygon<f64> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    if dx.hypot(dy) < 1e-12 {
        return circle(a, radius, steps);
    }
    let heading = dy.atan2(dx);
    let half = (steps / 2).max(2);
    let mut ring = arc(
        b,
        radius,
        heading - PI / 2.0,
        heading + PI / 2.0,
        ArcDirection::Ccw,
        half * 2,
    );
    ring.extend(arc(
        a,
        radius,
        heading + PI / 2.0,
        heading + 3.0 * PI / 2.0,
        ArcDirection::Ccw,
        half * 2,
    ));
    Polygon::new(LineString::from(ring), vec![])
}

/// Rectangle polygon of a bounding box.
pub fn envelope(rect: Rect<f64>) -> Polygon<f64> {
    rect.to_polygon()
}

/// Round-capped, round-joined buffer of a polyline.
pub fn buffer_line(coords: &[Coord<f64>], radius: f64, steps: usize) -> MultiPolygon<f64> {
    if radius <= 0.0 || coords.is_empty() {
        return MultiPolygon::new(vec![]);
    }
    if coords.len() == 1 {
        return MultiPolygon::new(vec![circle(coords[0], radius, steps)]);
    }
    let pieces = coords
        .windows(2)
        .map(|w| MultiPolygon::new(vec![stadium(w[0], w[1], radius, steps)]))
        .collect();
    unary_union(pieces)
}

/// Union of many multipolygons, merged pairwise to keep operands small.
pub fn unary_union(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    parts.retain(|p| !p.0.is_empty());
    if parts.is_empty() {
        return MultiPolygon::new(vec![]);
    }
    while parts.len() > 1 {
        let mut next = Vec::with_capacity(parts.len() / 2 + 1);
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        parts = next;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Zero-width repair: resolves self-intersections and overlaps.
pub fn repair(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    mp.union(&MultiPolygon::new(vec![]))
}

/// Grow then shrink by `eps`, closing gaps and slits narrower than
/// `2 * eps` left by a union.
///
/// Both steps are boolean operations against a band of width `eps` around
/// the rings, so no offsetting is involved at this scale.
pub fn grow_shrink(mp: &MultiPolygon<f64>, eps: f64) -> MultiPolygon<f64> {
    let merged = repair(mp);
    if merged.0.is_empty() || eps <= 0.0 {
        return merged;
    }
    let grown = merged.union(&ring_band(&merged, eps));
    let closed = grown.difference(&ring_band(&grown, eps));
    // Specks left where the band edges meet.
    let dust = eps * eps;
    MultiPolygon::new(closed.0.into_iter().filter(|p| p.unsigned_area() > dust).collect())
}

/// Points within `eps` of any ring of `mp`.
fn ring_band(mp: &MultiPolygon<f64>, eps: f64) -> MultiPolygon<f64> {
    let bands = mp
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .map(|ring| buffer_line(&ring.0, eps, BAND_STEPS))
        .collect();
    unary_union(bands)
}

/// Buffer any geometry by `dist`. Negative distances shrink areas and
/// erase lines and points.
pub fn buffer(geom: &Geom, dist: f64) -> Result<MultiPolygon<f64>, GeometryError> {
    buffer_with_steps(geom, dist, DEFAULT_CIRCLE_STEPS)
}

pub fn buffer_with_steps(
    geom: &Geom,
    dist: f64,
    steps: usize,
) -> Result<MultiPolygon<f64>, GeometryError> {
    match geom {
        Geom::Point(p) if dist > 0.0 => Ok(MultiPolygon::new(vec![circle(p.0, dist, steps)])),
        Geom::Point(_) => Ok(MultiPolygon::new(vec![])),
        Geom::LineString(ls) | Geom::LinearRing(ls) => Ok(buffer_line(&ls.0, dist, steps)),
        Geom::Polygon(p) => offset_polygons(&MultiPolygon::new(vec![p.clone()]), dist, steps),
        Geom::MultiPolygon(mp) => offset_polygons(mp, dist, steps),
        Geom::Collection(items) => {
            let mut parts = Vec::with_capacity(items.len());
            let mut areas = Vec::new();
            for item in items {
                match item {
                    Geom::Polygon(p) => areas.push(p.clone()),
                    Geom::MultiPolygon(mp) => areas.extend(mp.0.iter().cloned()),
                    other => parts.push(buffer_with_steps(other, dist, steps)?),
                }
            }
            if !areas.is_empty() {
                let merged = repair(&MultiPolygon::new(areas));
                parts.push(offset_polygons(&merged, dist, steps)?);
            }
            Ok(unary_union(parts))
        }
    }
}

fn ring_to_pline(ring: &LineString<f64>) -> Polyline<f64> {
    let mut pline = Polyline::new();
    for c in &ring.0 {
        pline.add_vertex(PlineVertex::new(c.x, c.y, 0.0));
    }
    pline.set_is_closed(true);
    clean_polyline(pline)
}

/// Linearise a closed polyline with arc segments.
fn pline_to_ring(pline: &Polyline<f64>, steps: usize) -> LineString<f64> {
    let count = pline.vertex_count();
    let mut points = Vec::with_capacity(count);
    for i in 0..count {
        let v1 = pline.at(i);
        let v2 = pline.at((i + 1) % count);
        points.push(Coord { x: v1.x, y: v1.y });

        if v1.bulge.abs() > 1e-9 {
            let theta = 4.0 * v1.bulge.atan();
            let dx = v2.x - v1.x;
            let dy = v2.y - v1.y;
            let chord = dx.hypot(dy);
            // Arcs shorter than a micron add nothing but vertices.
            if chord > 1e-6 {
                let radius = chord / (2.0 * (theta / 2.0).sin());
                let dist_to_center = radius.abs() * (theta.abs() / 2.0).cos();
                let sign = if v1.bulge > 0.0 { 1.0 } else { -1.0 };
                let center = Coord {
                    x: (v1.x + v2.x) / 2.0 - dy / chord * dist_to_center * sign,
                    y: (v1.y + v2.y) / 2.0 + dx / chord * dist_to_center * sign,
                };
                let start = (v1.y - center.y).atan2(v1.x - center.x);
                let stop = (v2.y - center.y).atan2(v2.x - center.x);
                let direction = if v1.bulge > 0.0 {
                    ArcDirection::Ccw
                } else {
                    ArcDirection::Cw
                };
                let pts = arc(center, radius.abs(), start, stop, direction, steps);
                // Interior points only; the endpoints are the vertices.
                points.extend_from_slice(&pts[1..pts.len() - 1]);
            }
        }
    }
    if let Some(first) = points.first().copied() {
        points.push(first);
    }
    LineString::from(points)
}

/// Offset polygons outward (`dist > 0`) or inward (`dist < 0`).
fn offset_polygons(
    mp: &MultiPolygon<f64>,
    dist: f64,
    steps: usize,
) -> Result<MultiPolygon<f64>, GeometryError> {
    if mp.0.is_empty() {
        return Ok(MultiPolygon::new(vec![]));
    }
    if dist == 0.0 {
        return Ok(repair(mp));
    }

    let mut plines = Vec::new();
    for poly in &mp.0 {
        let poly = poly.orient(Direction::Default);
        plines.push(ring_to_pline(poly.exterior()));
        plines.extend(poly.interiors().iter().map(ring_to_pline));
    }
    plines.retain(|p| p.vertex_count() > 2);

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let shape = Shape::from_plines(plines);
        shape.parallel_offset(-dist, ShapeOffsetOptions::default())
    }));
    let shape = match result {
        Ok(shape) => shape,
        Err(_) => {
            warn!("Panic during parallel offset by {}", dist);
            return Err(GeometryError::OffsetFailed {
                distance: dist,
                reason: "offset engine panicked".to_string(),
            });
        }
    };

    let outers: Vec<Polygon<f64>> = shape
        .ccw_plines
        .iter()
        .map(|ip| Polygon::new(pline_to_ring(&ip.polyline, steps), vec![]))
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();
    let holes: Vec<Polygon<f64>> = shape
        .cw_plines
        .iter()
        .map(|ip| Polygon::new(pline_to_ring(&ip.polyline, steps), vec![]))
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();

    Ok(assemble(outers, holes))
}

/// Cut each hole from the smallest outer ring that contains it, then
/// union everything.
fn assemble(outers: Vec<Polygon<f64>>, holes: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut owned: Vec<Vec<Polygon<f64>>> = vec![Vec::new(); outers.len()];
    for hole in holes {
        let probe = match hole.exterior().0.first() {
            Some(c) => Point::from(*c),
            None => continue,
        };
        let owner = outers
            .iter()
            .enumerate()
            .filter(|(_, o)| o.contains(&probe))
            .min_by(|(_, a), (_, b)| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(|(i, _)| i);
        match owner {
            Some(i) => owned[i].push(hole),
            None => warn!("Offset produced a hole outside every outer ring"),
        }
    }

    let parts = outers
        .into_iter()
        .zip(owned)
        .map(|(outer, holes)| {
            let outer = MultiPolygon::new(vec![outer]);
            if holes.is_empty() {
                outer
            } else {
                outer.difference(&unary_union(
                    holes.into_iter().map(|h| MultiPolygon::new(vec![h])).collect(),
                ))
            }
        })
        .collect();
    unary_union(parts)
}

/// Rectangular grow of a bounding box, for square-cornered margins.
pub fn grow_rect(rect: Rect<f64>, margin: f64) -> Polygon<f64> {
    Rect::new(
        Coord {
            x: rect.min().x - margin,
            y: rect.min().y - margin,
        },
        Coord {
            x: rect.max().x + margin,
            y: rect.max().y + margin,
        },
    )
    .to_polygon()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(size: f64) -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
        ]
    }

    #[test]
    fn test_circle_area() {
        let c = circle(Coord { x: 0.0, y: 0.0 }, 1.0, 256);
        assert!((c.unsigned_area() - PI).abs() < 1e-3);
    }

    #[test]
    fn test_line_buffer_area() {
        let mp = buffer_line(&[Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 0.0 }], 0.5, 128);
        let expected = 10.0 + PI * 0.25;
        assert!((mp.unsigned_area() - expected).abs() < 0.01);
    }

    #[test]
    fn test_inward_offset_of_square() {
        let mp = buffer(&Geom::Polygon(square(4.0)), -1.0).unwrap();
        assert!((mp.unsigned_area() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_outward_offset_has_round_corners() {
        let mp = buffer(&Geom::Polygon(square(4.0)), 1.0).unwrap();
        let expected = 16.0 + 4.0 * 4.0 + PI;
        assert!((mp.unsigned_area() - expected).abs() < 0.02);
    }

    #[test]
    fn test_offset_keeps_holes() {
        let with_hole = Polygon::new(
            square(10.0).exterior().clone(),
            vec![LineString::from(vec![
                (4.0, 4.0),
                (6.0, 4.0),
                (6.0, 6.0),
                (4.0, 6.0),
                (4.0, 4.0),
            ])],
        );
        let mp = buffer(&Geom::Polygon(with_hole), -0.5).unwrap();
        // 9x9 minus a hole grown to 3x3 with rounded corners.
        let hole = 4.0 + 4.0 * 2.0 * 0.5 + PI * 0.25;
        assert!((mp.unsigned_area() - (81.0 - hole)).abs() < 0.02);
    }

    #[test]
    fn test_shrink_to_nothing() {
        let mp = buffer(&Geom::Polygon(square(1.0)), -0.6).unwrap();
        assert!(mp.0.is_empty());
    }

    #[test]
    fn test_unary_union_merges_overlaps() {
        let a = MultiPolygon::new(vec![square(2.0)]);
        let mut b = square(2.0);
        use geo::Translate;
        b = b.translate(1.0, 0.0);
        let u = unary_union(vec![a, MultiPolygon::new(vec![b]), MultiPolygon::new(vec![])]);
        assert_eq!(u.0.len(), 1);
        assert!((u.unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_grow_shrink_keeps_area() {
        let mp = MultiPolygon::new(vec![square(2.0)]);
        let out = grow_shrink(&mp, 1e-8);
        assert_eq!(out.0.len(), 1);
        assert!((out.unsigned_area() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_grow_shrink_closes_hairline_gap() {
        use geo::Translate;
        let left = square(1.0);
        let right = square(1.0).translate(1.0 + 1e-9, 0.0);
        let out = grow_shrink(&MultiPolygon::new(vec![left, right]), 1e-8);
        assert_eq!(out.0.len(), 1);
        assert!((out.unsigned_area() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_grow_shrink_keeps_real_gaps() {
        use geo::Translate;
        let left = square(1.0);
        let right = square(1.0).translate(1.001, 0.0);
        let out = grow_shrink(&MultiPolygon::new(vec![left, right]), 1e-8);
        assert_eq!(out.0.len(), 2);
        assert!((out.unsigned_area() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_buffer_erases_lines() {
        let g = Geom::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]));
        assert!(buffer(&g, -0.1).unwrap().0.is_empty());
        assert!(buffer(&Geom::Point(Point::new(0.0, 0.0)), 0.0).unwrap().0.is_empty());
    }
}
