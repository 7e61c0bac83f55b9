//! Area clearing and path chaining
//!
//! Both clearing strategies produce open tool-centre paths inside a
//! polygon and hand them to [`paint_connect`], which joins consecutive
//! paths whenever the straight move between them stays inside the
//! polygon.

use geo::{Area, BooleanOps, Coord, InteriorPoint, LineString, MultiLineString, MultiPolygon};
use tracing::{debug, warn};

use super::buffer::{buffer, circle, stadium, DEFAULT_CIRCLE_STEPS};
use super::Geom;
use crate::error::{CamResult, ParameterError};
use crate::spatial_index::PathStorage;

/// Upper bound on inset or ring passes for one polygon.
const MAX_PASSES: usize = 100_000;

fn validate(tooldia: f64, overlap: f64) -> Result<(), ParameterError> {
    ParameterError::require_positive("tooldia", tooldia)?;
    ParameterError::require_range("overlap", overlap, 0.0, 1.0)
}

fn insert_rings(storage: &mut PathStorage<LineString<f64>>, mp: &MultiPolygon<f64>) {
    for poly in &mp.0 {
        storage.insert(poly.exterior().clone());
        for interior in poly.interiors() {
            storage.insert(interior.clone());
        }
    }
}

/// Shrink-and-trace clearing.
///
/// Insets the polygon by half the tool and then by one stepover at a time,
/// collecting every ring until nothing is left.
pub fn clear_polygon(
    polygon: &MultiPolygon<f64>,
    tooldia: f64,
    overlap: f64,
) -> CamResult<PathStorage<LineString<f64>>> {
    validate(tooldia, overlap)?;
    debug!("clear_polygon(tooldia={}, overlap={})", tooldia, overlap);

    let mut storage = PathStorage::new();
    let mut current = buffer(&Geom::MultiPolygon(polygon.clone()), -tooldia / 2.0)?;
    insert_rings(&mut storage, &current);

    let step = tooldia * (1.0 - overlap);
    let mut passes = 0;
    loop {
        current = buffer(&Geom::MultiPolygon(current), -step)?;
        if current.unsigned_area() <= 0.0 {
            break;
        }
        insert_rings(&mut storage, &current);
        passes += 1;
        if passes >= MAX_PASSES {
            warn!("clear_polygon stopped after {} passes", passes);
            break;
        }
    }

    debug!("Reducing tool lifts...");
    Ok(paint_connect(storage, polygon, tooldia, None))
}

/// Grow-from-seed clearing.
///
/// Draws concentric circles around `seed` (default: an interior point of
/// the half-tool inset), keeps the parts inside the inset, and finishes
/// with the inset's own boundary.
pub fn clear_polygon2(
    polygon: &MultiPolygon<f64>,
    tooldia: f64,
    seed: Option<Coord<f64>>,
    overlap: f64,
) -> CamResult<PathStorage<LineString<f64>>> {
    validate(tooldia, overlap)?;
    debug!("clear_polygon2(tooldia={}, overlap={})", tooldia, overlap);

    let mut storage = PathStorage::new();
    let margin = buffer(&Geom::MultiPolygon(polygon.clone()), -tooldia / 2.0)?;
    let seed = match seed.or_else(|| margin.interior_point().map(|p| p.0)) {
        Some(s) => s,
        None => return Ok(storage),
    };

    let step = tooldia * (1.0 - overlap);
    let mut radius = tooldia / 2.0 * (1.0 - overlap);
    for _ in 0..MAX_PASSES {
        let ring = circle(seed, radius, DEFAULT_CIRCLE_STEPS).exterior().clone();
        let pieces = margin.clip(&MultiLineString::new(vec![ring]), false);
        if pieces.0.iter().all(|ls| ls.0.len() < 2) {
            break;
        }
        for piece in pieces.0.into_iter().filter(|ls| ls.0.len() > 1) {
            storage.insert(piece);
        }
        radius += step;
    }

    insert_rings(&mut storage, &margin);

    debug!("Reducing tool lifts...");
    Ok(paint_connect(storage, polygon, tooldia, None))
}

/// True if the straight move from `a` to `b`, widened to the tool, stays
/// inside `boundary`.
fn walk_within(a: Coord<f64>, b: Coord<f64>, tooldia: f64, boundary: &MultiPolygon<f64>) -> bool {
    let corridor = MultiPolygon::new(vec![stadium(a, b, tooldia / 2.0, DEFAULT_CIRCLE_STEPS)]);
    let outside = corridor.difference(boundary).unsigned_area();
    outside <= 1e-9 * corridor.unsigned_area().max(1e-12)
}

/// Join paths whose connecting move stays inside `boundary` and is
/// shorter than `max_walk` (default ten tool diameters).
pub fn paint_connect(
    mut storage: PathStorage<LineString<f64>>,
    boundary: &MultiPolygon<f64>,
    tooldia: f64,
    max_walk: Option<f64>,
) -> PathStorage<LineString<f64>> {
    let max_walk = max_walk.unwrap_or(10.0 * tooldia);
    let mut optimized = PathStorage::new();

    let Some((_, mut geo)) = storage.pop_nearest(Coord { x: 0.0, y: 0.0 }) else {
        return optimized;
    };
    let mut path_count = 1;

    while let Some(current) = geo.0.last().copied() {
        let Some((pt, mut candidate)) = storage.pop_nearest(current) else {
            break;
        };
        path_count += 1;

        if candidate.0.first() != Some(&pt) && candidate.0.last() == Some(&pt) {
            candidate.0.reverse();
        }

        let walk = (pt.x - current.x).hypot(pt.y - current.y);
        if walk < max_walk && walk_within(current, pt, tooldia, boundary) {
            geo.0.extend(candidate.0);
        } else {
            optimized.insert(geo);
            geo = candidate;
        }
    }

    optimized.insert(geo);
    debug!("paint_connect: {} paths into {}", path_count, optimized.len());
    optimized
}

fn is_ring(ls: &LineString<f64>) -> bool {
    ls.0.len() > 3 && ls.is_closed()
}

/// Merge open paths that share an exact endpoint.
///
/// Starting from the path nearest `origin`, the current path is extended
/// at its start and then at its end while a matching path exists. Closed
/// rings are never merged.
pub fn path_connect(
    mut storage: PathStorage<LineString<f64>>,
    origin: Coord<f64>,
) -> PathStorage<LineString<f64>> {
    let mut optimized = PathStorage::new();
    let Some((_, mut geo)) = storage.pop_nearest(origin) else {
        return optimized;
    };

    loop {
        let (Some(&start), Some(&end)) = (geo.0.first(), geo.0.last()) else {
            break;
        };

        if let Some(merged) = try_join(&mut storage, &mut geo, start, start, end) {
            if merged {
                continue;
            }
        } else {
            break;
        }
        if let Some(true) = try_join(&mut storage, &mut geo, end, start, end) {
            continue;
        }

        let Some((_, right)) = storage.pop_nearest(end) else {
            break;
        };
        if is_ring(&right) {
            optimized.insert(right);
        } else {
            optimized.insert(geo);
            geo = right;
        }
    }

    optimized.insert(geo);
    optimized
}

/// Try to attach the path nearest `probe` to `geo`.
///
/// `None` when storage is empty; `Some(false)` when the nearest path does
/// not share an endpoint.
fn try_join(
    storage: &mut PathStorage<LineString<f64>>,
    geo: &mut LineString<f64>,
    probe: Coord<f64>,
    start: Coord<f64>,
    end: Coord<f64>,
) -> Option<bool> {
    let (_, handle) = storage.nearest(probe)?;
    let other = storage.get(handle)?;
    if is_ring(other) {
        return Some(false);
    }
    let (Some(&first), Some(&last)) = (other.0.first(), other.0.last()) else {
        return Some(false);
    };

    let joined: Option<Vec<Coord<f64>>> = if first == end {
        Some(geo.0.iter().chain(other.0.iter().skip(1)).copied().collect())
    } else if last == end {
        Some(geo.0.iter().chain(other.0.iter().rev().skip(1)).copied().collect())
    } else if last == start {
        Some(other.0.iter().chain(geo.0.iter().skip(1)).copied().collect())
    } else if first == start {
        Some(other.0.iter().rev().chain(geo.0.iter().skip(1)).copied().collect())
    } else {
        None
    };

    match joined {
        Some(coords) => {
            storage.remove(handle);
            *geo = LineString::from(coords);
            Some(true)
        }
        None => Some(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Contains, Point, Polygon};

    fn square(size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
        ]])
    }

    fn line(points: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(points.to_vec())
    }

    fn length(ls: &LineString<f64>) -> f64 {
        ls.0.windows(2)
            .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
            .sum()
    }

    #[test]
    fn test_clear_polygon_paths_stay_inside() {
        let poly = square(10.0);
        let storage = clear_polygon(&poly, 1.0, 0.15).unwrap();
        assert!(!storage.is_empty());
        let inner: Polygon<f64> = polygon![
            (x: 0.49, y: 0.49),
            (x: 9.51, y: 0.49),
            (x: 9.51, y: 9.51),
            (x: 0.49, y: 9.51),
        ];
        for path in storage.objects() {
            for c in &path.0 {
                assert!(inner.contains(&Point::from(*c)), "{:?} outside", c);
            }
        }
    }

    #[test]
    fn test_clear_polygon_connects_concentric_rings() {
        let storage = clear_polygon(&square(10.0), 1.0, 0.15).unwrap();
        // Six insets; rings one stepover apart get joined.
        assert!(storage.len() < 6);
    }

    #[test]
    fn test_clear_polygon2_covers_margin() {
        let storage = clear_polygon2(&square(6.0), 1.0, None, 0.2).unwrap();
        assert!(!storage.is_empty());
        let longest = storage.objects().map(length).fold(0.0, f64::max);
        // At least the 5x5 margin boundary is cut.
        assert!(longest >= 20.0 - 1e-6);
    }

    #[test]
    fn test_seed_outside_margin_still_cuts_boundary() {
        let storage = clear_polygon2(&square(4.0), 1.0, Some(Coord { x: 50.0, y: 50.0 }), 0.1).unwrap();
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(clear_polygon(&square(4.0), 0.0, 0.1).is_err());
        assert!(clear_polygon(&square(4.0), 1.0, 1.0).is_err());
        assert!(clear_polygon2(&square(4.0), 1.0, None, -0.1).is_err());
    }

    #[test]
    fn test_paint_connect_respects_boundary() {
        // Two strips separated by a slot the tool must not cross.
        let boundary = MultiPolygon::new(vec![
            polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 2.0), (x: 0.0, y: 2.0)],
            polygon![(x: 0.0, y: 3.0), (x: 10.0, y: 3.0), (x: 10.0, y: 5.0), (x: 0.0, y: 5.0)],
        ]);
        let mut storage = PathStorage::new();
        storage.insert(line(&[(1.0, 1.0), (9.0, 1.0)]));
        storage.insert(line(&[(9.0, 4.0), (1.0, 4.0)]));
        let out = paint_connect(storage, &boundary, 0.5, None);
        assert_eq!(out.len(), 2);

        let open = square(10.0);
        let mut storage = PathStorage::new();
        storage.insert(line(&[(1.0, 1.0), (9.0, 1.0)]));
        storage.insert(line(&[(1.0, 2.0), (9.0, 2.0)]));
        let out = paint_connect(storage, &open, 0.5, None);
        let paths: Vec<_> = out.into_objects();
        assert_eq!(paths.len(), 1);
        // Second strip was reversed to start next to the first one's end.
        assert_eq!(paths[0].0[2], Coord { x: 9.0, y: 2.0 });
    }

    #[test]
    fn test_paint_connect_max_walk() {
        let open = square(100.0);
        let mut storage = PathStorage::new();
        storage.insert(line(&[(1.0, 1.0), (2.0, 1.0)]));
        storage.insert(line(&[(50.0, 1.0), (51.0, 1.0)]));
        let out = paint_connect(storage, &open, 1.0, None);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_path_connect_merges_shared_endpoints() {
        let mut storage = PathStorage::new();
        storage.insert(line(&[(0.0, 0.0), (1.0, 0.0)]));
        storage.insert(line(&[(2.0, 0.0), (1.0, 0.0)]));
        storage.insert(line(&[(2.0, 0.0), (2.0, 1.0)]));
        storage.insert(line(&[(5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 5.0)]));
        let out = path_connect(storage, Coord { x: 0.0, y: 0.0 });
        let paths = out.into_objects();
        assert_eq!(paths.len(), 2);
        let merged = paths.iter().find(|p| !is_ring(p)).unwrap();
        assert_eq!(merged.0.len(), 4);
        assert_eq!(merged.0[0], Coord { x: 0.0, y: 0.0 });
        assert_eq!(merged.0[3], Coord { x: 2.0, y: 1.0 });
    }

    #[test]
    fn test_empty_storage() {
        assert!(paint_connect(PathStorage::new(), &square(1.0), 0.1, None).is_empty());
        assert!(path_connect(PathStorage::new(), Coord { x: 0.0, y: 0.0 }).is_empty());
    }
}
