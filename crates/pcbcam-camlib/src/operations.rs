//! CAM operations
//!
//! Each operation reads a source document and returns new documents; the
//! caller decides how to name and store them.

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use pcbcam_core::GeometryError;
use tracing::{debug, info, warn};

use crate::cncjob::CncJob;
use crate::document::{Document, Geometry};
use crate::error::{CamResult, ParameterError};
use crate::excellon::Excellon;
use crate::geometry::{buffer, circle, clear_polygon, clear_polygon2, Geom, DEFAULT_CIRCLE_STEPS};
use crate::gerber::Gerber;
use crate::options::{ExcellonOptions, Gaps, GeometryOptions, PaintMethod};

/// Simplification applied to toolpaths before emitting G-Code.
pub const CNC_TOLERANCE: f64 = 0.0005;

fn reverse_exteriors(mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(
        mp.0.into_iter()
            .map(|p| {
                let (exterior, interiors) = p.into_inner();
                let mut coords = exterior.0;
                coords.reverse();
                Polygon::new(LineString::from(coords), interiors)
            })
            .collect(),
    )
}

/// Offset of isolation pass `i` (zero based).
pub fn isolation_offset(i: usize, dia: f64, overlap: f64) -> f64 {
    let i = i as f64;
    (2.0 * i + 1.0) / 2.0 * dia - i * overlap * dia
}

/// Isolation routing around the copper of `gerber`.
///
/// The first pass is reversed so the tool cuts the copper edges in
/// conventional direction. With `combine` the result is one geometry
/// holding every pass; otherwise one geometry per pass.
pub fn isolate(gerber: &Gerber, dia: f64, passes: usize, overlap: f64, combine: bool) -> CamResult<Vec<Geometry>> {
    ParameterError::require_positive("isotooldia", dia)?;
    ParameterError::require_range("isooverlap", overlap, 0.0, 1.0)?;
    if passes == 0 {
        return Err(ParameterError::OutOfRange {
            name: "isopasses".to_string(),
            value: 0.0,
            min: 1.0,
            max: f64::INFINITY,
        }
        .into());
    }

    let mut envelopes = Vec::with_capacity(passes);
    for i in 0..passes {
        let offset = isolation_offset(i, dia, overlap);
        debug!("Isolation pass {} at offset {}", i + 1, offset);
        let mut geom = buffer(&gerber.solid_geometry, offset)?;
        if i == 0 {
            geom = reverse_exteriors(geom);
        }
        envelopes.push(Geom::MultiPolygon(geom));
    }

    if combine {
        Ok(vec![Geometry::with_geometry(gerber.units, Geom::Collection(envelopes))])
    } else {
        Ok(envelopes
            .into_iter()
            .map(|g| Geometry::with_geometry(gerber.units, g))
            .collect())
    }
}

/// The layer's geometry as a plain geometry document.
pub fn follow(gerber: &Gerber) -> Geometry {
    Geometry::with_geometry(gerber.units, gerber.solid_geometry.clone())
}

/// Bounding box grown by `margin`, minus the copper.
pub fn non_copper(gerber: &Gerber, margin: f64, rounded: bool) -> CamResult<Geometry> {
    let bbox = gerber.get_bounding_box(margin, rounded)?;
    let empty = bbox.difference(&gerber.solid_geometry.to_multi_polygon());
    Ok(Geometry::with_geometry(gerber.units, Geom::MultiPolygon(empty)))
}

pub fn bounding_box(gerber: &Gerber, margin: f64, rounded: bool) -> CamResult<Geometry> {
    let bbox = gerber.get_bounding_box(margin, rounded)?;
    Ok(Geometry::with_geometry(gerber.units, Geom::MultiPolygon(bbox)))
}

/// Board outline cut with holding gaps.
///
/// The bounds are grown by `margin` plus the tool radius and the outline
/// is split into open polylines leaving gaps of `gap_size` plus the tool
/// diameter.
pub fn cutout(source: &impl Document, margin: f64, gap_size: f64, tooldia: f64, gaps: Gaps) -> CamResult<Geometry> {
    if source.solid_geometry().is_empty() {
        return Err(GeometryError::EmptyGeometry.into());
    }
    let margin = margin + tooldia / 2.0;
    let gap = gap_size + tooldia;
    let (mut minx, mut miny, mut maxx, mut maxy) = source.bounds();
    minx -= margin;
    maxx += margin;
    miny -= margin;
    maxy += margin;
    let midx = 0.5 * (minx + maxx);
    let midy = 0.5 * (miny + maxy);
    let hgap = 0.5 * gap;

    let pts = [
        (midx - hgap, maxy),
        (minx, maxy),
        (minx, midy + hgap),
        (minx, midy - hgap),
        (minx, miny),
        (midx - hgap, miny),
        (midx + hgap, miny),
        (maxx, miny),
        (maxx, midy - hgap),
        (maxx, midy + hgap),
        (maxx, maxy),
        (midx + hgap, maxy),
    ];
    let segments: Vec<Vec<usize>> = match gaps {
        Gaps::TopBottom => vec![vec![0, 1, 4, 5], vec![6, 7, 10, 11]],
        Gaps::LeftRight => vec![vec![9, 10, 1, 2], vec![3, 4, 7, 8]],
        Gaps::Four => vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9, 10, 11]],
    };

    let cuts = segments
        .into_iter()
        .map(|seg| Geom::LineString(LineString::from(seg.into_iter().map(|i| pts[i]).collect::<Vec<_>>())))
        .collect();
    Ok(Geometry::with_geometry(source.units(), Geom::Collection(cuts)))
}

/// Paths of a [`PathStorage`](crate::spatial_index::PathStorage) as a
/// geometry collection.
fn paths_to_geom(paths: Vec<LineString<f64>>) -> Geom {
    Geom::Collection(paths.into_iter().map(Geom::from).collect())
}

/// Clear all copper-free area, largest tool first.
///
/// Each tool clears what the larger tools could not reach. Returns one
/// geometry per tool that had something to clear, paired with its
/// diameter.
pub fn ncc(gerber: &Gerber, tools: &[f64], overlap: f64, margin: f64) -> CamResult<Vec<(f64, Geometry)>> {
    if tools.is_empty() {
        return Err(ParameterError::Missing("ncctools".to_string()).into());
    }
    for &tool in tools {
        ParameterError::require_positive("ncctools", tool)?;
    }
    ParameterError::require_range("nccoverlap", overlap, 0.0, 1.0)?;

    let mut tools = tools.to_vec();
    tools.sort_by(|a, b| b.total_cmp(a));

    let boundary = gerber.get_bounding_box(margin, false)?;
    let empty = Geom::MultiPolygon(boundary.difference(&gerber.solid_geometry.to_multi_polygon()));

    let mut cleared = MultiPolygon::new(vec![]);
    let mut offset: f64 = tools.iter().sum();
    let mut results = Vec::new();

    for tool in tools {
        offset -= tool;
        let area = buffer(&empty, -offset)?.difference(&cleared);
        if area.0.is_empty() {
            debug!("Nothing left to clear with tool {}", tool);
            break;
        }

        let shrunk = buffer(&empty, -offset * (1.0 + overlap))?;
        let opened = buffer(&Geom::MultiPolygon(shrunk), -tool / 2.0)?;
        cleared = buffer(&Geom::MultiPolygon(opened), tool / 2.0)?;

        let mut paths = Vec::new();
        for poly in area.0 {
            match clear_polygon(&MultiPolygon::new(vec![poly]), tool, overlap) {
                Ok(storage) => paths.extend(storage.into_objects()),
                Err(e) => warn!("Polygon is omitted: {}", e),
            }
        }
        info!("Non-copper clearing with tool {}: {} paths", tool, paths.len());
        results.push((tool, Geometry::with_geometry(gerber.units, paths_to_geom(paths))));
    }
    Ok(results)
}

/// Fill the polygon under `point` with toolpaths.
pub fn paint(
    geometry: &Geometry,
    point: Coord<f64>,
    tooldia: f64,
    overlap: f64,
    margin: f64,
    method: PaintMethod,
) -> CamResult<Geometry> {
    let poly = geometry
        .find_polygon(point)
        .ok_or(GeometryError::NoPolygonAtPoint { x: point.x, y: point.y })?;
    let area = buffer(&Geom::Polygon(poly), -margin)?;

    let storage = match method {
        PaintMethod::Seed => clear_polygon2(&area, tooldia, None, overlap)?,
        PaintMethod::Standard => clear_polygon(&area, tooldia, overlap)?,
    };
    Ok(Geometry::with_geometry(geometry.units, paths_to_geom(storage.into_objects())))
}

/// Rings that mill out the selected drill holes with a smaller tool.
pub fn mill_drills(excellon: &Excellon, tools: &[String], tooldia: f64) -> CamResult<Geometry> {
    if tools.is_empty() {
        return Err(ParameterError::Missing("tools".to_string()).into());
    }
    let tools: Vec<String> = tools
        .iter()
        .map(|t| t.trim().parse::<u64>().map(|n| n.to_string()).unwrap_or_else(|_| t.trim().to_string()))
        .collect();

    for id in &tools {
        let tool = excellon.tools.get(id).ok_or_else(|| ParameterError::InvalidValue {
            name: "tools".to_string(),
            reason: format!("no tool {}", id),
        })?;
        if tool.diameter < tooldia {
            return Err(ParameterError::InvalidValue {
                name: "tooldia".to_string(),
                reason: format!("milling tool {} is larger than hole {}", tooldia, tool.diameter),
            }
            .into());
        }
    }

    let mut rings = Vec::new();
    for drill in excellon.drills.iter().filter(|d| tools.contains(&d.tool)) {
        let Some(tool) = excellon.tools.get(&drill.tool) else {
            continue;
        };
        let radius = tool.diameter / 2.0 - tooldia / 2.0;
        if radius <= 0.0 {
            debug!("Hole at {:?} matches the tool; plunging only", drill.point);
            rings.push(Geom::Point(drill.point.into()));
            continue;
        }
        let ring = circle(drill.point, radius, DEFAULT_CIRCLE_STEPS).exterior().clone();
        rings.push(Geom::LinearRing(ring));
    }
    info!("{} holes to mill", rings.len());
    Ok(Geometry::with_geometry(excellon.units, Geom::Collection(rings)))
}

/// Machine `geometry` with the settings in `options`.
pub fn geometry_to_cncjob(geometry: &Geometry, options: &GeometryOptions) -> CamResult<CncJob> {
    geometry_to_cncjob_with(CncJob::new(geometry.units), geometry, options)
}

/// [`geometry_to_cncjob`] on a prepared job, keeping its output format and
/// plunge rate.
pub fn geometry_to_cncjob_with(mut job: CncJob, geometry: &Geometry, options: &GeometryOptions) -> CamResult<CncJob> {
    job.units = geometry.units;
    job.z_cut = options.cutz;
    job.z_move = options.travelz;
    job.feedrate = options.feedrate;
    job.spindlespeed = options.spindlespeed;
    job.generate_from_geometry(
        geometry,
        Some(options.cnctooldia),
        CNC_TOLERANCE,
        options.multidepth,
        Some(options.depthperpass),
    )?;
    job.gcode_parse();
    job.create_geometry();
    Ok(job)
}

/// Drill the selected tools of `excellon` with the settings in `options`.
pub fn excellon_to_cncjob(excellon: &Excellon, options: &ExcellonOptions, tools: &str) -> CamResult<CncJob> {
    excellon_to_cncjob_with(CncJob::new(excellon.units), excellon, options, tools)
}

pub fn excellon_to_cncjob_with(
    mut job: CncJob,
    excellon: &Excellon,
    options: &ExcellonOptions,
    tools: &str,
) -> CamResult<CncJob> {
    if tools.trim().is_empty() {
        return Err(ParameterError::Missing("tools".to_string()).into());
    }
    job.units = excellon.units;
    job.kind = "excellon".to_string();
    job.z_cut = options.drillz;
    job.z_move = options.travelz;
    job.feedrate = options.feedrate;
    job.spindlespeed = options.spindlespeed;
    job.generate_from_excellon_by_tool(excellon, tools, options.toolchange, options.toolchangez)?;
    job.gcode_parse();
    job.create_geometry();
    Ok(job)
}
