//! G-Code emission.

use std::collections::BTreeMap;

use geo::{Coord, LineString, Simplify};
use tracing::{debug, info, warn};

use super::CncJob;
use crate::document::Geometry;
use crate::error::{CamResult, ParameterError};
use crate::excellon::Excellon;
use crate::geometry::Geom;
use crate::spatial_index::PathStorage;

/// Depth arithmetic in multi-pass mode runs on integer nanounits.
const DEPTH_QUANTUM: f64 = 1e9;

/// Format `values` through a printf-style template. Supports `%.Nf`,
/// `%f`, `%d` and `%%`; other text is copied.
pub fn printf(template: &str, values: &[f64]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut values = values.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = Some(digits.parse().unwrap_or(0));
        }
        match chars.next() {
            Some('f') => {
                let v = values.next().copied().unwrap_or(0.0);
                out.push_str(&format!("{:.*}", precision.unwrap_or(6), v));
            }
            Some('d') => {
                let v = values.next().copied().unwrap_or(0.0);
                out.push_str(&format!("{}", v.trunc() as i64));
            }
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

fn quantize(v: f64) -> i64 {
    (v * DEPTH_QUANTUM).round() as i64
}

fn push_line(gcode: &mut String, line: &str) {
    gcode.push_str(line);
    gcode.push('\n');
}

/// Options for [`CncJob::linear2gcode`].
#[derive(Debug, Clone, Copy)]
pub struct LinearMove {
    /// Simplification tolerance; 0 keeps every point.
    pub tolerance: f64,
    /// Plunge before cutting.
    pub down: bool,
    /// Lift after cutting.
    pub up: bool,
    /// Cut depth, defaulting to the job's `z_cut`.
    pub z_cut: Option<f64>,
    /// Skip the rapid to the first point.
    pub cont: bool,
}

impl Default for LinearMove {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            down: true,
            up: true,
            z_cut: None,
            cont: false,
        }
    }
}

impl CncJob {
    fn xy(&self, g: u8, c: Coord<f64>) -> String {
        format!("G0{} {}", g, printf(&self.coordinate_format, &[c.x, c.y]))
    }

    fn spindle_on(&self) -> String {
        match self.spindlespeed {
            Some(speed) => format!("M03 S{}", speed.trunc() as i64),
            None => "M03".to_string(),
        }
    }

    fn plunge(&self, gcode: &mut String, z: f64) {
        match self.zdownrate {
            Some(rate) => {
                push_line(gcode, &format!("F{:.2}", rate));
                push_line(gcode, &format!("G01 Z{:.4}", z));
                push_line(gcode, &format!("F{:.2}", self.feedrate));
            }
            None => push_line(gcode, &format!("G01 Z{:.4}", z)),
        }
    }

    fn preamble(&self) -> String {
        let mut gcode = String::new();
        push_line(&mut gcode, self.units.gcode());
        push_line(&mut gcode, "G90");
        push_line(&mut gcode, "G94");
        push_line(&mut gcode, &format!("F{:.2}", self.feedrate));
        push_line(&mut gcode, &format!("G00 Z{:.4}", self.z_move));
        push_line(&mut gcode, &self.spindle_on());
        gcode
    }

    /// Cut along a path.
    pub fn linear2gcode(&self, linear: &LineString<f64>, opts: LinearMove) -> String {
        let z_cut = opts.z_cut.unwrap_or(self.z_cut);
        let simplified;
        let target = if opts.tolerance > 0.0 {
            simplified = linear.simplify(&opts.tolerance);
            &simplified
        } else {
            linear
        };

        let mut gcode = String::new();
        let Some(first) = target.0.first() else {
            return gcode;
        };
        if !opts.cont {
            push_line(&mut gcode, &self.xy(0, *first));
        }
        if opts.down {
            self.plunge(&mut gcode, z_cut);
        }
        for pt in &target.0[1..] {
            push_line(&mut gcode, &self.xy(1, *pt));
        }
        if opts.up {
            push_line(&mut gcode, &format!("G00 Z{:.4}", self.z_move));
        }
        gcode
    }

    /// Rapid to a point, plunge and lift.
    pub fn point2gcode(&self, point: Coord<f64>) -> String {
        let mut gcode = String::new();
        push_line(&mut gcode, &self.xy(0, point));
        self.plunge(&mut gcode, self.z_cut);
        push_line(&mut gcode, &format!("G00 Z{:.4}", self.z_move));
        gcode
    }

    fn path2gcode(&self, geo: &Geom, opts: LinearMove) -> Option<String> {
        match geo {
            Geom::LineString(ls) | Geom::LinearRing(ls) => Some(self.linear2gcode(ls, opts)),
            Geom::Point(p) => Some(self.point2gcode(p.0)),
            other => {
                warn!("G-code generation not implemented for {}", other.kind_name());
                None
            }
        }
    }

    /// Replace the G-Code with the toolpaths of `geometry`, taking the
    /// nearest remaining path each time.
    pub fn generate_from_geometry(
        &mut self,
        geometry: &Geometry,
        tooldia: Option<f64>,
        tolerance: f64,
        multidepth: bool,
        depth_per_cut: Option<f64>,
    ) -> CamResult<()> {
        let flat = geometry.flatten(true);
        debug!("{} paths", flat.len());

        let mut storage = PathStorage::new();
        for shape in flat {
            storage.insert(shape);
        }

        if let Some(dia) = tooldia {
            self.tooldia = dia;
        }
        self.input_geometry_bounds = Some(geometry.solid_geometry.bounds());

        let z_cut = quantize(self.z_cut);
        let step = depth_per_cut.map(quantize).unwrap_or(z_cut).abs();
        if multidepth && step == 0 {
            return Err(ParameterError::InvalidValue {
                name: "depth_per_cut".to_string(),
                reason: "must be non-zero".to_string(),
            }
            .into());
        }
        if multidepth && z_cut >= 0 {
            warn!("Multi-depth with z_cut {} above the surface cuts nothing", self.z_cut);
        }

        let mut gcode = self.preamble();
        let mut path_count = 0;
        let mut current = Coord { x: 0.0, y: 0.0 };

        while let Some((pt, mut geo)) = storage.pop_nearest(current) {
            path_count += 1;
            let coords = geo.coords();
            if coords.first() != Some(&pt) && coords.last() == Some(&pt) {
                geo.reverse();
            }

            if !multidepth {
                let opts = LinearMove {
                    tolerance,
                    ..LinearMove::default()
                };
                if let Some(text) = self.path2gcode(&geo, opts) {
                    gcode.push_str(&text);
                }
            } else {
                let mut depth: i64 = 0;
                let mut reversed = false;
                while depth > z_cut {
                    depth = (depth - step).max(z_cut);
                    match &geo {
                        Geom::LineString(ls) | Geom::LinearRing(ls) => {
                            gcode.push_str(&self.linear2gcode(
                                ls,
                                LinearMove {
                                    tolerance,
                                    up: false,
                                    z_cut: Some(depth as f64 / DEPTH_QUANTUM),
                                    ..LinearMove::default()
                                },
                            ));
                        }
                        Geom::Point(p) => {
                            gcode.push_str(&self.point2gcode(p.0));
                            break;
                        }
                        other => {
                            warn!("G-code generation not implemented for {}", other.kind_name());
                            break;
                        }
                    }
                    // Open paths alternate direction so the tool never
                    // travels back to the start.
                    if matches!(geo, Geom::LineString(_)) {
                        geo.reverse();
                        reversed = !reversed;
                    }
                }
                if reversed {
                    geo.reverse();
                }
                push_line(&mut gcode, &format!("G00 Z{:.4}", self.z_move));
            }

            if let Some(last) = geo.coords().last() {
                current = *last;
            }
        }

        info!("{} paths traced.", path_count);
        push_line(&mut gcode, &format!("G00 Z{:.4}", self.z_move));
        push_line(&mut gcode, "G00 X0Y0");
        push_line(&mut gcode, "M05");
        self.gcode = gcode;
        Ok(())
    }

    /// Replace the G-Code with a drilling program for the selected tools.
    ///
    /// `tools` is `"all"` or a comma separated list of tool ids. Tools are
    /// drilled smallest first.
    pub fn generate_from_excellon_by_tool(
        &mut self,
        excellon: &Excellon,
        tools: &str,
        toolchange: bool,
        toolchangez: f64,
    ) -> CamResult<()> {
        debug!("Creating CNC Job from Excellon...");

        let mut sorted: Vec<(&String, f64)> = excellon
            .tools
            .iter()
            .map(|(id, tool)| (id, tool.diameter))
            .collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));

        let selected: Vec<String> = if tools.trim() == "all" {
            sorted.iter().map(|(id, _)| (*id).clone()).collect()
        } else {
            let wanted: Vec<String> = tools
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| t.parse::<u64>().map(|n| n.to_string()).unwrap_or_else(|_| t.to_string()))
                .collect();
            sorted
                .iter()
                .filter(|(id, _)| wanted.contains(id))
                .map(|(id, _)| (*id).clone())
                .collect()
        };
        debug!("Tools selected and sorted are: {:?}", selected);

        let mut points: BTreeMap<&str, Vec<Coord<f64>>> = BTreeMap::new();
        for drill in &excellon.drills {
            if selected.contains(&drill.tool) {
                points.entry(drill.tool.as_str()).or_default().push(drill.point);
            }
        }

        let mut gcode = self.preamble();
        for tool in &selected {
            let Some(tool_points) = points.get(tool.as_str()) else {
                continue;
            };
            if toolchange {
                push_line(&mut gcode, &format!("G00 Z{:.4}", toolchangez));
                match tool.parse::<u64>() {
                    Ok(n) => push_line(&mut gcode, &format!("T{}", n)),
                    Err(_) => push_line(&mut gcode, &format!("T{}", tool)),
                }
                push_line(&mut gcode, "M5");
                push_line(&mut gcode, "M6");
                let dia = excellon.tools.get(tool).map(|t| t.diameter).unwrap_or(0.0);
                push_line(&mut gcode, &format!("(MSG, Change to tool dia={:.4})", dia));
                push_line(&mut gcode, "M0");
                push_line(&mut gcode, &self.spindle_on());
            }
            for pt in tool_points {
                push_line(&mut gcode, &self.xy(0, *pt));
                push_line(&mut gcode, &format!("G01 Z{:.4}", self.z_cut));
                push_line(&mut gcode, "G01 Z0");
                push_line(&mut gcode, &format!("G00 Z{:.4}", self.z_move));
            }
        }
        push_line(&mut gcode, &self.xy(0, Coord { x: 0.0, y: 0.0 }));
        push_line(&mut gcode, "M05");

        info!("Drilling program for {} tools", selected.len());
        self.gcode = gcode;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excellon::{Drill, Tool};
    use geo::Point;
    use pcbcam_core::Units;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_printf() {
        assert_eq!(printf("X%.4fY%.4f", &[1.0, -0.5]), "X1.0000Y-0.5000");
        assert_eq!(printf("X%.2f Y%.3f %d%%", &[1.005, 2.0, 7.9]), "X1.00 Y2.000 7%");
        assert_eq!(printf("X%fY%f", &[1.0, 2.0]), "X1.000000Y2.000000");
    }

    #[test]
    fn test_linear2gcode_with_downrate() {
        let mut job = CncJob::new(Units::Mm);
        job.zdownrate = Some(1.5);
        job.feedrate = 10.0;
        job.z_cut = -0.1;
        job.z_move = 1.0;
        let text = job.linear2gcode(&LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]), LinearMove::default());
        assert_eq!(
            text,
            "G00 X0.0000Y0.0000\nF1.50\nG01 Z-0.1000\nF10.00\nG01 X1.0000Y0.0000\nG00 Z1.0000\n"
        );
    }

    #[test]
    fn test_geometry_program_block_structure() {
        let mut geometry = Geometry::new(Units::In);
        geometry.solid_geometry = Geom::Collection(vec![
            Geom::LineString(LineString::from(vec![(5.0, 0.0), (1.0, 0.0)])),
            Geom::Point(Point::new(10.0, 0.0)),
        ]);
        let mut job = CncJob::default();
        job.spindlespeed = Some(1000.0);
        job.generate_from_geometry(&geometry, Some(0.01), 0.0, false, None).unwrap();

        let lines: Vec<&str> = job.gcode.lines().collect();
        assert_eq!(&lines[..6], &["G20", "G90", "G94", "F3.00", "G00 Z0.1000", "M03 S1000"]);
        // The line is entered from its nearer end, (1, 0).
        assert_eq!(lines[6], "G00 X1.0000Y0.0000");
        assert_eq!(lines[7], "G01 Z-0.0020");
        assert_eq!(lines[8], "G01 X5.0000Y0.0000");
        assert_eq!(lines[10], "G00 X10.0000Y0.0000");
        assert_eq!(&lines[lines.len() - 3..], &["G00 Z0.1000", "G00 X0Y0", "M05"]);
        assert_eq!(job.tooldia, 0.01);
    }

    #[test]
    fn test_multidepth_passes() {
        let mut geometry = Geometry::new(Units::Mm);
        geometry.solid_geometry = Geom::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]));
        let mut job = CncJob::new(Units::Mm);
        job.z_cut = -0.25;
        job.generate_from_geometry(&geometry, None, 0.0, true, Some(0.1)).unwrap();

        let plunges: Vec<&str> = job.gcode.lines().filter(|l| l.starts_with("G01 Z")).collect();
        assert_eq!(plunges, vec!["G01 Z-0.1000", "G01 Z-0.2000", "G01 Z-0.2500"]);
        // Passes alternate direction.
        let cuts: Vec<&str> = job.gcode.lines().filter(|l| l.starts_with("G01 X")).collect();
        assert_eq!(cuts, vec!["G01 X1.0000Y0.0000", "G01 X0.0000Y0.0000", "G01 X1.0000Y0.0000"]);
    }

    #[test]
    fn test_multidepth_rejects_zero_step() {
        let geometry = Geometry::new(Units::Mm);
        let mut job = CncJob::new(Units::Mm);
        assert!(job.generate_from_geometry(&geometry, None, 0.0, true, Some(0.0)).is_err());
    }

    fn drills() -> Excellon {
        let mut e = Excellon::new();
        e.tools.insert("1".to_string(), Tool { diameter: 0.04 });
        e.tools.insert("2".to_string(), Tool { diameter: 0.02 });
        e.tools.insert("3".to_string(), Tool { diameter: 0.03 });
        e.drills = vec![
            Drill { point: c(1.0, 1.0), tool: "1".to_string() },
            Drill { point: c(2.0, 2.0), tool: "2".to_string() },
            Drill { point: c(3.0, 3.0), tool: "1".to_string() },
        ];
        e
    }

    #[test]
    fn test_excellon_tools_in_diameter_order() {
        let mut job = CncJob::default();
        job.generate_from_excellon_by_tool(&drills(), "1, 2", true, 0.5).unwrap();
        let tools: Vec<&str> = job.gcode.lines().filter(|l| l.starts_with('T')).collect();
        assert_eq!(tools, vec!["T2", "T1"]);
        assert!(job.gcode.ends_with("G00 X0.0000Y0.0000\nM05\n"));
    }

    #[test]
    fn test_toolchange_block() {
        let mut job = CncJob::default();
        job.generate_from_excellon_by_tool(&drills(), "2", true, 0.5).unwrap();
        let expected = "G00 Z0.5000\nT2\nM5\nM6\n(MSG, Change to tool dia=0.0200)\nM0\nM03\n\
                        G00 X2.0000Y2.0000\nG01 Z-0.0020\nG01 Z0\nG00 Z0.1000\n";
        assert!(job.gcode.contains(expected));
    }

    #[test]
    fn test_excellon_without_toolchange() {
        let mut job = CncJob::default();
        job.generate_from_excellon_by_tool(&drills(), "all", false, 0.5).unwrap();
        assert!(!job.gcode.contains("M6"));
        assert_eq!(job.gcode.matches("G01 Z0\n").count(), 3);
    }
}
