use geo::{BoundingRect, LineString, MultiLineString};
use pcbcam_camlib::{
    codes_split, geometry_to_cncjob, isolate, CncJob, Geom, Geometry, GeometryOptions, Gerber, LinearMove, Units,
};

fn pad_layer() -> Gerber {
    let mut g = Gerber::new();
    g.parse_str("%FSLAX24Y24*%\n%MOIN*%\n%ADD10R,0.1X0.1*%\nD10*\nX0Y0D03*\nX5000Y0D03*\nM02*")
        .expect("Failed to parse Gerber");
    g
}

#[test]
fn test_isolation_to_gcode_round_trip() -> anyhow::Result<()> {
    let passes = isolate(&pad_layer(), 0.01, 1, 0.15, true)?;
    let geometry = &passes[0];
    let mut options = GeometryOptions::default();
    options.cutz = -0.003;
    let job = geometry_to_cncjob(geometry, &options)?;

    assert!(job.gcode.starts_with("G20\nG90\nG94\nF5.00\nG00 Z0.1000\nM03\n"));
    assert!(job.gcode.ends_with("G00 Z0.1000\nG00 X0Y0\nM05\n"));

    // One travel and one cut per isolated pad, plus the final travel home.
    let cuts = job.gcode_parsed.iter().filter(|p| p.kind.tag() == "CS").count();
    assert_eq!(cuts, 2);
    assert!(job.gcode_parsed.iter().any(|p| p.kind.tag() == "TF"));
    Ok(())
}

#[test]
fn test_square_path_survives_gcode_round_trip() {
    let square = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
    let mut job = CncJob::new(Units::In);
    job.generate_from_geometry(&Geometry::with_geometry(Units::In, Geom::LineString(square)), None, 0.0, false, None)
        .expect("Failed to generate G-Code");
    job.gcode_parse();

    let cuts: Vec<LineString<f64>> = job
        .gcode_parsed
        .iter()
        .filter(|p| p.kind.tag() == "CS")
        .map(|p| p.path.clone())
        .collect();
    assert!(!cuts.is_empty());

    let length: f64 = cuts
        .iter()
        .flat_map(|ls| ls.0.windows(2).map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y)))
        .sum();
    assert!((length - 4.0).abs() < 1e-6, "cut length {}", length);

    let bbox = MultiLineString::new(cuts).bounding_rect().expect("Failed to get bounds");
    assert!(bbox.min().x.abs() < 1e-6 && bbox.min().y.abs() < 1e-6);
    assert!((bbox.max().x - 1.0).abs() < 1e-6 && (bbox.max().y - 1.0).abs() < 1e-6);
}

#[test]
fn test_multidepth_passes_from_options() -> anyhow::Result<()> {
    let geometry = Geometry::with_geometry(
        Units::Mm,
        Geom::LineString(LineString::from(vec![(0.0, 0.0), (10.0, 0.0)])),
    );
    let options = GeometryOptions {
        cutz: -1.0,
        depthperpass: 0.3,
        multidepth: true,
        ..GeometryOptions::default()
    };
    let job = geometry_to_cncjob(&geometry, &options)?;
    let plunges: Vec<&str> = job.gcode.lines().filter(|l| l.starts_with("G01 Z")).collect();
    assert_eq!(plunges, vec!["G01 Z-0.3000", "G01 Z-0.6000", "G01 Z-0.9000", "G01 Z-1.0000"]);
    assert!(job.gcode.starts_with("G21\n"));
    Ok(())
}

#[test]
fn test_spindle_and_downrate() {
    let mut job = CncJob::new(Units::Mm);
    job.spindlespeed = Some(12000.7);
    job.zdownrate = Some(50.0);
    job.feedrate = 300.0;
    job.z_cut = -0.1;

    let geometry = Geometry::with_geometry(
        Units::Mm,
        Geom::Collection(vec![Geom::LineString(LineString::from(vec![(1.0, 1.0), (2.0, 1.0)]))]),
    );
    job.generate_from_geometry(&geometry, None, 0.0, false, None)
        .expect("Failed to generate G-Code");

    assert!(job.gcode.contains("M03 S12000\n"));
    assert!(job.gcode.contains("F50.00\nG01 Z-0.1000\nF300.00\n"));
}

#[test]
fn test_custom_coordinate_format() {
    let mut job = CncJob::default();
    job.coordinate_format = "X%.2f Y%.2f".to_string();
    let text = job.linear2gcode(
        &LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
        LinearMove {
            down: false,
            up: false,
            ..LinearMove::default()
        },
    );
    assert_eq!(text, "G00 X0.00 Y0.00\nG01 X1.00 Y1.00\n");
}

#[test]
fn test_codes_split_concatenated() {
    let codes = codes_split("G01X1.5Y-2.25Z-0.1F100");
    assert_eq!(codes.len(), 5);
    assert_eq!(codes[&'Y'], -2.25);
    assert_eq!(codes[&'F'], 100.0);
}

#[test]
fn test_export_with_options() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("drill.nc");

    let mut job = CncJob::default();
    job.spindlespeed = Some(1000.0);
    job.generate_from_geometry(
        &Geometry::with_geometry(Units::In, Geom::Point(geo::Point::new(1.0, 1.0))),
        None,
        0.0,
        false,
        None,
    )?;
    job.export_gcode(&path, "(pre)", "(post)", Some(2.0))?;

    let text = std::fs::read_to_string(&path)?;
    assert!(text.starts_with("(pre)\nG20\n"));
    assert!(text.contains("M03 S1000\nG4 P2\n"));
    assert!(text.trim_end().ends_with("(post)"));
    Ok(())
}
