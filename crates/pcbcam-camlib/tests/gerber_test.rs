use std::cell::Cell;
use std::f64::consts::PI;
use std::panic;
use std::sync::Once;

use pcbcam_camlib::{Document, Geom, Gerber, UnionStrategy, Units};

fn parse(text: &str) -> Gerber {
    let mut g = Gerber::new();
    g.parse_str(text).expect("Failed to parse Gerber");
    g
}

const HEADER: &str = "%FSLAX24Y24*%\n%MOIN*%\n";

#[test]
fn test_clear_polarity_subtracts() {
    let text = format!(
        "{}%ADD10R,2X2*%\n%ADD11R,1X1*%\nD10*\nX0Y0D03*\n%LPC*%\nD11*\nX0Y0D03*\nM02*",
        HEADER
    );
    let g = parse(&text);
    assert!((g.solid_geometry.area() - 3.0).abs() < 1e-6);

    let polys = g.solid_geometry.polygons();
    assert_eq!(polys.len(), 1);
    assert_eq!(polys[0].interiors().len(), 1);
}

#[test]
fn test_region_becomes_polygon() {
    let text = format!(
        "{}G36*\nX0Y0D02*\nX10000Y0D01*\nX10000Y10000D01*\nX0Y10000D01*\nX0Y0D01*\nG37*\nM02*",
        HEADER
    );
    let g = parse(&text);
    assert!((g.solid_geometry.area() - 1.0).abs() < 1e-6);
}

#[test]
fn test_short_region_is_tolerated() {
    let text = format!("{}G36*\nX0Y0D02*\nX10000Y0D01*\nG37*\nM02*", HEADER);
    let g = parse(&text);
    assert!(g.solid_geometry.is_empty());
}

#[test]
fn test_multi_quadrant_full_circle() {
    let text = format!(
        "{}%ADD10C,0.01*%\nD10*\nX10000Y0D02*\nG75*\nG03X10000Y0I-10000J0D01*\nM02*",
        HEADER
    );
    let g = parse(&text);
    let (xmin, ymin, xmax, ymax) = g.bounds();
    assert!((xmin + 1.005).abs() < 1e-3);
    assert!((xmax - 1.005).abs() < 1e-3);
    assert!((ymin + 1.005).abs() < 1e-3);
    assert!((ymax - 1.005).abs() < 1e-3);
    // A thin ring, not a filled disc.
    assert!((g.solid_geometry.area() - 2.0 * PI * 0.01).abs() < 2e-3);
}

#[test]
fn test_single_quadrant_arc() {
    let text = format!(
        "{}%ADD10C,0.01*%\nD10*\nX10000Y0D02*\nG74*\nG03X0Y10000I10000J0D01*\nM02*",
        HEADER
    );
    let g = parse(&text);
    let (xmin, ymin, xmax, ymax) = g.bounds();
    // Quarter circle about the origin, found from the unsigned offsets.
    assert!(xmin > -0.01 && ymin > -0.01);
    assert!((xmax - 1.005).abs() < 1e-3 && (ymax - 1.005).abs() < 1e-3);
}

#[test]
fn test_single_quadrant_arc_with_negative_offset() {
    let text = format!(
        "{}%ADD10C,0.01*%\nD10*\nX10000Y0D02*\nG74*\nG03X0Y10000I-10000J0D01*\nM02*",
        HEADER
    );
    let g = parse(&text);
    let (xmin, ymin, xmax, ymax) = g.bounds();
    assert!((xmin + 0.005).abs() < 1e-3 && (ymin + 0.005).abs() < 1e-3);
    assert!((xmax - 1.005).abs() < 1e-3 && (ymax - 1.005).abs() < 1e-3);
    // A quarter of the unit circle stroked 0.01 wide, not a longer sweep.
    let quarter = PI / 2.0 * 0.01 + PI * 0.005 * 0.005;
    assert!((g.solid_geometry.area() - quarter).abs() / quarter < 0.05);
}

thread_local! {
    static PANICS: Cell<usize> = const { Cell::new(0) };
}

/// Run `f`, counting panics raised on this thread, caught or not.
fn count_panics<R>(f: impl FnOnce() -> R) -> (R, usize) {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            PANICS.with(|c| c.set(c.get() + 1));
            previous(info);
        }));
    });
    PANICS.with(|c| c.set(0));
    let result = f();
    (result, PANICS.with(|c| c.get()))
}

#[test]
fn test_default_union_does_not_panic() {
    let files = [
        format!("{}%ADD10R,1X1*%\nD10*\nX0Y0D03*\nX5000Y0D03*\nM02*", HEADER),
        format!("{}%ADD10C,0.01*%\nD10*\nX0Y0D02*\nX10000Y0D01*\nM02*", HEADER),
        format!(
            "{}%ADD10C,0.01*%\nD10*\nX10000Y0D02*\nG75*\nG03X10000Y0I-10000J0D01*\nM02*",
            HEADER
        ),
    ];
    for text in &files {
        let (g, panics) = count_panics(|| parse(text));
        assert_eq!(panics, 0, "panicked while parsing {:?}", text);
        assert!(!g.solid_geometry.is_empty());
    }
}

#[test]
fn test_default_union_merges_touching_pads() {
    // Pads 1e-9 apart end up as one polygon.
    let g = parse("%FSLAX29Y29*%\n%MOIN*%\n%ADD10R,1X1*%\nD10*\nX0Y0D03*\nX1000000001Y0D03*\nM02*");
    assert_eq!(g.union_strategy, UnionStrategy::BufferGrowShrink);
    assert_eq!(g.solid_geometry.polygons().len(), 1);
    assert!((g.solid_geometry.area() - 2.0).abs() < 1e-6);
}

#[test]
fn test_macro_aperture_flash() {
    let text = format!(
        "{}%AMDONUT*1,1,$1,0,0*1,0,$2,0,0*%\n%ADD12DONUT,0.5X0.25*%\nD12*\nX0Y0D03*\nM02*",
        HEADER
    );
    let g = parse(&text);
    assert!(g.aperture_macros.contains_key("DONUT"));
    let expected = PI * (0.25 * 0.25 - 0.125 * 0.125);
    assert!((g.solid_geometry.area() - expected).abs() / expected < 1e-2);
}

#[test]
fn test_metric_mode_converts() {
    let g = parse("%FSLAX24Y24*%\n%MOMM*%\n%ADD10R,1X1*%\nD10*\nX0Y0D03*\nM02*");
    assert_eq!(g.units, Units::Mm);
    assert!((g.solid_geometry.area() - 1.0).abs() < 1e-6);
}

#[test]
fn test_exact_union_strategy() {
    let mut g = Gerber::new();
    g.union_strategy = UnionStrategy::Exact;
    g.parse_str("%FSLAX24Y24*%\n%ADD10R,1X1*%\nD10*\nX0Y0D03*\nX5000Y0D03*\nM02*")
        .expect("Failed to parse Gerber");
    assert_eq!(g.solid_geometry.polygons().len(), 1);
    assert!((g.solid_geometry.area() - 1.5).abs() < 1e-9);
}

#[test]
fn test_follow_mode_keeps_centre_lines() {
    let mut g = Gerber::new();
    g.follow = true;
    g.parse_str("%FSLAX24Y24*%\n%ADD10C,0.1*%\nD10*\nX0Y0D02*\nX10000Y0D01*\nX20000Y0D03*\nM02*")
        .expect("Failed to parse Gerber");
    let paths = g.solid_geometry.flatten(true);
    assert_eq!(paths.len(), 1);
    assert!(matches!(&paths[0], Geom::LineString(ls) if ls.0.len() == 2));
}

#[test]
fn test_parse_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("top.gtl");
    std::fs::write(&path, format!("{}%ADD10C,0.1*%\nD10*\nX0Y0D03*\nM02*\n", HEADER))?;

    let mut g = Gerber::new();
    g.parse_file(&path)?;
    assert_eq!(g.apertures.len(), 1);
    assert!(!g.solid_geometry.is_empty());
    Ok(())
}

#[test]
fn test_dict_round_trip() -> anyhow::Result<()> {
    let g = parse(&format!("{}%ADD10C,0.1*%\nD10*\nX0Y0D03*\nM02*", HEADER));
    let restored = Gerber::from_dict(g.to_dict()?)?;
    assert_eq!(restored.apertures, g.apertures);
    assert_eq!(restored.units, g.units);
    assert!((restored.solid_geometry.area() - g.solid_geometry.area()).abs() < 1e-9);
    Ok(())
}
