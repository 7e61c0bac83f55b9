use geo::{polygon, Area, BooleanOps, Coord, MultiPolygon};
use pcbcam_camlib::geometry::{buffer_line, clear_polygon, clear_polygon2, path_connect, unary_union};
use pcbcam_camlib::{paint, Geom, Geometry, PaintMethod, PathStorage, Units};

fn square_with_hole() -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon!(
        exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
        interiors: [[(x: 4.0, y: 4.0), (x: 6.0, y: 4.0), (x: 6.0, y: 6.0), (x: 4.0, y: 6.0)]],
    )])
}

#[test]
fn test_paths_keep_clear_of_hole() {
    // Distance from the 4..6 hole; the tool centre stays a radius away.
    let clearance = |c: &Coord<f64>| {
        let dx = (4.0 - c.x).max(c.x - 6.0).max(0.0);
        let dy = (4.0 - c.y).max(c.y - 6.0).max(0.0);
        dx.hypot(dy)
    };
    for storage in [
        clear_polygon(&square_with_hole(), 0.8, 0.2).expect("Failed to clear"),
        clear_polygon2(&square_with_hole(), 0.8, None, 0.2).expect("Failed to clear"),
    ] {
        assert!(!storage.is_empty());
        for path in storage.objects() {
            for c in &path.0 {
                assert!(clearance(c) > 0.4 - 1e-3, "{:?} too close to the hole", c);
            }
        }
    }
}

#[test]
fn test_standard_clearing_covers_square() {
    let tooldia = 1.0;
    let square = MultiPolygon::new(vec![polygon![
        (x: 0.0, y: 0.0),
        (x: 10.0, y: 0.0),
        (x: 10.0, y: 10.0),
        (x: 0.0, y: 10.0),
    ]]);
    let area = square.unsigned_area();

    let storage = clear_polygon(&square, tooldia, 0.0).expect("Failed to clear");
    let swept = unary_union(
        storage
            .objects()
            .map(|path| buffer_line(&path.0, tooldia / 2.0, 64))
            .collect(),
    );

    // With no overlap the round tool leaves cusps where consecutive rings
    // turn a corner, plus the four outer corners: just under 1% here.
    let covered = swept.intersection(&square).unsigned_area();
    assert!(covered >= area - 0.012 * area, "covered {} of {}", covered, area);

    // Tool centres stay a radius inside, so nothing is cut outside.
    let outside = swept.difference(&square).unsigned_area();
    assert!(outside < 1e-6, "{} cut outside the square", outside);
}

#[test]
fn test_paint_methods_on_geometry() {
    let geometry = Geometry::with_geometry(Units::Mm, Geom::MultiPolygon(square_with_hole()));
    let inside = Coord { x: 1.0, y: 1.0 };

    let standard = paint(&geometry, inside, 0.8, 0.2, 0.1, PaintMethod::Standard).expect("Failed to paint");
    let seed = paint(&geometry, inside, 0.8, 0.2, 0.1, PaintMethod::Seed).expect("Failed to paint");
    assert!(!standard.is_empty());
    assert!(!seed.is_empty());
    assert_eq!(standard.units, Units::Mm);

    // The hole is not part of any polygon.
    assert!(paint(&geometry, Coord { x: 5.0, y: 5.0 }, 0.8, 0.2, 0.1, PaintMethod::Standard).is_err());
}

#[test]
fn test_path_connect_chains_segments() {
    let mut storage = PathStorage::new();
    for i in 0..5 {
        let x = i as f64;
        storage.insert(geo::LineString::from(vec![(x, 0.0), (x + 1.0, 0.0)]));
    }
    let joined = path_connect(storage, Coord { x: 0.0, y: 0.0 }).into_objects();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].0.len(), 6);
}
