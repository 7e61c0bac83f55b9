use pcbcam::camlib::{geometry_to_cncjob, Geom, Geometry, GeometryOptions, Units};
use pcbcam::{CamObject, Color, Config, EventBus, ObjectKind, ObjectPresenter, Project, RecordingSink};
use serde_json::json;

fn project() -> Project {
    Project::with_bus(Config::default(), Box::leak(Box::new(EventBus::new())))
}

fn plot(project: &Project, name: &str) -> (RecordingSink, RecordingSink) {
    let handle = project.require(name).expect("Missing object");
    let mut presenter = ObjectPresenter::new(handle, RecordingSink::default(), RecordingSink::default());
    presenter.plot().expect("Failed to plot");
    presenter.into_sinks()
}

#[test]
fn test_gerber_polygons() {
    let project = project();
    project
        .new_object(ObjectKind::Gerber, "top", |object| {
            if let CamObject::Gerber { document, .. } = object {
                document.parse_str("%FSLAX24Y24*%\n%MOIN*%\n%ADD10R,0.1X0.1*%\nD10*\nX0Y0D03*\nX5000Y0D03*\nM02*")?;
            }
            Ok(())
        })
        .expect("Failed to create Gerber");

    let (shapes, annotations) = plot(&project, "top");
    assert_eq!(shapes.shapes.len(), 2);
    assert!(shapes.shapes.iter().all(|(g, c, face, _)| {
        matches!(g, Geom::Polygon(_)) && *c == Color::BLACK && face.is_none()
    }));
    assert_eq!(shapes.redraws, 1);
    assert!(annotations.texts.is_empty());

    pcbcam::commands::set_option(&project, "top", "solid", json!(true)).expect("Failed to set option");
    let (shapes, _) = plot(&project, "top");
    assert!(shapes.shapes.iter().all(|(_, _, face, _)| face.is_some()));
}

#[test]
fn test_plot_option_off_draws_nothing() {
    let project = project();
    project
        .new_object(ObjectKind::Geometry, "g", |object| {
            if let CamObject::Geometry { document, .. } = object {
                document.solid_geometry = Geom::Point(geo::Point::new(0.0, 0.0));
            }
            Ok(())
        })
        .expect("Failed to create geometry");
    pcbcam::commands::set_option(&project, "g", "plot", json!(false)).expect("Failed to set option");

    let (shapes, _) = plot(&project, "g");
    assert!(shapes.shapes.is_empty());
    assert_eq!(shapes.redraws, 0);
}

#[test]
fn test_excellon_outlines() {
    let project = project();
    project
        .new_object(ObjectKind::Excellon, "drl", |object| {
            if let CamObject::Excellon { document, .. } = object {
                document.parse_str("M48\nINCH,LZ\nT1C0.04\n%\nT1\nX01Y01\nX02Y01\nM30")?;
            }
            Ok(())
        })
        .expect("Failed to create Excellon");

    let (shapes, _) = plot(&project, "drl");
    assert_eq!(shapes.shapes.len(), 2);
    assert!(shapes
        .shapes
        .iter()
        .all(|(g, c, _, _)| matches!(g, Geom::LinearRing(_)) && *c == Color::RED));
}

#[test]
fn test_cncjob_paths_are_numbered() {
    let project = project();
    let path = Geometry::with_geometry(
        Units::In,
        Geom::LineString(geo::LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])),
    );
    let job = geometry_to_cncjob(&path, &GeometryOptions::default()).expect("Failed to generate");
    let count = job.gcode_parsed.len();
    assert!(count >= 2);

    project
        .new_object(ObjectKind::CncJob, "job", move |object| {
            if let CamObject::CncJob { document, .. } = object {
                *document = job;
            }
            Ok(())
        })
        .expect("Failed to create job");

    let (shapes, annotations) = plot(&project, "job");
    assert_eq!(shapes.shapes.len(), count);
    assert!(shapes.shapes.iter().all(|(g, _, face, _)| {
        matches!(g, Geom::MultiPolygon(_)) && face.is_some()
    }));
    assert_eq!(annotations.texts, (1..=count).map(|i| i.to_string()).collect::<Vec<_>>());

    // Zero tool diameter draws bare paths without labels.
    pcbcam::commands::set_option(&project, "job", "tooldia", json!(0.0)).expect("Failed to set option");
    let (shapes, annotations) = plot(&project, "job");
    assert!(shapes.shapes.iter().all(|(g, _, face, _)| matches!(g, Geom::LineString(_)) && face.is_none()));
    assert!(annotations.texts.is_empty());
}
