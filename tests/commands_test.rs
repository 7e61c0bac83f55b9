use geo::Coord;
use pcbcam::camlib::Geom;
use pcbcam::{commands, AppEvent, CamObject, Config, EventBus, EventFilter, ObjectKind, Project};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn project() -> Project {
    Project::with_bus(Config::default(), Box::leak(Box::new(EventBus::new())))
}

fn add_path(project: &Project, name: &str) {
    project
        .new_object(ObjectKind::Geometry, name, |object| {
            if let CamObject::Geometry { document, .. } = object {
                document.add_polyline(&[Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 0.0 }]);
            }
            Ok(())
        })
        .expect("Failed to create geometry");
}

#[test]
fn test_offset_moves_object() {
    let project = project();
    add_path(&project, "path");
    commands::offset(&project, "path", 1.5, -2.0).expect("Failed to offset");

    let handle = project.require("path").expect("Missing object");
    let (xmin, ymin, xmax, ymax) = handle.read().document().bounds();
    assert_eq!((xmin, ymin, xmax, ymax), (1.5, -2.0, 11.5, -2.0));
}

#[test]
fn test_offset_unknown_object() {
    let err = commands::offset(&project(), "missing", 1.0, 1.0).unwrap_err();
    assert!(err.is_project_error());
}

#[test]
fn test_subtract_rectangle_splits_path() {
    let project = project();
    add_path(&project, "path");
    commands::subtract_rectangle(&project, "path", 4.0, -1.0, 6.0, 1.0).expect("Failed to subtract");

    let handle = project.require("path").expect("Missing object");
    let object = handle.read();
    let paths = object.document().solid_geometry().flatten(true);
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| matches!(p, Geom::LineString(_))));
}

#[test]
fn test_subtract_rectangle_needs_geometry() {
    let project = project();
    project
        .new_object(ObjectKind::CncJob, "job", |_| Ok(()))
        .expect("Failed to create job");
    let err = commands::subtract_rectangle(&project, "job", 0.0, 0.0, 1.0, 1.0).unwrap_err();
    assert!(err.is_project_error());
    assert!(err.to_string().contains("expected geometry"));
}

#[test]
fn test_sys_variables() {
    let project = project();
    assert_eq!(commands::get_sys(&project, "excellon_zeros"), Some(json!("L")));
    assert_eq!(commands::get_sys(&project, "excellon_nosuch"), None);

    let gerber = commands::list_sys(&project, Some("gerber"));
    assert!(gerber.contains(&"gerber_isotooldia".to_string()));
    assert!(gerber.iter().all(|k| k.starts_with("gerber")));
    let mut sorted = gerber.clone();
    sorted.sort();
    assert_eq!(gerber, sorted);

    commands::set_sys(&project, "excellon_zeros", json!("T")).expect("Failed to set");
    assert_eq!(commands::get_sys(&project, "excellon_zeros"), Some(json!("T")));
    assert!(commands::set_sys(&project, "excellon_zeros", json!("Q")).is_err());
}

#[test]
fn test_set_option_publishes() {
    let project = project();
    add_path(&project, "path");
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    project.bus().subscribe(EventFilter::Object("path".to_string()), move |event| {
        if matches!(event, AppEvent::Option(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    commands::set_option(&project, "path", "multidepth", json!(true)).expect("Failed to set option");
    assert!(commands::set_option(&project, "path", "nosuch", json!(1)).is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
