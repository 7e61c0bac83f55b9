//! Command surface
//!
//! Each function is one scriptable command acting on a [`Project`]. The CLI
//! maps its subcommands onto these.

use std::path::Path;

use geo::Coord;
use serde_json::Value;
use tracing::info;

use crate::error::AppResult;
use crate::project::Project;

/// Move object `name` by (`dx`, `dy`).
pub fn offset(project: &Project, name: &str, dx: f64, dy: f64) -> AppResult<()> {
    let handle = project.require(name)?;
    handle.write().document_mut().offset(dx, dy);
    info!("Offset {} by ({}, {})", name, dx, dy);
    Ok(())
}

/// Cut the rectangle spanned by (`x0`, `y0`) and (`x1`, `y1`) out of the
/// paths of geometry object `name`.
pub fn subtract_rectangle(project: &Project, name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> AppResult<()> {
    let handle = project.require(name)?;
    let mut object = handle.write();
    let geometry = object.geometry_mut(name)?;
    geometry.subtract_polygon(&[
        Coord { x: x0, y: y0 },
        Coord { x: x1, y: y0 },
        Coord { x: x1, y: y1 },
        Coord { x: x0, y: y1 },
    ]);
    Ok(())
}

pub fn save_project(project: &Project, filename: impl AsRef<Path>) -> AppResult<()> {
    project.save(filename.as_ref())
}

pub fn open_project(project: &Project, filename: impl AsRef<Path>) -> AppResult<()> {
    project.open(filename.as_ref())
}

/// Value of system variable `name`, e.g. `excellon_zeros`.
pub fn get_sys(project: &Project, name: &str) -> Option<Value> {
    project.defaults().get(name)
}

/// System variable names starting with `prefix`, sorted.
pub fn list_sys(project: &Project, prefix: Option<&str>) -> Vec<String> {
    project.defaults().list(prefix)
}

pub fn set_sys(project: &Project, name: &str, value: Value) -> AppResult<()> {
    project.update_defaults(|defaults| defaults.set(name, value))?;
    Ok(())
}

/// Set option `key` of object `name`, publishing the change.
pub fn set_option(project: &Project, name: &str, key: &str, value: Value) -> AppResult<()> {
    let handle = project.require(name)?;
    handle.write().set_option(name, key, value, project.bus())?;
    Ok(())
}
