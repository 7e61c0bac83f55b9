//! Standard apertures and their flash geometry.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use pcbcam_core::ParseError;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aperture_macro::ApertureMacro;
use crate::geometry::{circle, stadium, Geom};

/// Aperture definition from an `%ADD` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Aperture {
    #[serde(rename = "C")]
    Circle { size: f64 },
    #[serde(rename = "R")]
    Rectangle { width: f64, height: f64, size: f64 },
    #[serde(rename = "O")]
    Obround { width: f64, height: f64, size: f64 },
    #[serde(rename = "P")]
    RegularPolygon {
        diameter: f64,
        vertices: usize,
        rotation: Option<f64>,
        size: f64,
    },
    #[serde(rename = "AM")]
    Macro { name: String, modifiers: Vec<String> },
}

/// Normalise an aperture number: `"010"` becomes `"10"`.
pub fn normalize_id(id: &str) -> Result<String, ParseError> {
    id.trim()
        .parse::<u64>()
        .map(|n| n.to_string())
        .map_err(|_| ParseError::InvalidNumber(id.to_string()))
}

fn number(text: &str) -> Result<f64, ParseError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(text.to_string()))
}

impl Aperture {
    /// Build an aperture from its template name and `X`-separated
    /// parameters. `None` for templates that are neither standard nor a
    /// known macro.
    pub fn parse(
        template: &str,
        params: Option<&str>,
        macros: &BTreeMap<String, ApertureMacro>,
    ) -> Result<Option<Aperture>, ParseError> {
        let fields: Vec<&str> = params.map(|p| p.split('X').collect()).unwrap_or_default();
        let field = |i: usize| -> Result<f64, ParseError> {
            match fields.get(i) {
                Some(text) => number(text),
                None => Err(ParseError::InvalidNumber(format!(
                    "missing parameter {} of aperture {}",
                    i + 1,
                    template
                ))),
            }
        };

        let aperture = match template {
            "C" => Aperture::Circle { size: field(0)? },
            "R" => {
                let (width, height) = (field(0)?, field(1)?);
                Aperture::Rectangle {
                    width,
                    height,
                    size: width.hypot(height),
                }
            }
            "O" => {
                let (width, height) = (field(0)?, field(1)?);
                Aperture::Obround {
                    width,
                    height,
                    size: width.hypot(height),
                }
            }
            "P" => {
                let diameter = field(0)?;
                let vertices = field(1)?.max(0.0) as usize;
                let rotation = match fields.get(2) {
                    Some(text) => Some(number(text)?),
                    None => None,
                };
                Aperture::RegularPolygon {
                    diameter,
                    vertices,
                    rotation,
                    size: diameter,
                }
            }
            name if macros.contains_key(name) => Aperture::Macro {
                name: name.to_string(),
                modifiers: fields.iter().map(|s| s.to_string()).collect(),
            },
            _ => return Ok(None),
        };
        Ok(Some(aperture))
    }

    /// Stroke width. Macros have none.
    pub fn size(&self) -> Option<f64> {
        match self {
            Aperture::Circle { size }
            | Aperture::Rectangle { size, .. }
            | Aperture::Obround { size, .. }
            | Aperture::RegularPolygon { size, .. } => Some(*size),
            Aperture::Macro { .. } => None,
        }
    }

    pub fn template(&self) -> &str {
        match self {
            Aperture::Circle { .. } => "C",
            Aperture::Rectangle { .. } => "R",
            Aperture::Obround { .. } => "O",
            Aperture::RegularPolygon { .. } => "P",
            Aperture::Macro { name, .. } => name,
        }
    }

    /// Shape left by flashing the aperture at `at`.
    pub fn flash(
        &self,
        at: Coord<f64>,
        macros: &BTreeMap<String, ApertureMacro>,
        steps: usize,
    ) -> Result<MultiPolygon<f64>, ParseError> {
        let poly = match self {
            Aperture::Circle { size } => circle(at, size / 2.0, steps),
            Aperture::Rectangle { width, height, .. } => {
                let (hw, hh) = (width / 2.0, height / 2.0);
                Polygon::new(
                    LineString::from(vec![
                        (at.x - hw, at.y - hh),
                        (at.x + hw, at.y - hh),
                        (at.x + hw, at.y + hh),
                        (at.x - hw, at.y + hh),
                    ]),
                    vec![],
                )
            }
            Aperture::Obround { width, height, .. } => {
                let (a, b, r) = if width > height {
                    let d = 0.5 * (width - height);
                    (Coord { x: at.x - d, y: at.y }, Coord { x: at.x + d, y: at.y }, height / 2.0)
                } else {
                    let d = 0.5 * (height - width);
                    (Coord { x: at.x, y: at.y - d }, Coord { x: at.x, y: at.y + d }, width / 2.0)
                };
                stadium(a, b, r, steps)
            }
            Aperture::RegularPolygon {
                diameter,
                vertices,
                rotation,
                ..
            } => {
                if *vertices < 3 {
                    warn!("Polygon aperture with {} vertices flashes nothing", vertices);
                    return Ok(MultiPolygon::new(vec![]));
                }
                let rot = rotation.unwrap_or(0.0) * PI / 180.0;
                let ring: Vec<Coord<f64>> = (0..*vertices)
                    .map(|i| {
                        let t = 2.0 * PI * i as f64 / *vertices as f64 + rot;
                        Coord {
                            x: at.x + 0.5 * diameter * t.cos(),
                            y: at.y + 0.5 * diameter * t.sin(),
                        }
                    })
                    .collect();
                Polygon::new(LineString::from(ring), vec![])
            }
            Aperture::Macro { name, modifiers } => {
                let am = macros.get(name).ok_or_else(|| ParseError::ApertureMacro {
                    macro_name: name.clone(),
                    reason: "macro is not defined".to_string(),
                })?;
                let values = modifiers
                    .iter()
                    .filter(|m| !m.trim().is_empty())
                    .map(|m| number(m))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut shape = Geom::MultiPolygon(am.evaluate(&values)?);
                shape.translate(at.x, at.y);
                return Ok(shape.to_multi_polygon());
            }
        };
        Ok(MultiPolygon::new(vec![poly]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect};

    fn no_macros() -> BTreeMap<String, ApertureMacro> {
        BTreeMap::new()
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("010").unwrap(), "10");
        assert_eq!(normalize_id("10").unwrap(), "10");
        assert!(normalize_id("1a").is_err());
    }

    #[test]
    fn test_parse_standard_apertures() {
        let m = no_macros();
        assert_eq!(
            Aperture::parse("C", Some("0.010"), &m).unwrap(),
            Some(Aperture::Circle { size: 0.010 })
        );
        let r = Aperture::parse("R", Some("3X4"), &m).unwrap().unwrap();
        assert_eq!(r.size(), Some(5.0));
        let p = Aperture::parse("P", Some("1X6X30"), &m).unwrap().unwrap();
        assert!(matches!(
            p,
            Aperture::RegularPolygon {
                vertices: 6,
                rotation: Some(r),
                ..
            } if r == 30.0
        ));
        assert_eq!(Aperture::parse("ZZ", Some("1"), &m).unwrap(), None);
        assert!(Aperture::parse("R", Some("3"), &m).is_err());
    }

    #[test]
    fn test_flash_areas() {
        let m = no_macros();
        let at = Coord { x: 1.0, y: 1.0 };
        let r = Aperture::Rectangle { width: 2.0, height: 1.0, size: 0.0 };
        assert!((r.flash(at, &m, 64).unwrap().unsigned_area() - 2.0).abs() < 1e-12);

        let o = Aperture::Obround { width: 3.0, height: 1.0, size: 0.0 };
        let area = o.flash(at, &m, 256).unwrap().unsigned_area();
        assert!((area - (2.0 + PI * 0.25)).abs() < 1e-3);

        let p = Aperture::RegularPolygon {
            diameter: 2.0,
            vertices: 4,
            rotation: None,
            size: 2.0,
        };
        assert!((p.flash(at, &m, 64).unwrap().unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_tall_obround_is_vertical() {
        let o = Aperture::Obround { width: 1.0, height: 3.0, size: 0.0 };
        let r = o.flash(Coord { x: 0.0, y: 0.0 }, &no_macros(), 64).unwrap().bounding_rect().unwrap();
        assert!((r.height() - 3.0).abs() < 1e-9);
        assert!((r.width() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_macro_flash_is_translated() {
        let mut macros = no_macros();
        let mut am = ApertureMacro::new("BOX");
        am.append("21,1,$1,$2,0,0,0*");
        macros.insert("BOX".to_string(), am);

        let a = Aperture::parse("BOX", Some("2X1"), &macros).unwrap().unwrap();
        assert_eq!(a.size(), None);
        let r = a
            .flash(Coord { x: 5.0, y: 5.0 }, &macros, 64)
            .unwrap()
            .bounding_rect()
            .unwrap();
        assert_eq!((r.min().x, r.min().y), (4.0, 4.5));
    }
}
