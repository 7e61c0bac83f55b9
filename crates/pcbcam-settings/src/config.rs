//! Application defaults for PcbCam
//!
//! Every new document starts from one section of [`Config`]. The sections use
//! the same key names as the per-document option structs, so a section
//! converts into options through serde without a field-by-field mapping.
//!
//! Files are JSON or TOML, selected by extension. Values are also reachable as
//! flat system variables named `section_key`, e.g. `gerber_isotooldia` or
//! `excellon_zeros`.

use pcbcam_core::Units;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{SettingsError, SettingsResult};

/// File name used inside [`config_dir`].
pub const CONFIG_FILE_NAME: &str = "pcbcam.toml";

/// Platform configuration directory for PcbCam, falling back to the home
/// directory.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("pcbcam"))
}

/// Defaults for Gerber layers: isolation, clearing, cutout and bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GerberDefaults {
    pub plot: bool,
    pub multicolored: bool,
    pub solid: bool,
    pub isotooldia: f64,
    pub isopasses: usize,
    pub isooverlap: f64,
    pub combine_passes: bool,
    /// Comma separated tool diameters for non-copper clearing.
    pub ncctools: String,
    pub nccoverlap: f64,
    pub nccmargin: f64,
    pub cutouttooldia: f64,
    pub cutoutmargin: f64,
    pub cutoutgapsize: f64,
    /// `tb`, `lr` or `4`.
    pub gaps: String,
    pub noncoppermargin: f64,
    pub noncopperrounded: bool,
    pub bboxmargin: f64,
    pub bboxrounded: bool,
}

impl Default for GerberDefaults {
    fn default() -> Self {
        Self {
            plot: true,
            multicolored: false,
            solid: false,
            isotooldia: 0.016,
            isopasses: 1,
            isooverlap: 0.15,
            combine_passes: true,
            ncctools: "1.0, 0.5".to_string(),
            nccoverlap: 0.4,
            nccmargin: 1.0,
            cutouttooldia: 0.07,
            cutoutmargin: 0.2,
            cutoutgapsize: 0.15,
            gaps: "tb".to_string(),
            noncoppermargin: 0.0,
            noncopperrounded: false,
            bboxmargin: 0.0,
            bboxrounded: false,
        }
    }
}

/// Defaults for drill files and drilling jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcellonDefaults {
    pub plot: bool,
    pub solid: bool,
    pub drillz: f64,
    pub travelz: f64,
    pub feedrate: f64,
    pub tooldia: f64,
    pub toolchange: bool,
    pub toolchangez: f64,
    pub spindlespeed: Option<f64>,
    /// Zero suppression assumed when a file does not declare it: `L` or `T`.
    pub zeros: String,
}

impl Default for ExcellonDefaults {
    fn default() -> Self {
        Self {
            plot: true,
            solid: false,
            drillz: -0.1,
            travelz: 0.1,
            feedrate: 5.0,
            tooldia: 0.1,
            toolchange: false,
            toolchangez: 1.0,
            spindlespeed: None,
            zeros: "L".to_string(),
        }
    }
}

/// Defaults for free geometry: milling and painting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryDefaults {
    pub plot: bool,
    pub cutz: f64,
    pub travelz: f64,
    pub feedrate: f64,
    pub spindlespeed: Option<f64>,
    pub cnctooldia: f64,
    pub painttooldia: f64,
    pub paintoverlap: f64,
    pub paintmargin: f64,
    /// `standard` or `seed`.
    pub paintmethod: String,
    pub multidepth: bool,
    pub depthperpass: f64,
}

impl Default for GeometryDefaults {
    fn default() -> Self {
        Self {
            plot: true,
            cutz: -0.002,
            travelz: 0.1,
            feedrate: 5.0,
            spindlespeed: None,
            cnctooldia: 0.4 / 25.4,
            painttooldia: 0.0625,
            paintoverlap: 0.15,
            paintmargin: 0.01,
            paintmethod: "standard".to_string(),
            multidepth: false,
            depthperpass: 0.002,
        }
    }
}

/// Defaults for generated CNC jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CncJobDefaults {
    pub plot: bool,
    pub tooldia: f64,
    /// Text written after the program.
    pub append: String,
    /// Text written before the program.
    pub prepend: String,
    pub dwell: bool,
    pub dwelltime: f64,
}

impl Default for CncJobDefaults {
    fn default() -> Self {
        Self {
            plot: true,
            tooldia: 0.4 / 25.4,
            append: String::new(),
            prepend: String::new(),
            dwell: false,
            dwelltime: 1.0,
        }
    }
}

/// Application wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralDefaults {
    /// Units for new documents and for reported values.
    pub units: Units,
    /// Allowed relative radius mismatch when locating single-quadrant arc centres.
    pub arc_tolerance: f64,
    /// printf-style template for X/Y words in generated G-Code.
    pub coordinate_format: String,
    /// Separate feed rate for plunges, if any.
    pub zdownrate: Option<f64>,
}

impl Default for GeneralDefaults {
    fn default() -> Self {
        Self {
            units: Units::In,
            arc_tolerance: 0.05,
            coordinate_format: "X%.4fY%.4f".to_string(),
            zdownrate: None,
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gerber: GerberDefaults,
    pub excellon: ExcellonDefaults,
    pub geometry: GeometryDefaults,
    pub cncjob: CncJobDefaults,
    pub general: GeneralDefaults,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the per-user configuration file, if a config directory exists.
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        debug!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Load the per-user file, falling back to defaults when it is missing or
    /// unreadable.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path().filter(|p| p.exists()) else {
            return Self::default();
        };
        Self::load_from_file(&path).unwrap_or_else(|e| {
            warn!("Ignoring settings in {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let positive = |key: &str, value: f64| {
            if value > 0.0 {
                Ok(())
            } else {
                Err(SettingsError::invalid(key, format!("must be > 0, got {}", value)))
            }
        };
        let fraction = |key: &str, value: f64| {
            if (0.0..1.0).contains(&value) {
                Ok(())
            } else {
                Err(SettingsError::invalid(key, format!("must be in [0, 1), got {}", value)))
            }
        };

        let g = &self.gerber;
        positive("gerber_isotooldia", g.isotooldia)?;
        if g.isopasses == 0 {
            return Err(SettingsError::invalid("gerber_isopasses", "must be at least 1"));
        }
        fraction("gerber_isooverlap", g.isooverlap)?;
        fraction("gerber_nccoverlap", g.nccoverlap)?;
        positive("gerber_cutouttooldia", g.cutouttooldia)?;
        for tool in g.ncctools.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let dia: f64 = tool.parse().map_err(|_| {
                SettingsError::invalid("gerber_ncctools", format!("{:?} is not a diameter", tool))
            })?;
            positive("gerber_ncctools", dia)?;
        }
        if !matches!(g.gaps.as_str(), "tb" | "lr" | "4") {
            return Err(SettingsError::invalid(
                "gerber_gaps",
                format!("expected tb, lr or 4, got {:?}", g.gaps),
            ));
        }

        let e = &self.excellon;
        positive("excellon_feedrate", e.feedrate)?;
        positive("excellon_tooldia", e.tooldia)?;
        if !matches!(e.zeros.as_str(), "L" | "T") {
            return Err(SettingsError::invalid(
                "excellon_zeros",
                format!("expected L or T, got {:?}", e.zeros),
            ));
        }

        let geo = &self.geometry;
        positive("geometry_feedrate", geo.feedrate)?;
        positive("geometry_cnctooldia", geo.cnctooldia)?;
        positive("geometry_painttooldia", geo.painttooldia)?;
        fraction("geometry_paintoverlap", geo.paintoverlap)?;
        if geo.multidepth {
            positive("geometry_depthperpass", geo.depthperpass)?;
        }
        if !matches!(geo.paintmethod.as_str(), "standard" | "seed") {
            return Err(SettingsError::invalid(
                "geometry_paintmethod",
                format!("expected standard or seed, got {:?}", geo.paintmethod),
            ));
        }

        if self.cncjob.dwelltime < 0.0 {
            return Err(SettingsError::invalid("cncjob_dwelltime", "must not be negative"));
        }

        positive("general_arc_tolerance", self.general.arc_tolerance)?;
        if let Some(rate) = self.general.zdownrate {
            positive("general_zdownrate", rate)?;
        }

        Ok(())
    }

    /// All values as flat `section_key` system variables, sorted by name.
    pub fn flatten_keys(&self) -> BTreeMap<String, Value> {
        let mut flat = BTreeMap::new();
        let Ok(Value::Object(sections)) = serde_json::to_value(self) else {
            return flat;
        };
        for (section, values) in sections {
            if let Value::Object(values) = values {
                for (key, value) in values {
                    flat.insert(format!("{}_{}", section, key), value);
                }
            }
        }
        flat
    }

    /// Value of one system variable.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.flatten_keys().remove(name)
    }

    /// Sorted system variable names, optionally restricted to a prefix.
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        self.flatten_keys()
            .into_keys()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .collect()
    }

    /// Set one system variable. The result must still validate.
    pub fn set(&mut self, name: &str, value: Value) -> SettingsResult<()> {
        let (section, key) = name
            .split_once('_')
            .ok_or_else(|| SettingsError::invalid(name, "unknown system variable"))?;

        let mut root = match serde_json::to_value(&*self)? {
            Value::Object(root) => root,
            _ => Map::new(),
        };
        match root.get_mut(section) {
            Some(Value::Object(values)) if values.contains_key(key) => {
                values.insert(key.to_string(), value);
            }
            _ => return Err(SettingsError::invalid(name, "unknown system variable")),
        }

        let updated: Self = serde_json::from_value(Value::Object(root))
            .map_err(|e| SettingsError::invalid(name, e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_flat_names() {
        let config = Config::default();
        assert_eq!(config.get("excellon_zeros"), Some(json!("L")));
        assert_eq!(config.get("gerber_isotooldia"), Some(json!(0.016)));
        assert_eq!(config.get("general_units"), Some(json!("IN")));
        assert_eq!(config.get("excellon_spindlespeed"), Some(Value::Null));
        assert_eq!(config.get("nosuch"), None);
    }

    #[test]
    fn test_list_is_sorted_and_filtered() {
        let config = Config::default();
        let all = config.list(None);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);

        let cnc = config.list(Some("cncj"));
        assert_eq!(
            cnc,
            vec![
                "cncjob_append",
                "cncjob_dwell",
                "cncjob_dwelltime",
                "cncjob_plot",
                "cncjob_prepend",
                "cncjob_tooldia"
            ]
        );
    }

    #[test]
    fn test_set_validates() {
        let mut config = Config::default();
        config.set("gerber_isopasses", json!(3)).unwrap();
        assert_eq!(config.gerber.isopasses, 3);

        assert!(config.set("gerber_isopasses", json!(0)).is_err());
        assert!(config.set("gerber_nosuch", json!(1)).is_err());
        assert!(config.set("geometry_cutz", json!("deep")).is_err());
        assert_eq!(config.gerber.isopasses, 3);
    }

    #[test]
    fn test_rejects_bad_enums() {
        let mut config = Config::default();
        config.gerber.gaps = "2".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.excellon.zeros = "X".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::default()
            .save_to_file(Path::new("settings.yaml"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedFormat(ext) if ext == "yaml"));
    }
}
