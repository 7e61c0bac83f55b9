//! Per-document options
//!
//! Each document kind carries a plain options struct. Changes made through
//! [`ObjectOptions::set_option`] are published on the event bus so that
//! observers can react to individual keys.

use pcbcam_core::{AppEvent, EventBus, OptionEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CamResult, ParameterError};

/// Gap layout for board cutouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gaps {
    /// One gap at the top and one at the bottom.
    #[default]
    #[serde(rename = "tb")]
    TopBottom,
    /// One gap on the left and one on the right.
    #[serde(rename = "lr")]
    LeftRight,
    /// A gap on every side.
    #[serde(rename = "4")]
    Four,
}

/// Polygon painting strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaintMethod {
    /// Repeated insets.
    #[default]
    Standard,
    /// Concentric rings from an interior seed.
    Seed,
}

/// Keyed access to an options struct through its serialized form.
pub trait ObjectOptions: Serialize + DeserializeOwned + Sized {
    /// Multiply every length-valued option by `factor`.
    fn scale_lengths(&mut self, factor: f64);

    fn get_option(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.get(key).cloned(),
            _ => None,
        }
    }

    /// Set `key` on the options of `object` and publish the change.
    ///
    /// Unknown keys and values of the wrong type are rejected without
    /// touching the current options.
    fn set_option(&mut self, object: &str, key: &str, value: Value, bus: &EventBus) -> CamResult<()> {
        let invalid = |reason: String| ParameterError::InvalidValue {
            name: key.to_string(),
            reason,
        };

        let mut map = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            other => return Err(invalid(format!("options serialize to {}", other)).into()),
        };
        if !map.contains_key(key) {
            return Err(invalid("unknown option".to_string()).into());
        }
        map.insert(key.to_string(), value);
        *self = serde_json::from_value(Value::Object(map)).map_err(|e| invalid(e.to_string()))?;

        debug!("{}.{} set", object, key);
        bus.notify(AppEvent::Option(OptionEvent::Changed {
            object: object.to_string(),
            key: key.to_string(),
        }));
        Ok(())
    }

    /// Option keys in serialized order.
    fn keys(&self) -> Vec<String> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GerberOptions {
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
    pub gaps: Gaps,
    pub noncoppermargin: f64,
    pub noncopperrounded: bool,
    pub bboxmargin: f64,
    pub bboxrounded: bool,
}

impl Default for GerberOptions {
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
            gaps: Gaps::TopBottom,
            noncoppermargin: 0.0,
            noncopperrounded: false,
            bboxmargin: 0.0,
            bboxrounded: false,
        }
    }
}

impl GerberOptions {
    /// Parsed `ncctools`; entries that are not numbers are an error.
    pub fn ncc_tools(&self) -> CamResult<Vec<f64>> {
        self.ncctools
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>().map_err(|_| {
                    ParameterError::InvalidValue {
                        name: "ncctools".to_string(),
                        reason: format!("{:?} is not a diameter", s),
                    }
                    .into()
                })
            })
            .collect()
    }
}

impl ObjectOptions for GerberOptions {
    fn scale_lengths(&mut self, factor: f64) {
        self.isotooldia *= factor;
        self.cutoutmargin *= factor;
        self.cutoutgapsize *= factor;
        self.noncoppermargin *= factor;
        self.bboxmargin *= factor;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcellonOptions {
    pub plot: bool,
    pub solid: bool,
    pub drillz: f64,
    pub travelz: f64,
    pub feedrate: f64,
    /// Milling tool for drill milling.
    pub tooldia: f64,
    pub toolchange: bool,
    pub toolchangez: f64,
    pub spindlespeed: Option<f64>,
}

impl Default for ExcellonOptions {
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
        }
    }
}

impl ObjectOptions for ExcellonOptions {
    fn scale_lengths(&mut self, factor: f64) {
        self.drillz *= factor;
        self.travelz *= factor;
        self.feedrate *= factor;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryOptions {
    pub plot: bool,
    pub cutz: f64,
    pub travelz: f64,
    pub feedrate: f64,
    pub spindlespeed: Option<f64>,
    pub cnctooldia: f64,
    pub painttooldia: f64,
    pub paintoverlap: f64,
    pub paintmargin: f64,
    pub paintmethod: PaintMethod,
    pub multidepth: bool,
    pub depthperpass: f64,
}

impl Default for GeometryOptions {
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
            paintmethod: PaintMethod::Standard,
            multidepth: false,
            depthperpass: 0.002,
        }
    }
}

impl ObjectOptions for GeometryOptions {
    fn scale_lengths(&mut self, factor: f64) {
        self.cutz *= factor;
        self.travelz *= factor;
        self.feedrate *= factor;
        self.cnctooldia *= factor;
        self.painttooldia *= factor;
        self.paintmargin *= factor;
        self.depthperpass *= factor;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CncJobOptions {
    pub plot: bool,
    pub tooldia: f64,
    /// Text written after the program on export.
    pub append: String,
    /// Text written before the program on export.
    pub prepend: String,
    pub dwell: bool,
    pub dwelltime: f64,
}

impl Default for CncJobOptions {
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

impl CncJobOptions {
    /// Dwell to insert after spindle starts, if enabled.
    pub fn dwell_time(&self) -> Option<f64> {
        self.dwell.then_some(self.dwelltime)
    }
}

impl ObjectOptions for CncJobOptions {
    fn scale_lengths(&mut self, factor: f64) {
        self.tooldia *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcbcam_core::EventFilter;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_set_option_publishes_change() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(EventFilter::Object("top.gbr".to_string()), move |event| {
            if let AppEvent::Option(OptionEvent::Changed { key, .. }) = event {
                assert_eq!(key, "isotooldia");
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut opts = GerberOptions::default();
        opts.set_option("top.gbr", "isotooldia", json!(0.02), &bus).unwrap();
        assert_eq!(opts.isotooldia, 0.02);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejects_unknown_key_and_bad_type() {
        let bus = EventBus::new();
        let mut opts = GeometryOptions::default();
        assert!(opts.set_option("g", "nosuchkey", json!(1), &bus).is_err());
        assert!(opts.set_option("g", "cutz", json!("deep"), &bus).is_err());
        assert_eq!(opts, GeometryOptions::default());
    }

    #[test]
    fn test_enum_options_use_short_names() {
        let bus = EventBus::new();
        let mut opts = GerberOptions::default();
        opts.set_option("b", "gaps", json!("4"), &bus).unwrap();
        assert_eq!(opts.gaps, Gaps::Four);
        assert_eq!(opts.get_option("gaps"), Some(json!("4")));

        let mut geo = GeometryOptions::default();
        geo.set_option("g", "paintmethod", json!("seed"), &bus).unwrap();
        assert_eq!(geo.paintmethod, PaintMethod::Seed);
    }

    #[test]
    fn test_ncc_tools() {
        let mut opts = GerberOptions::default();
        assert_eq!(opts.ncc_tools().unwrap(), vec![1.0, 0.5]);
        opts.ncctools = "0.1, x".to_string();
        assert!(opts.ncc_tools().is_err());
    }

    #[test]
    fn test_scale_lengths() {
        let mut opts = ExcellonOptions::default();
        opts.scale_lengths(25.4);
        assert!((opts.travelz - 2.54).abs() < 1e-12);
        assert_eq!(opts.toolchangez, 1.0);
    }
}
