//! PcbCam Settings Crate
//!
//! Application defaults for every document kind, stored as JSON or TOML and
//! exposed as flat `section_key` system variables.

pub mod config;
pub mod error;

pub use config::{
    config_dir, CncJobDefaults, Config, ExcellonDefaults, GeneralDefaults, GeometryDefaults,
    GerberDefaults, CONFIG_FILE_NAME,
};
pub use error::{SettingsError, SettingsResult};
