//! # PcbCam
//!
//! Turns PCB fabrication files into CNC programs: Gerber copper layers into
//! isolation and clearing toolpaths, Excellon drill files into drilling or
//! hole milling jobs.
//!
//! ## Architecture
//!
//! PcbCam is organized as a workspace with multiple crates:
//!
//! 1. **pcbcam-core** - Errors, units, the event bus and the worker stack
//! 2. **pcbcam-camlib** - Parsers, the geometry kernel, G-Code generation
//! 3. **pcbcam-settings** - Application defaults and config files
//! 4. **pcbcam** - Project collection, commands, presentation and the CLI

pub mod commands;
pub mod error;
pub mod project;
pub mod shapes;

pub use error::{AppError, AppResult};
pub use project::{CamObject, ObjectHandle, ObjectKind, Project};
pub use shapes::{AnnotationSink, Color, ObjectPresenter, RecordingSink, ShapeSink};

pub use pcbcam_camlib as camlib;
pub use pcbcam_core::{event_bus, AppEvent, EventBus, EventFilter, ObjectEvent, Units, WorkerStack};
pub use pcbcam_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Pretty output on stderr, leaving stdout for G-Code
/// - RUST_LOG environment variable support, INFO when unset
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
