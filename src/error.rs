//! Error type for the application layer.
//!
//! Library failures from the CAM, core and settings crates are wrapped
//! unchanged so callers can still match on them.

use pcbcam_camlib::CamError;
use pcbcam_core::ProjectError;
use pcbcam_settings::SettingsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Cam(#[from] CamError),

    #[error(transparent)]
    Core(#[from] pcbcam_core::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project file error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ProjectError> for AppError {
    fn from(e: ProjectError) -> Self {
        AppError::Core(e.into())
    }
}

impl AppError {
    /// True when the error came from the project collection
    pub fn is_project_error(&self) -> bool {
        match self {
            AppError::Core(e) => e.is_project_error(),
            AppError::Cam(CamError::Core(e)) => e.is_project_error(),
            _ => false,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
