//! Error types for tangible-input

use crate::failure::FailureState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TangibleError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("No camera device available")]
    NoDeviceAvailable,

    #[error("Failed to open camera stream: {0}")]
    StreamOpenFailed(String),

    #[error("Detector unreachable: {0}")]
    DetectorUnreachable(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline already initialized")]
    AlreadyInitialized,

    #[error("Pipeline not initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TangibleError {
    /// The terminal failure this error latches, if it is one of the
    /// pipeline-stopping conditions.
    pub fn failure_state(&self) -> Option<FailureState> {
        match self {
            TangibleError::PermissionDenied
            | TangibleError::EnumerationFailed(_)
            | TangibleError::NoDeviceAvailable => Some(FailureState::NoDeviceAvailable),
            TangibleError::StreamOpenFailed(_) => Some(FailureState::StreamOpenFailed),
            TangibleError::DetectorUnreachable(_) | TangibleError::Network(_) => {
                Some(FailureState::DetectorUnreachable)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TangibleError>;
