//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Frame buffer was closed
    #[error("frame buffer closed")]
    BufferClosed,

    /// Camera gave up; no reconnects until reset
    #[error("camera {index} is in failed state, reset required")]
    CameraFailed {
        /// Camera index
        index: u32,
    },

    /// Camera read or open error
    #[error(transparent)]
    Camera(#[from] ContractError),
}

impl IngestionError {
    /// Whether this error is terminal until an external reset
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::CameraFailed { .. } => true,
            Self::Camera(e) => e.is_camera_exhausted(),
            Self::BufferClosed => false,
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
