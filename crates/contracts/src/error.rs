//! Layered error definitions
//!
//! Categorized by source: config / camera / classifier / sensor / actuator / bridge

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Camera Errors =====
    /// Camera could not be opened or read
    #[error("camera {index} error: {message}")]
    Camera { index: u32, message: String },

    /// Camera gave up after exhausting its reconnect budget
    #[error("camera {index} failed after {attempts} reconnect attempts")]
    CameraExhausted { index: u32, attempts: u32 },

    // ===== Classifier Errors =====
    /// Classifier invocation failed
    #[error("classifier error on frame {frame_id}: {message}")]
    Classifier { frame_id: u64, message: String },

    // ===== Hardware Errors =====
    /// Range sensor read failed
    #[error("sensor '{compartment}' error: {message}")]
    Sensor {
        compartment: String,
        message: String,
    },

    /// Echo line never rose within the timeout
    #[error("sensor '{compartment}' timed out after {waited_ms}ms waiting for echo")]
    SensorTimeout { compartment: String, waited_ms: u64 },

    /// Stepper driver pin write failed
    #[error("actuator error: {message}")]
    Actuator { message: String },

    // ===== Bridge Errors =====
    /// State bridge protocol or transport error
    #[error("state bridge error: {message}")]
    Bridge { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create camera error
    pub fn camera(index: u32, message: impl Into<String>) -> Self {
        Self::Camera {
            index,
            message: message.into(),
        }
    }

    /// Create classifier error
    pub fn classifier(frame_id: u64, message: impl Into<String>) -> Self {
        Self::Classifier {
            frame_id,
            message: message.into(),
        }
    }

    /// Create sensor error
    pub fn sensor(compartment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sensor {
            compartment: compartment.into(),
            message: message.into(),
        }
    }

    /// Create actuator error
    pub fn actuator(message: impl Into<String>) -> Self {
        Self::Actuator {
            message: message.into(),
        }
    }

    /// Create bridge error
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge {
            message: message.into(),
        }
    }

    /// Whether the error is terminal for the camera (no more reconnects)
    pub fn is_camera_exhausted(&self) -> bool {
        matches!(self, Self::CameraExhausted { .. })
    }
}
