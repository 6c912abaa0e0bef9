//! Actuation error types

use contracts::ContractError;
use thiserror::Error;

/// Actuation specific error
#[derive(Debug, Error)]
pub enum ActuationError {
    /// Driver line could not be set
    #[error(transparent)]
    Driver(#[from] ContractError),

    /// A pin write failed
    #[error("{line} line write failed: {kind}")]
    Pin { line: &'static str, kind: String },

    /// Sequencer queue closed; the job was dropped
    #[error("sequencer queue closed, dropped request for '{class_name}'")]
    QueueClosed { class_name: String },
}

impl ActuationError {
    /// Create pin error
    pub fn pin(line: &'static str, kind: impl std::fmt::Debug) -> Self {
        Self::Pin {
            line,
            kind: format!("{kind:?}"),
        }
    }
}

impl From<ActuationError> for ContractError {
    fn from(e: ActuationError) -> Self {
        match e {
            ActuationError::Driver(inner) => inner,
            other => ContractError::actuator(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ActuationError>;
