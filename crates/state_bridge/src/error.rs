//! State bridge error types

use contracts::ContractError;
use thiserror::Error;

/// State bridge error
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Listening socket could not be set up
    #[error("failed to bind state bridge on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Address did not resolve
    #[error("invalid bridge address '{addr}'")]
    InvalidAddress { addr: String },

    /// Connect, read or write exceeded its deadline
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Server answered with an error object
    #[error("server error: {message}")]
    Server { message: String },

    /// Socket error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("invalid response: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn timeout(operation: &'static str, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            after_ms: after.as_millis() as u64,
        }
    }
}

impl From<BridgeError> for ContractError {
    fn from(e: BridgeError) -> Self {
        ContractError::bridge(e.to_string())
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, BridgeError>;
