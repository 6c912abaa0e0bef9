//! `GET_DATA` request/response framing
//!
//! Requests carry no length prefix: a request ends when a full command has
//! arrived, the peer stops sending, or the size cap is hit.

use contracts::WireSnapshot;
use serde_json::json;

/// The only supported command
pub const GET_DATA: &str = "GET_DATA";

/// Largest request read from a client
pub const MAX_REQUEST_BYTES: usize = 1024;

/// Parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetData,
    Unknown(String),
}

impl Command {
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text == GET_DATA {
            Self::GetData
        } else {
            Self::Unknown(text.to_string())
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::GetData => "get_data",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Whether `buffer` already holds a whole command
pub fn is_complete(buffer: &[u8]) -> bool {
    buffer.len() >= MAX_REQUEST_BYTES
        || buffer.contains(&b'\n')
        || matches!(Command::parse(buffer), Command::GetData)
}

pub fn snapshot_response(snapshot: &WireSnapshot) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(snapshot)
}

pub fn error_response(message: &str) -> Vec<u8> {
    json!({ "error": message }).to_string().into_bytes()
}
