//! StateClient - one-shot `GET_DATA` requests
//!
//! Replies carry no length prefix: the first chunk is awaited up to the
//! client timeout, after which the reply ends on EOF or on a quiet gap of
//! `inter_chunk_timeout`.

use std::time::Duration;

use contracts::WireSnapshot;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::error::{BridgeError, Result};
use crate::protocol::GET_DATA;

/// Default connect/read deadline
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Quiet gap that ends a reply
pub const DEFAULT_INTER_CHUNK_TIMEOUT: Duration = Duration::from_millis(500);

const READ_CHUNK_BYTES: usize = 4096;

/// Client for the state bridge
#[derive(Debug, Clone)]
pub struct StateClient {
    addr: String,
    timeout: Duration,
    inter_chunk_timeout: Duration,
}

impl StateClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
            inter_chunk_timeout: DEFAULT_INTER_CHUNK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_inter_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.inter_chunk_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Fetch the current snapshot
    pub async fn fetch(&self) -> Result<WireSnapshot> {
        self.fetch_with(GET_DATA).await
    }

    /// Send `command` and decode the reply as a snapshot
    ///
    /// # Errors
    /// `Server` if the bridge answered with an error object
    pub async fn fetch_with(&self, command: &str) -> Result<WireSnapshot> {
        let reply = self.send_raw(command).await?;
        if let Some(message) = reply.get("error") {
            return Err(BridgeError::Server {
                message: message.as_str().unwrap_or_default().to_string(),
            });
        }
        Ok(serde_json::from_value(reply)?)
    }

    /// Send `command` and return the raw JSON reply
    #[instrument(name = "state_client_request", skip(self), fields(addr = %self.addr))]
    pub async fn send_raw(&self, command: &str) -> Result<serde_json::Value> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| BridgeError::timeout("connect", self.timeout))??;

        stream.write_all(command.as_bytes()).await?;
        stream.shutdown().await?;

        let body = self.read_reply(&mut stream).await?;
        debug!(bytes = body.len(), "bridge reply received");

        Ok(serde_json::from_slice(&body)?)
    }

    async fn read_reply(&self, stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_BYTES];

        let first = tokio::time::timeout(self.timeout, stream.read(&mut chunk))
            .await
            .map_err(|_| BridgeError::timeout("response read", self.timeout))??;
        body.extend_from_slice(&chunk[..first]);

        while first > 0 {
            match tokio::time::timeout(self.inter_chunk_timeout, stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => body.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(body)
    }
}
