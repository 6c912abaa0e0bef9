//! StateBridgeServer - TCP endpoint serving the latest snapshot

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{BridgeConfig, StopSignal, WorkerHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{BridgeError, Result};
use crate::protocol::{self, Command, MAX_REQUEST_BYTES};
use crate::store::StateReader;

/// Connection timing
#[derive(Debug, Clone, Copy)]
pub struct BridgeSettings {
    /// Wait for the first request bytes
    pub read_timeout: Duration,
    /// Silence after which a partial request is considered finished
    pub inter_chunk_timeout: Duration,
    /// Listen backlog
    pub max_connections: u32,
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            inter_chunk_timeout: Duration::from_millis(config.inter_chunk_timeout_ms),
            max_connections: config.max_connections,
        }
    }
}

/// Bound listener plus the snapshot it serves
pub struct StateBridgeServer {
    listener: TcpListener,
    reader: StateReader,
    settings: BridgeSettings,
    requests: Arc<AtomicU64>,
}

impl StateBridgeServer {
    /// Bind the listening socket (address reuse on, backlog = max connections)
    ///
    /// # Errors
    /// - `addr` does not resolve
    /// - the socket cannot be created, bound or put into listening state
    #[instrument(name = "state_bridge_bind", skip(reader, settings))]
    pub async fn bind(addr: &str, reader: StateReader, settings: BridgeSettings) -> Result<Self> {
        let resolved = lookup_host(addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: addr.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| BridgeError::InvalidAddress {
                addr: addr.to_string(),
            })?;

        let listener = listen(resolved, settings.max_connections).map_err(|source| {
            BridgeError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        info!(addr = %listener.local_addr()?, "state bridge listening");

        Ok(Self {
            listener,
            reader,
            settings,
            requests: Arc::new(AtomicU64::new(0)),
        })
    }

    pub async fn from_config(config: &BridgeConfig, reader: StateReader) -> Result<Self> {
        Self::bind(&config.address(), reader, config.into()).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Served request counter
    pub fn requests(&self) -> Arc<AtomicU64> {
        self.requests.clone()
    }

    /// Run the accept loop until `stop`
    pub fn spawn(self, stop: StopSignal) -> WorkerHandle {
        let signal = stop.clone();
        WorkerHandle::spawn("state_bridge", stop, self.run(signal))
    }

    async fn run(self, stop: StopSignal) {
        let Self {
            listener,
            reader,
            settings,
            requests,
        } = self;

        loop {
            let accepted = tokio::select! {
                _ = stop.stopped() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "bridge connection accepted");
                    let reader = reader.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &reader, settings, &requests).await {
                            warn!(%peer, error = %e, "bridge connection failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "bridge accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        // Closing the listener refuses further connections
        drop(listener);
        info!(served = requests.load(Ordering::Relaxed), "state bridge stopped");
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog.max(1))
}

async fn handle_connection(
    mut stream: TcpStream,
    reader: &StateReader,
    settings: BridgeSettings,
    requests: &AtomicU64,
) -> Result<()> {
    let request = read_request(&mut stream, settings).await?;
    if request.is_empty() {
        return Ok(());
    }

    let command = Command::parse(&request);
    requests.fetch_add(1, Ordering::Relaxed);
    observability::metrics::record_bridge_request(command.label());

    let body = match &command {
        Command::GetData => protocol::snapshot_response(&reader.snapshot().to_wire())?,
        Command::Unknown(raw) => {
            warn!(command = %raw, "unknown bridge command");
            protocol::error_response(&format!("unknown command: {raw}"))
        }
    };

    stream.write_all(&body).await?;
    stream.shutdown().await?;
    debug!(bytes = body.len(), "bridge response sent");
    Ok(())
}

/// Read until a whole command arrived, the peer closed, or it went quiet
async fn read_request(stream: &mut TcpStream, settings: BridgeSettings) -> Result<Vec<u8>> {
    let mut request = Vec::with_capacity(64);
    let mut chunk = [0u8; MAX_REQUEST_BYTES];

    let first = tokio::time::timeout(settings.read_timeout, stream.read(&mut chunk))
        .await
        .map_err(|_| BridgeError::timeout("request read", settings.read_timeout))??;
    request.extend_from_slice(&chunk[..first]);

    while first > 0 && !protocol::is_complete(&request) {
        let room = MAX_REQUEST_BYTES - request.len();
        match tokio::time::timeout(settings.inter_chunk_timeout, stream.read(&mut chunk[..room])).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => request.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e.into()),
        }
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StateClient;
    use crate::store::StateStore;
    use contracts::{
        FillLevel, StateEvent, StateSnapshot, SystemStatus, WorkerExit,
    };

    fn settings() -> BridgeSettings {
        BridgeSettings {
            read_timeout: Duration::from_secs(1),
            inter_chunk_timeout: Duration::from_millis(100),
            max_connections: 5,
        }
    }

    async fn start(store: &StateStore) -> (SocketAddr, WorkerHandle, StopSignal) {
        let server = StateBridgeServer::bind("127.0.0.1:0", store.reader(), settings())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let stop = StopSignal::new();
        (addr, server.spawn(stop.clone()), stop)
    }

    #[tokio::test]
    async fn test_get_data_returns_latest_snapshot() {
        let store = StateStore::new(StateSnapshot::new(["Metal", "Glass"]));
        store.apply(StateEvent::Status(SystemStatus::active("running")));
        let (addr, handle, _stop) = start(&store).await;

        let client = StateClient::new(addr.to_string());
        let snapshot = client.fetch().await.unwrap();
        assert_eq!(snapshot.system_status, "active");
        assert_eq!(snapshot.fill_levels.len(), 2);
        assert!(snapshot.detection.is_none());

        store.apply(StateEvent::FillLevels(vec![FillLevel {
            compartment: "Metal".into(),
            percentage: Some(33.3),
            last_good_at: Some(chrono::Utc::now()),
            stale: false,
        }]));
        let snapshot = client.fetch().await.unwrap();
        assert_eq!(snapshot.fill_levels["Metal"], Some(33.3));
        assert_eq!(snapshot.fill_levels["Glass"], None);

        assert_eq!(handle.shutdown(Duration::from_secs(1)).await, WorkerExit::Completed);
    }

    #[tokio::test]
    async fn test_unknown_command_gets_error_object() {
        let store = StateStore::new(StateSnapshot::new(["Metal"]));
        let (addr, handle, _stop) = start(&store).await;

        let client = StateClient::new(addr.to_string());
        let reply = client.send_raw("HELLO").await.unwrap();
        assert!(reply["error"].as_str().unwrap().contains("HELLO"));

        let err = client.fetch_with("HELLO").await.unwrap_err();
        assert!(matches!(err, BridgeError::Server { .. }));
        handle.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_command_split_across_chunks() {
        let store = StateStore::new(StateSnapshot::new(["Metal"]));
        let (addr, handle, _stop) = start(&store).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET_").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(b"DATA").await.unwrap();

        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["system_status"], "starting");
        handle.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let store = StateStore::new(StateSnapshot::new(["Metal"]));
        let (addr, handle, stop) = start(&store).await;

        stop.stop();
        assert_eq!(handle.join(Duration::from_secs(1)).await, WorkerExit::Completed);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_rebind_after_stop() {
        let store = StateStore::new(StateSnapshot::new(["Metal"]));
        let (addr, handle, _stop) = start(&store).await;
        handle.shutdown(Duration::from_secs(1)).await;

        let again = StateBridgeServer::bind(&addr.to_string(), store.reader(), settings()).await;
        assert!(again.is_ok());
    }
}
