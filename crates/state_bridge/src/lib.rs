//! # State Bridge
//!
//! Read-only view of the sorter state for external consumers.
//!
//! Responsibilities:
//! - Fold `StateEvent`s from every worker into one `StateSnapshot`
//! - Serve the latest snapshot over TCP (`GET_DATA` -> JSON)
//! - Client used by `sortbin query` and the integration tests
//!
//! ```ignore
//! let store = StateStore::new(StateSnapshot::new(blueprint.compartment_names()));
//! let server = StateBridgeServer::from_config(&blueprint.bridge, store.reader()).await?;
//! let aggregator = StateAggregator::new(store, state_rx).spawn(stop.clone());
//! let bridge = server.spawn(stop.clone());
//!
//! let snapshot = StateClient::new("127.0.0.1:5001").fetch().await?;
//! ```

mod client;
mod error;
mod protocol;
mod server;
mod store;

pub use client::{StateClient, DEFAULT_CLIENT_TIMEOUT};
pub use error::{BridgeError, Result};
pub use protocol::{Command, GET_DATA, MAX_REQUEST_BYTES};
pub use server::{BridgeSettings, StateBridgeServer};
pub use store::{StateAggregator, StateReader, StateStore};
