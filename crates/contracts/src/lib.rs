//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall-clock unix seconds (f64) for frames, statuses and snapshots
//! - `frame_id` is a monotonic capture counter used for ordering/diagnostics
//!
//! ## Position Model
//! - Motor positions are absolute step counts (i64); position 0 is where the driver was powered up

mod blueprint;
mod detection;
mod error;
mod frame;
mod hardware;
mod runtime;
mod state;

pub use blueprint::*;
pub use detection::*;
pub use error::*;
pub use frame::*;
pub use hardware::*;
pub use runtime::*;
pub use state::*;
