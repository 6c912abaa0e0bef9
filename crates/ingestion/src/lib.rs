//! # Frame Ingest
//!
//! Camera capture module.
//!
//! Responsibilities:
//! - Own the capture device and its bounded reconnect policy
//! - Lossy bounded frame buffer (freshness over completeness)
//! - Periodic capture loop with external restart after terminal failure
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{CaptureLoop, FrameBuffer, FrameIngest, MockCamera};
//!
//! let buffer = FrameBuffer::new(5);
//! let mut ingest = FrameIngest::new(MockCamera::new(0, 640, 480), &config.camera)
//!     .with_metrics(buffer.metrics());
//! ingest.open().await?;
//!
//! let capture = CaptureLoop::new(ingest, buffer.clone(), state_tx, period);
//! let handle = spawn_periodic(capture, stop.clone());
//!
//! while let Some(frame) = buffer.pop_timeout(Duration::from_millis(100)).await? {
//!     // Classify frame
//! }
//! ```

mod buffer;
mod camera;
mod capture;
mod config;
mod error;
mod mock;

// Re-exports
pub use buffer::{FrameBuffer, PushOutcome};
pub use camera::{CameraState, FrameIngest};
pub use capture::{CaptureControl, CaptureLoop};
pub use config::{BackpressureConfig, IngestionMetrics, MetricsSnapshot};
pub use contracts::Frame;
pub use error::{IngestionError, Result};
pub use mock::{MockCamera, MockCameraScript};
