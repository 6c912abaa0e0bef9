//! # Inference
//!
//! Frame classification stage.
//!
//! Responsibilities:
//! - Pull frames from the frame buffer and apply the frame-skip policy
//! - Run the classifier off the async runtime and post-process its output
//! - Emit a `DetectionEvent` per classified frame
//!
//! ```ignore
//! let worker = InferenceWorker::new(classifier, buffer.clone(), detection_tx, (&blueprint).into());
//! let latest = worker.latest();
//! let handle = worker.spawn(stop.clone());
//! ```

mod mock;
mod postprocess;
mod stats;
mod worker;

pub use mock::{ScriptedClassifier, SimulatedClassifier};
pub use postprocess::{postprocess, FrameSkipper};
pub use stats::InferenceStats;
pub use worker::{InferenceSettings, InferenceWorker, LatestHandle, LatestInference};
