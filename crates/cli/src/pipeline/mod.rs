//! Pipeline orchestration module.

mod orchestrator;
mod scenario;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
