//! Sorter metrics
//!
//! Prometheus recording helpers for every pipeline stage, plus in-memory
//! statistics used for the end-of-run summary.

use std::collections::BTreeMap;

use contracts::{DetectionEvent, SystemState};
use metrics::{counter, gauge, histogram};

/// Record a captured frame
pub fn record_frame_captured(camera: u32) {
    counter!("sortbin_frames_captured_total", "camera" => camera.to_string()).increment(1);
}

/// Record a queued frame evicted to make room for a newer one
pub fn record_frame_evicted() {
    counter!("sortbin_frames_evicted_total").increment(1);
}

/// Record frame buffer depth
pub fn record_frame_buffer_depth(depth: usize) {
    gauge!("sortbin_frame_buffer_depth").set(depth as f64);
}

/// Record a failed camera read
pub fn record_camera_read_failure(camera: u32) {
    counter!("sortbin_camera_read_failures_total", "camera" => camera.to_string()).increment(1);
}

/// Record a camera reconnect attempt
pub fn record_camera_reconnect(camera: u32, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "sortbin_camera_reconnects_total",
        "camera" => camera.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a frame skipped by the frame-skip policy
pub fn record_frame_skipped() {
    counter!("sortbin_frames_skipped_total").increment(1);
}

/// Record one classifier run
pub fn record_inference(event: &DetectionEvent, latency_ms: f64) {
    counter!("sortbin_inferences_total", "status" => "ok").increment(1);
    histogram!("sortbin_inference_latency_ms").record(latency_ms);
    histogram!("sortbin_detections_per_frame").record(event.detections.len() as f64);

    if let Some(best) = event.best() {
        histogram!(
            "sortbin_detection_confidence",
            "class" => best.class_name.clone()
        )
        .record(f64::from(best.confidence));
    }
}

/// Record a classifier failure
pub fn record_inference_failure() {
    counter!("sortbin_inferences_total", "status" => "error").increment(1);
}

/// Record an accepted actuation request
pub fn record_actuation_triggered(class_name: &str) {
    counter!(
        "sortbin_classifications_total",
        "class" => class_name.to_string()
    )
    .increment(1);
}

/// Record a finished sort sequence
pub fn record_actuation_completed(success: bool, duration_ms: f64) {
    let status = if success { "success" } else { "failure" };
    counter!("sortbin_actuations_total", "status" => status).increment(1);
    histogram!("sortbin_actuation_duration_ms").record(duration_ms);
}

/// Record the motor position after a move
pub fn record_motor_position(steps: i64) {
    gauge!("sortbin_motor_position_steps").set(steps as f64);
}

/// Record a compartment fill level; absent readings leave the gauge untouched
pub fn record_fill_level(compartment: &str, percentage: Option<f64>) {
    if let Some(percentage) = percentage {
        gauge!(
            "sortbin_fill_level_percent",
            "compartment" => compartment.to_string()
        )
        .set(percentage);
    }
}

/// Record a failed level measurement
pub fn record_sensor_failure(compartment: &str) {
    counter!(
        "sortbin_sensor_failures_total",
        "compartment" => compartment.to_string()
    )
    .increment(1);
}

/// Record a state bridge request
pub fn record_bridge_request(command: &'static str) {
    counter!("sortbin_bridge_requests_total", "command" => command).increment(1);
}

/// Record the current lifecycle state (one-hot gauge)
pub fn record_system_state(state: SystemState) {
    for candidate in [
        SystemState::Starting,
        SystemState::Active,
        SystemState::Error,
        SystemState::Inactive,
    ] {
        let value = if candidate == state { 1.0 } else { 0.0 };
        gauge!("sortbin_system_state", "state" => candidate.as_str()).set(value);
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub frames_classified: u64,
    pub frames_skipped: u64,
    pub inference_failures: u64,
    pub actuations: u64,
    pub actuation_failures: u64,
    pub sensor_failures: u64,
    pub bridge_requests: u64,
    pub inference_latency_ms: StatsSummary,
    pub actuation_duration_ms: StatsSummary,
    pub class_counts: BTreeMap<String, u64>,
}

impl RunSummary {
    /// Share of captured frames lost to backpressure (percent)
    pub fn drop_rate(&self) -> f64 {
        if self.frames_captured > 0 {
            self.frames_dropped as f64 / self.frames_captured as f64 * 100.0
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sorter Run Summary ===")?;
        writeln!(f, "Frames captured: {}", self.frames_captured)?;
        writeln!(
            f,
            "Frames dropped: {} ({:.2}%)",
            self.frames_dropped,
            self.drop_rate()
        )?;
        writeln!(
            f,
            "Frames classified: {} (skipped {}, failed {})",
            self.frames_classified, self.frames_skipped, self.inference_failures
        )?;
        writeln!(
            f,
            "Actuations: {} ({} failed)",
            self.actuations, self.actuation_failures
        )?;
        writeln!(f, "Sensor failures: {}", self.sensor_failures)?;
        writeln!(f, "Bridge requests: {}", self.bridge_requests)?;
        writeln!(f, "Inference latency (ms): {}", self.inference_latency_ms)?;
        writeln!(f, "Actuation duration (ms): {}", self.actuation_duration_ms)?;

        if !self.class_counts.is_empty() {
            writeln!(f, "Classifications:")?;
            for (class, count) in &self.class_counts {
                writeln!(f, "  {}: {}", class, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Sample count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Minimum
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Maximum
    pub fn max(&self) -> f64 {
        self.max
    }
}
