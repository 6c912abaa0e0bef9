//! Inference counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use observability::{RunningStats, StatsSummary};

/// Shared counters for the inference worker
#[derive(Debug, Default)]
pub struct InferenceStats {
    frames_seen: AtomicU64,
    frames_skipped: AtomicU64,
    frames_classified: AtomicU64,
    failures: AtomicU64,
    detections: AtomicU64,
    latency_ms: Mutex<RunningStats>,
}

impl InferenceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_seen(&self) {
        self.frames_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_frame_skipped();
    }

    pub(crate) fn record_classified(&self, detections: usize, latency_ms: f64) {
        self.frames_classified.fetch_add(1, Ordering::Relaxed);
        self.detections
            .fetch_add(detections as u64, Ordering::Relaxed);
        let mut latency = self
            .latency_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        latency.push(latency_ms);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_inference_failure();
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    pub fn frames_classified(&self) -> u64 {
        self.frames_classified.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    /// Classifier latency summary
    pub fn latency(&self) -> StatsSummary {
        let latency = self
            .latency_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        StatsSummary::from(&*latency)
    }
}
