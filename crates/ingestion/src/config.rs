//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::DetectionConfig;

/// Backpressure configuration
///
/// A full buffer always evicts its oldest frame; only the capacity is tunable.
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Frame buffer capacity
    pub capacity: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { capacity: 5 }
    }
}

impl BackpressureConfig {
    /// Create new backpressure configuration
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl From<&DetectionConfig> for BackpressureConfig {
    fn from(config: &DetectionConfig) -> Self {
        Self::new(config.buffer_size)
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Frames read from the camera
    pub frames_captured: AtomicU64,

    /// Frames lost to backpressure
    pub frames_dropped: AtomicU64,

    /// Current buffer depth
    pub queue_len: AtomicUsize,

    /// Failed camera reads
    pub read_failures: AtomicU64,

    /// Reconnect attempts
    pub reconnect_attempts: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record frame captured
    pub fn record_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Record frame dropped
    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record read failure
    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record reconnect attempt
    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Update queue length
    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Frames read from the camera
    pub frames_captured: u64,

    /// Frames lost to backpressure
    pub frames_dropped: u64,

    /// Current buffer depth
    pub queue_len: usize,

    /// Failed camera reads
    pub read_failures: u64,

    /// Reconnect attempts
    pub reconnect_attempts: u64,
}
