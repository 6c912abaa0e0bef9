//! Bounded frame buffer
//!
//! Lossy hand-off between the capture loop and the inference worker. Pushing
//! never blocks: a full buffer evicts its oldest frame before the new one is
//! queued, so the consumer always sees the freshest frames.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use contracts::Frame;
use tracing::trace;

use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::error::{IngestionError, Result};

/// Result of a push
#[derive(Debug)]
pub enum PushOutcome {
    /// Queued without loss
    Queued,
    /// Queued after evicting this (oldest) frame
    Evicted(Frame),
}

/// Fixed-capacity frame buffer
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    metrics: Arc<IngestionMetrics>,
}

impl FrameBuffer {
    /// Create a buffer holding at most `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self::with_config(BackpressureConfig::new(capacity))
    }

    /// Create with backpressure configuration
    pub fn with_config(config: BackpressureConfig) -> Self {
        Self::with_metrics(config, Arc::new(IngestionMetrics::new()))
    }

    /// Create sharing an existing metrics instance
    pub fn with_metrics(config: BackpressureConfig, metrics: Arc<IngestionMetrics>) -> Self {
        let (tx, rx) = bounded(config.capacity.max(1));
        Self {
            tx,
            rx,
            metrics,
        }
    }

    /// Insert a frame without blocking
    ///
    /// # Errors
    /// `BufferClosed` if the buffer was closed
    pub fn push(&self, frame: Frame) -> Result<PushOutcome> {
        let outcome = match self.tx.force_send(frame) {
            Ok(None) => PushOutcome::Queued,
            Ok(Some(evicted)) => {
                self.metrics.record_dropped();
                observability::metrics::record_frame_evicted();
                trace!(frame_id = evicted.frame_id, "evicted oldest frame");
                PushOutcome::Evicted(evicted)
            }
            Err(_) => return Err(IngestionError::BufferClosed),
        };
        self.update_depth();
        Ok(outcome)
    }

    /// Wait up to `timeout` for a frame
    ///
    /// Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    /// `BufferClosed` once the buffer is closed and drained
    pub async fn pop_timeout(&self, timeout: Duration) -> Result<Option<Frame>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(frame)) => {
                self.update_depth();
                Ok(Some(frame))
            }
            Ok(Err(_)) => Err(IngestionError::BufferClosed),
            Err(_) => Ok(None),
        }
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<Frame> {
        let frame = self.rx.try_recv().ok();
        if frame.is_some() {
            self.update_depth();
        }
        frame
    }

    /// Queued frame count
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum queued frames
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(usize::MAX)
    }

    /// Close the buffer; consumers drain what is left and then see `BufferClosed`
    pub fn close(&self) {
        self.tx.close();
    }

    /// Check if closed
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    fn update_depth(&self) {
        let depth = self.rx.len();
        self.metrics.update_queue_len(depth);
        observability::metrics::record_frame_buffer_depth(depth);
    }
}
