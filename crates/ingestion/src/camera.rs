//! FrameIngest - camera ownership and bounded reconnect

use std::sync::Arc;
use std::time::Duration;

use contracts::{CameraConfig, ContractError, Frame, FrameSource, StopSignal};
use tracing::{debug, error, info, instrument, warn};

use crate::buffer::{FrameBuffer, PushOutcome};
use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

/// Camera lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// Not opened yet or released
    Closed,
    /// Delivering frames
    Open,
    /// Reconnect budget exhausted; waiting for `reset`
    Failed,
}

/// Owns the capture device and its reconnect policy
pub struct FrameIngest<S> {
    source: S,
    max_retries: u32,
    retry_backoff: Duration,
    state: CameraState,
    stop: StopSignal,
    metrics: Arc<IngestionMetrics>,
}

impl<S: FrameSource> FrameIngest<S> {
    /// Create from camera configuration
    pub fn new(source: S, config: &CameraConfig) -> Self {
        Self::with_retry(
            source,
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Create with an explicit retry policy
    pub fn with_retry(source: S, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            source,
            max_retries,
            retry_backoff,
            state: CameraState::Closed,
            stop: StopSignal::new(),
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Abort reconnect waits when `stop` fires
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Share a metrics instance (usually the frame buffer's)
    pub fn with_metrics(mut self, metrics: Arc<IngestionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Open the device
    ///
    /// Used at startup, where a failure is fatal, so no retry happens here.
    #[instrument(name = "frame_ingest_open", skip(self), fields(camera = self.source.index()))]
    pub async fn open(&mut self) -> Result<()> {
        self.source.open().await?;
        self.state = CameraState::Open;
        info!("camera opened");
        Ok(())
    }

    /// Read one frame, reconnecting on failure
    ///
    /// # Errors
    /// - `CameraFailed` if a previous read exhausted the retry budget
    /// - `CameraExhausted` when this read exhausts it
    pub async fn read(&mut self) -> Result<Frame> {
        let index = self.source.index();
        if self.state == CameraState::Failed {
            return Err(IngestionError::CameraFailed { index });
        }

        if self.state == CameraState::Open {
            match self.source.read().await {
                Ok(frame) => {
                    self.record_frame();
                    return Ok(frame);
                }
                Err(e) => {
                    warn!(camera = index, error = %e, "frame read failed");
                    self.metrics.record_read_failure();
                    observability::metrics::record_camera_read_failure(index);
                }
            }
        }

        self.reconnect().await
    }

    /// Read one frame and push it into `buffer`
    pub async fn capture(&mut self, buffer: &FrameBuffer) -> Result<PushOutcome> {
        let frame = self.read().await?;
        buffer.push(frame)
    }

    /// Leave the failed state and reopen the device
    #[instrument(name = "frame_ingest_reset", skip(self), fields(camera = self.source.index()))]
    pub async fn reset(&mut self) -> Result<()> {
        info!("resetting camera");
        self.source.release().await;
        self.state = CameraState::Closed;
        self.open().await
    }

    /// Release the device
    pub async fn release(&mut self) {
        self.source.release().await;
        self.state = CameraState::Closed;
        debug!(camera = self.source.index(), "camera released");
    }

    /// Current lifecycle state
    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Check if the reconnect budget is exhausted
    pub fn is_failed(&self) -> bool {
        self.state == CameraState::Failed
    }

    /// Camera index
    pub fn index(&self) -> u32 {
        self.source.index()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    fn record_frame(&self) {
        self.metrics.record_captured();
        observability::metrics::record_frame_captured(self.source.index());
    }

    /// Up to `max_retries` release/reopen/read cycles with a fixed backoff
    async fn reconnect(&mut self) -> Result<Frame> {
        let index = self.source.index();
        self.source.release().await;
        self.state = CameraState::Closed;

        for attempt in 1..=self.max_retries {
            tokio::select! {
                _ = self.stop.stopped() => {
                    return Err(ContractError::camera(index, "reconnect aborted by shutdown").into());
                }
                _ = tokio::time::sleep(self.retry_backoff) => {}
            }

            self.metrics.record_reconnect();
            let result = match self.source.open().await {
                Ok(()) => self.source.read().await,
                Err(e) => Err(e),
            };

            match result {
                Ok(frame) => {
                    info!(camera = index, attempt, "camera reconnected");
                    observability::metrics::record_camera_reconnect(index, true);
                    self.state = CameraState::Open;
                    self.record_frame();
                    return Ok(frame);
                }
                Err(e) => {
                    warn!(
                        camera = index,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "camera reconnect failed"
                    );
                    observability::metrics::record_camera_reconnect(index, false);
                    self.source.release().await;
                }
            }
        }

        error!(
            camera = index,
            attempts = self.max_retries,
            "camera reconnect budget exhausted"
        );
        self.state = CameraState::Failed;
        Err(ContractError::CameraExhausted {
            index,
            attempts: self.max_retries,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCamera;

    fn ingest(camera: MockCamera) -> FrameIngest<MockCamera> {
        FrameIngest::with_retry(camera, 3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_read_after_open() {
        let mut ingest = ingest(MockCamera::new(0, 8, 6));
        ingest.open().await.unwrap();

        let frame = ingest.read().await.unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(ingest.metrics().snapshot().frames_captured, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_reconnects() {
        let camera = MockCamera::new(0, 8, 6);
        let script = camera.script();
        let mut ingest = ingest(camera);
        ingest.open().await.unwrap();

        script.fail_next_reads(1);
        assert!(ingest.read().await.is_ok());
        assert_eq!(ingest.state(), CameraState::Open);
        assert_eq!(script.open_calls(), 2);
        assert_eq!(ingest.metrics().snapshot().read_failures, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_terminal_until_reset() {
        let camera = MockCamera::new(2, 8, 6);
        let script = camera.script();
        let mut ingest = ingest(camera);
        ingest.open().await.unwrap();

        script.disconnect();
        let err = ingest.read().await.unwrap_err();
        assert!(err.is_terminal());
        assert!(ingest.is_failed());
        let opens_after_failure = script.open_calls();
        assert_eq!(opens_after_failure, 1 + 3);

        // No further reconnect attempts while failed
        for _ in 0..5 {
            assert!(matches!(
                ingest.read().await,
                Err(IngestionError::CameraFailed { index: 2 })
            ));
        }
        assert_eq!(script.open_calls(), opens_after_failure);

        script.reconnect();
        ingest.reset().await.unwrap();
        assert!(ingest.read().await.is_ok());
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let camera = MockCamera::new(0, 8, 6);
        camera.script().disconnect();
        let mut ingest = ingest(camera);
        assert!(ingest.open().await.is_err());
        assert_eq!(ingest.state(), CameraState::Closed);
    }

    #[tokio::test]
    async fn test_stop_aborts_reconnect() {
        let camera = MockCamera::new(0, 8, 6);
        let script = camera.script();
        let stop = StopSignal::new();
        let mut ingest = FrameIngest::with_retry(camera, 5, Duration::from_secs(3600))
            .with_stop(stop.clone());
        ingest.open().await.unwrap();

        script.disconnect();
        stop.stop();
        let result = tokio::time::timeout(Duration::from_secs(1), ingest.read()).await;
        assert!(matches!(result, Ok(Err(IngestionError::Camera(_)))));
        assert!(!ingest.is_failed());
    }

    #[tokio::test]
    async fn test_capture_pushes_into_buffer() {
        let buffer = FrameBuffer::new(2);
        let mut ingest = ingest(MockCamera::new(0, 4, 4)).with_metrics(buffer.metrics());
        ingest.open().await.unwrap();

        for _ in 0..3 {
            ingest.capture(&buffer).await.unwrap();
        }
        let snapshot = buffer.metrics().snapshot();
        assert_eq!(snapshot.frames_captured, 3);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(buffer.len(), 2);
    }
}
