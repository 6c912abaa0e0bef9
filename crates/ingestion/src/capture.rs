//! Capture loop
//!
//! Periodic task pulling frames from `FrameIngest` into the frame buffer.
//! Once the camera is in the failed state the loop stops capturing, reports
//! `error` once, and idles until `CaptureControl::restart` is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{FrameSource, PeriodicTask, StateEvent, SystemStatus, TickOutcome};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::buffer::FrameBuffer;
use crate::camera::FrameIngest;
use crate::error::IngestionError;

/// Poll period while the camera is failed
const FAILED_IDLE: Duration = Duration::from_millis(100);

/// External restart request for a failed camera
#[derive(Debug, Clone, Default)]
pub struct CaptureControl {
    restart: Arc<AtomicBool>,
}

impl CaptureControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the capture loop to reset the camera on its next tick
    pub fn restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
    }

    fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::SeqCst)
    }
}

/// Timer-driven capture task
pub struct CaptureLoop<S> {
    ingest: FrameIngest<S>,
    buffer: FrameBuffer,
    events: mpsc::Sender<StateEvent>,
    control: CaptureControl,
    period: Duration,
    failure_reported: bool,
}

impl<S: FrameSource> CaptureLoop<S> {
    pub fn new(
        ingest: FrameIngest<S>,
        buffer: FrameBuffer,
        events: mpsc::Sender<StateEvent>,
        period: Duration,
    ) -> Self {
        Self {
            ingest,
            buffer,
            events,
            control: CaptureControl::new(),
            period,
            failure_reported: false,
        }
    }

    /// Handle for restarting a failed camera
    pub fn control(&self) -> CaptureControl {
        self.control.clone()
    }

    async fn tick_failed(&mut self) -> TickOutcome {
        if !self.control.take_restart() {
            return TickOutcome::Delay(FAILED_IDLE);
        }

        match self.ingest.reset().await {
            Ok(()) => {
                info!(camera = self.ingest.index(), "camera restarted");
                self.failure_reported = false;
                publish(&self.events, SystemStatus::active("camera restarted")).await;
                TickOutcome::Continue
            }
            Err(e) => {
                error!(camera = self.ingest.index(), error = %e, "camera restart failed");
                publish(
                    &self.events,
                    SystemStatus::error(format!("camera restart failed: {e}")),
                )
                .await;
                TickOutcome::Delay(FAILED_IDLE)
            }
        }
    }
}

async fn publish(events: &mpsc::Sender<StateEvent>, status: SystemStatus) {
    if events.send(StateEvent::Status(status)).await.is_err() {
        warn!("state aggregator gone, status update lost");
    }
}

impl<S: FrameSource> PeriodicTask for CaptureLoop<S> {
    fn name(&self) -> &str {
        "capture_loop"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn tick(&mut self) -> TickOutcome {
        if self.ingest.is_failed() {
            return self.tick_failed().await;
        }

        match self.ingest.capture(&self.buffer).await {
            Ok(_) => TickOutcome::Continue,
            Err(IngestionError::BufferClosed) => {
                info!("frame buffer closed, capture loop exiting");
                TickOutcome::Stop
            }
            Err(e) if e.is_terminal() => {
                if !self.failure_reported {
                    self.failure_reported = true;
                    publish(
                        &self.events,
                        SystemStatus::error(format!("camera failure: {e}")),
                    )
                    .await;
                }
                TickOutcome::Delay(FAILED_IDLE)
            }
            Err(e) => {
                warn!(error = %e, "capture failed");
                TickOutcome::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCamera;
    use contracts::{spawn_periodic, StopSignal, SystemState};

    #[tokio::test]
    async fn test_exhaustion_reports_error_once_and_restart_recovers() {
        let camera = MockCamera::new(0, 4, 4);
        let script = camera.script();
        let mut ingest = FrameIngest::with_retry(camera, 2, Duration::from_millis(1));
        ingest.open().await.unwrap();

        let buffer = FrameBuffer::new(4);
        let (tx, mut rx) = mpsc::channel(16);
        let mut task = CaptureLoop::new(ingest, buffer.clone(), tx, Duration::from_millis(1));
        let control = task.control();

        assert_eq!(task.tick().await, TickOutcome::Continue);
        assert_eq!(buffer.len(), 1);

        script.disconnect();
        assert_eq!(task.tick().await, TickOutcome::Delay(FAILED_IDLE));
        assert_eq!(task.tick().await, TickOutcome::Delay(FAILED_IDLE));
        let opens = script.open_calls();

        match rx.try_recv() {
            Ok(StateEvent::Status(status)) => assert_eq!(status.state, SystemState::Error),
            other => panic!("expected error status, got {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "failure must be reported once");
        assert_eq!(script.open_calls(), opens);

        script.reconnect();
        control.restart();
        assert_eq!(task.tick().await, TickOutcome::Continue);
        match rx.try_recv() {
            Ok(StateEvent::Status(status)) => assert_eq!(status.state, SystemState::Active),
            other => panic!("expected active status, got {other:?}"),
        }
        assert_eq!(task.tick().await, TickOutcome::Continue);
    }

    #[tokio::test]
    async fn test_loop_stops_when_buffer_closed() {
        let mut ingest =
            FrameIngest::with_retry(MockCamera::new(0, 4, 4), 1, Duration::from_millis(1));
        ingest.open().await.unwrap();

        let buffer = FrameBuffer::new(4);
        let (tx, _rx) = mpsc::channel(4);
        let task = CaptureLoop::new(ingest, buffer.clone(), tx, Duration::from_millis(1));

        let handle = spawn_periodic(task, StopSignal::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        buffer.close();
        assert_eq!(
            handle.join(Duration::from_secs(1)).await,
            contracts::WorkerExit::Completed
        );
    }
}
