//! InferenceWorker - classify frames off the buffer
//!
//! Consumes frames from the `FrameBuffer`, applies the frame-skip policy, runs
//! the classifier on the blocking pool and forwards one `DetectionEvent` per
//! classified frame. A failing or panicking classifier costs one frame; the
//! loop keeps going until stopped.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use contracts::{
    Classifier, ContractError, Detection, DetectionEvent, Frame, SorterBlueprint, StopSignal,
    WorkerHandle,
};
use ingestion::FrameBuffer;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::postprocess::{postprocess, FrameSkipper};
use crate::stats::InferenceStats;

/// Worker settings
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub class_names: Arc<[String]>,
    pub min_confidence: f32,
    pub skip_frames: u32,
    pub poll_timeout: Duration,
}

impl From<&SorterBlueprint> for InferenceSettings {
    fn from(blueprint: &SorterBlueprint) -> Self {
        Self {
            class_names: blueprint.class_names().into(),
            min_confidence: blueprint.detection.min_confidence,
            skip_frames: blueprint.detection.skip_frames,
            poll_timeout: Duration::from_millis(blueprint.detection.poll_timeout_ms),
        }
    }
}

/// Most recent classified frame with its detections
#[derive(Debug, Clone)]
pub struct LatestInference {
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

/// Read access to the latest inference result
#[derive(Debug, Clone, Default)]
pub struct LatestHandle {
    inner: Arc<RwLock<Option<LatestInference>>>,
}

impl LatestHandle {
    /// Snapshot of the latest result, if any frame was classified yet
    pub fn get(&self) -> Option<LatestInference> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, latest: LatestInference) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(latest);
    }
}

/// Frame consumer running the classifier
pub struct InferenceWorker {
    classifier: Arc<dyn Classifier>,
    buffer: FrameBuffer,
    events: mpsc::Sender<DetectionEvent>,
    settings: InferenceSettings,
    skipper: FrameSkipper,
    latest: LatestHandle,
    stats: Arc<InferenceStats>,
}

impl InferenceWorker {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        buffer: FrameBuffer,
        events: mpsc::Sender<DetectionEvent>,
        settings: InferenceSettings,
    ) -> Self {
        Self {
            classifier,
            buffer,
            events,
            skipper: FrameSkipper::new(settings.skip_frames),
            settings,
            latest: LatestHandle::default(),
            stats: Arc::new(InferenceStats::new()),
        }
    }

    /// Latest result handle
    pub fn latest(&self) -> LatestHandle {
        self.latest.clone()
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<InferenceStats> {
        self.stats.clone()
    }

    /// Spawn the worker loop
    pub fn spawn(self, stop: StopSignal) -> WorkerHandle {
        let signal = stop.clone();
        WorkerHandle::spawn("inference_worker", stop, self.run(signal))
    }

    /// Process one frame
    ///
    /// Returns `Ok(None)` for frames dropped by the skip policy.
    ///
    /// # Errors
    /// Classifier error or panic, tagged with the frame id
    #[instrument(name = "inference_process", skip_all, fields(frame_id = frame.frame_id))]
    pub async fn process(&mut self, frame: Frame) -> Result<Option<DetectionEvent>, ContractError> {
        self.stats.record_seen();
        if !self.skipper.should_process() {
            self.stats.record_skipped();
            return Ok(None);
        }

        let frame_id = frame.frame_id;
        let started = Instant::now();
        let classifier = self.classifier.clone();
        let input = frame.clone();
        let raw = tokio::task::spawn_blocking(move || classifier.classify(&input))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    ContractError::classifier(frame_id, "classifier panicked")
                } else {
                    ContractError::classifier(frame_id, "classifier task cancelled")
                }
            })??;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let detections = postprocess(
            &raw,
            &frame,
            &self.settings.class_names,
            self.settings.min_confidence,
        );
        let event = DetectionEvent {
            frame_id,
            timestamp: frame.timestamp,
            detections: detections.clone(),
        };

        self.stats.record_classified(detections.len(), latency_ms);
        observability::metrics::record_inference(&event, latency_ms);
        if let Some(best) = event.best() {
            debug!(
                class = %best.class_name,
                confidence = best.confidence,
                count = event.detections.len(),
                latency_ms,
                "frame classified"
            );
        }
        self.latest.set(LatestInference { frame, detections });

        Ok(Some(event))
    }

    async fn run(mut self, stop: StopSignal) {
        info!(
            classifier = self.classifier.name(),
            skip_frames = self.settings.skip_frames,
            min_confidence = self.settings.min_confidence,
            "inference worker started"
        );

        loop {
            let next = tokio::select! {
                _ = stop.stopped() => break,
                next = self.buffer.pop_timeout(self.settings.poll_timeout) => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(_) => {
                    info!("frame buffer closed");
                    break;
                }
            };

            match self.process(frame).await {
                Ok(Some(event)) => {
                    let sent = tokio::select! {
                        _ = stop.stopped() => break,
                        sent = self.events.send(event) => sent,
                    };
                    if sent.is_err() {
                        info!("detection consumer gone");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.record_failure();
                    warn!(error = %e, "inference failed, frame skipped");
                }
            }
        }

        info!(
            classified = self.stats.frames_classified(),
            skipped = self.stats.frames_skipped(),
            failures = self.stats.failures(),
            "inference worker stopped"
        );
    }
}
