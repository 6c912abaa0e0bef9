//! Pipeline orchestrator - wires every stage and owns the run lifecycle.
//!
//! Runs on simulated hardware: mock camera, simulated classifier, simulated
//! stepper driver and range sensors.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actuation::{
    ActuationGate, ActuatorSequencer, ArbiterWorker, DetectionArbiter, SequencerWorker,
    SimulatedStepperDriver, StepperMotor,
};
use anyhow::{Context, Result};
use contracts::{
    spawn_periodic, SorterBlueprint, StateEvent, StateSnapshot, StopSignal, SystemStatus,
    ThreadDelay, WorkerHandle, DEFAULT_JOIN_TIMEOUT,
};
use inference::{InferenceWorker, SimulatedClassifier};
use ingestion::{CaptureControl, CaptureLoop, FrameBuffer, FrameIngest, MockCamera};
use level_monitor::{LevelMonitor, LevelMonitorTask};
use observability::RunSummary;
use state_bridge::{StateAggregator, StateBridgeServer, StateStore};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::scenario::{self, ScenarioDriver, SIM_CONFIDENCE, SIM_DETECTION_EVERY};
use super::PipelineStats;
use crate::cli::SimScenario;
use crate::error::CliError;

/// Buffered state events between workers and the aggregator
const STATE_CHANNEL_CAPACITY: usize = 64;

/// Buffered detection events between inference and the arbiter
const DETECTION_CHANNEL_CAPACITY: usize = 16;

/// How often core workers are checked for an early exit
const WORKER_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The sorter blueprint configuration
    pub blueprint: SorterBlueprint,

    /// Pipeline timeout (None = run until shutdown)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Simulated hardware behaviour
    pub scenario: SimScenario,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves or the timeout elapses
    ///
    /// A camera that cannot be opened aborts startup; every other device
    /// failure degrades the run without ending it.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        info!(scenario = ?self.config.scenario, "Running on simulated hardware");

        let stop = StopSignal::new();
        let store = StateStore::new(StateSnapshot::new(blueprint.compartment_names()));
        let reader = store.reader();

        // Camera first: failing to open it is fatal
        let buffer = FrameBuffer::with_config((&blueprint.detection).into());
        let camera = MockCamera::new(
            blueprint.camera.index,
            blueprint.camera.frame_width,
            blueprint.camera.frame_height,
        );
        let camera_script = camera.script();
        let mut ingest = FrameIngest::new(camera, &blueprint.camera)
            .with_stop(stop.clone())
            .with_metrics(buffer.metrics());
        if let Err(e) = ingest.open().await {
            store.apply(StateEvent::Status(SystemStatus::error(format!(
                "camera init failed: {e}"
            ))));
            return Err(CliError::startup(format!("camera {}: {e}", blueprint.camera.index)).into());
        }
        let ingest_metrics = ingest.metrics();

        // State bridge
        let server = StateBridgeServer::from_config(&blueprint.bridge, store.reader())
            .await
            .context("Failed to start state bridge")?;
        let bridge_requests = server.requests();
        info!(addr = %server.local_addr()?, "State bridge ready");

        // Level sensors: self test before monitoring starts
        let (sensors, sensor_scripts) = scenario::range_sensors(blueprint);
        let monitor = LevelMonitor::new(sensors, (&blueprint.sensors).into(), ThreadDelay);
        let (monitor, unresponsive) = tokio::task::spawn_blocking(move || {
            let mut monitor = monitor;
            let unresponsive = monitor.self_test();
            (monitor, unresponsive)
        })
        .await
        .context("Level sensor self test panicked")?;
        if !unresponsive.is_empty() {
            warn!(compartments = ?unresponsive, "level sensors not responding, monitoring anyway");
        }

        // Actuation
        let motor = StepperMotor::from_config(
            SimulatedStepperDriver::new(),
            ThreadDelay,
            &blueprint.actuator,
        )
        .context("Failed to initialize stepper motor")?;
        let sequencer = ActuatorSequencer::new(motor, (&blueprint.actuator).into());
        let phase = sequencer.phase();
        let arbiter = Arc::new(DetectionArbiter::from_blueprint(
            ActuationGate::new(),
            blueprint,
        ));

        // Channels
        let (state_tx, state_rx) = mpsc::channel(STATE_CHANNEL_CAPACITY);
        let (detection_tx, detection_rx) = mpsc::channel(DETECTION_CHANNEL_CAPACITY);
        let (job_tx, job_rx) = mpsc::channel(1);

        // Core workers, downstream first. These only exit on stop, so an
        // earlier exit is reported as an error status.
        let mut handles: Vec<WorkerHandle> = Vec::new();
        handles.push(StateAggregator::new(store, state_rx).spawn(stop.clone()));

        let sequencer_worker =
            SequencerWorker::new(sequencer, job_rx).with_status(state_tx.clone());
        let actuation_stats = sequencer_worker.stats();
        handles.push(sequencer_worker.spawn(stop.clone()));

        handles.push(
            ArbiterWorker::new(arbiter.clone(), detection_rx, job_tx, state_tx.clone())
                .spawn(stop.clone()),
        );

        let classifier = Arc::new(SimulatedClassifier::new(
            blueprint.classes.len(),
            SIM_DETECTION_EVERY,
            SIM_CONFIDENCE,
        ));
        let inference = InferenceWorker::new(
            classifier,
            buffer.clone(),
            detection_tx,
            blueprint.into(),
        );
        let inference_stats = inference.stats();
        handles.push(inference.spawn(stop.clone()));

        let poll_interval = Duration::from_secs_f64(blueprint.sensors.poll_interval_s);
        let level_task = LevelMonitorTask::new(monitor, state_tx.clone(), poll_interval);
        let monitor = level_task.monitor();
        handles.push(spawn_periodic(level_task, stop.clone()));

        let capture = CaptureLoop::new(
            ingest,
            buffer.clone(),
            state_tx.clone(),
            Duration::from_millis(blueprint.camera.capture_interval_ms),
        );
        let control = capture.control();
        handles.push(spawn_periodic(capture, stop.clone()));

        // Auxiliary workers may finish on their own
        let mut auxiliary: Vec<WorkerHandle> = Vec::new();
        auxiliary.push(
            ScenarioDriver::new(
                self.config.scenario,
                camera_script,
                sensor_scripts,
                poll_interval,
            )
            .spawn(stop.clone()),
        );
        if let Some(handle) = spawn_restart_listener(control, stop.clone()) {
            auxiliary.push(handle);
        }

        // Joined after every other worker
        let bridge = server.spawn(stop.clone());

        publish(&state_tx, SystemStatus::active("sorter running")).await;
        info!(
            classes = blueprint.classes.len(),
            compartments = blueprint.sensors.compartments.len(),
            "Pipeline running"
        );

        let timeout = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(timeout);
        let mut check = tokio::time::interval(WORKER_CHECK_INTERVAL);
        let mut exited = HashSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = &mut timeout => {
                    info!("Run timeout reached");
                    break;
                }
                _ = check.tick() => {
                    for name in newly_exited(&handles, &mut exited) {
                        error!(worker = %name, "worker exited before shutdown");
                        publish(
                            &state_tx,
                            SystemStatus::error(format!("{name} stopped unexpectedly")),
                        )
                        .await;
                    }
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        publish(&state_tx, SystemStatus::inactive("sorter stopped")).await;
        drop(state_tx);
        stop.stop();
        buffer.close();

        for handle in handles.into_iter().chain(auxiliary) {
            handle.join(DEFAULT_JOIN_TIMEOUT).await;
        }
        bridge.join(DEFAULT_JOIN_TIMEOUT).await;

        let ingested = ingest_metrics.snapshot();
        let summary = RunSummary {
            frames_captured: ingested.frames_captured,
            frames_dropped: ingested.frames_dropped,
            frames_classified: inference_stats.frames_classified(),
            frames_skipped: inference_stats.frames_skipped(),
            inference_failures: inference_stats.failures(),
            actuations: actuation_stats.completed(),
            actuation_failures: actuation_stats.failed(),
            sensor_failures: monitor
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .failures(),
            bridge_requests: bridge_requests.load(Ordering::Relaxed),
            inference_latency_ms: inference_stats.latency(),
            actuation_duration_ms: actuation_stats.duration(),
            class_counts: arbiter.counts().per_class,
        };

        let stats = PipelineStats {
            summary,
            duration: start_time.elapsed(),
            final_phase: phase.get(),
            final_state: reader.snapshot().to_wire(),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Names of finished workers not reported before
fn newly_exited(handles: &[WorkerHandle], reported: &mut HashSet<String>) -> Vec<String> {
    handles
        .iter()
        .filter(|handle| handle.is_finished())
        .filter(|handle| reported.insert(handle.name().to_string()))
        .map(|handle| handle.name().to_string())
        .collect()
}

async fn publish(events: &mpsc::Sender<StateEvent>, status: SystemStatus) {
    if events.send(StateEvent::Status(status)).await.is_err() {
        warn!("state aggregator gone, status update lost");
    }
}

/// Restart a failed camera on SIGHUP
#[cfg(unix)]
fn spawn_restart_listener(control: CaptureControl, stop: StopSignal) -> Option<WorkerHandle> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!(error = %e, "Failed to install SIGHUP handler, camera restart unavailable");
            return None;
        }
    };

    let signal = stop.clone();
    Some(WorkerHandle::spawn("camera_restart", stop, async move {
        loop {
            tokio::select! {
                _ = signal.stopped() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    info!("SIGHUP received, restarting camera");
                    control.restart();
                }
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_restart_listener(_control: CaptureControl, _stop: StopSignal) -> Option<WorkerHandle> {
    None
}
