//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Configuration files through `config_loader`
//! - Simulated e2e runs (no camera, GPIO or model required):
//!   mock camera -> inference -> arbiter -> sequencer, level monitor,
//!   state aggregator -> bridge -> client

#[cfg(test)]
mod contract_tests {
    use std::io::Write;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::SorterBlueprint;

    #[test]
    fn test_default_blueprint_is_valid() {
        ConfigLoader::validate(&SorterBlueprint::default()).unwrap();
    }

    #[test]
    fn test_toml_file_round_trip() {
        let mut blueprint = SorterBlueprint::default();
        blueprint.classes[3].target_steps = None;
        blueprint.bridge.port = 6001;

        let content = ConfigLoader::to_string(&blueprint, ConfigFormat::Toml).unwrap();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let loaded = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(loaded.bridge.address(), "127.0.0.1:6001");
        assert_eq!(loaded.target_steps_map().len(), 3);
        assert_eq!(loaded.compartment_names(), blueprint.compartment_names());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use actuation::{
        ActuationGate, ActuationStats, ActuatorSequencer, ArbiterWorker, DetectionArbiter,
        DriverLog, RecordingDelay, SequencerWorker, SimulatedStepperDriver, StepperMotor,
    };
    use contracts::{
        spawn_periodic, Classifier, RangeSensor, RawDetection, SorterBlueprint, StateEvent,
        StateSnapshot, StopSignal, SystemStatus, WireSnapshot, WorkerExit, WorkerHandle,
    };
    use inference::{InferenceWorker, ScriptedClassifier};
    use ingestion::{CaptureControl, CaptureLoop, FrameBuffer, FrameIngest, MockCamera, MockCameraScript};
    use level_monitor::{LevelMonitor, LevelMonitorTask, SensorScript, SimulatedRangeSensor};
    use state_bridge::{StateAggregator, StateBridgeServer, StateClient, StateStore};
    use tokio::sync::mpsc;

    const DEADLINE: Duration = Duration::from_secs(10);

    /// Defaults with the timing shrunk for tests
    fn fast_blueprint() -> SorterBlueprint {
        let mut blueprint = SorterBlueprint::default();
        blueprint.camera.frame_width = 32;
        blueprint.camera.frame_height = 24;
        blueprint.camera.capture_interval_ms = 2;
        blueprint.camera.max_retries = 2;
        blueprint.camera.retry_backoff_ms = 5;
        blueprint.detection.skip_frames = 0;
        blueprint.detection.poll_timeout_ms = 10;
        blueprint.actuator.drop_delay_s = 0.0;
        blueprint.actuator.return_pause_s = 0.0;
        blueprint
    }

    fn plastic() -> RawDetection {
        RawDetection {
            xyxy: [4.0, 4.0, 20.0, 16.0],
            confidence: 0.9,
            class_index: 2,
        }
    }

    /// Every stage wired on simulated devices
    struct Harness {
        stop: StopSignal,
        handles: Vec<WorkerHandle>,
        buffer: FrameBuffer,
        client: StateClient,
        camera: Arc<MockCameraScript>,
        capture: CaptureControl,
        sensors: Vec<Arc<SensorScript>>,
        driver: Arc<DriverLog>,
        arbiter: Arc<DetectionArbiter>,
        actuation: Arc<ActuationStats>,
    }

    impl Harness {
        async fn start(blueprint: &SorterBlueprint, classifier: Arc<dyn Classifier>) -> Self {
            Self::start_with_driver(blueprint, classifier, SimulatedStepperDriver::new()).await
        }

        async fn start_with_driver(
            blueprint: &SorterBlueprint,
            classifier: Arc<dyn Classifier>,
            driver: SimulatedStepperDriver,
        ) -> Self {
            let stop = StopSignal::new();
            let store = StateStore::new(StateSnapshot::new(blueprint.compartment_names()));

            let server =
                StateBridgeServer::bind("127.0.0.1:0", store.reader(), (&blueprint.bridge).into())
                    .await
                    .unwrap();
            let client = StateClient::new(server.local_addr().unwrap().to_string());

            let (state_tx, state_rx) = mpsc::channel(64);
            let (detection_tx, detection_rx) = mpsc::channel(16);
            let (job_tx, job_rx) = mpsc::channel(1);
            let mut handles = vec![
                StateAggregator::new(store, state_rx).spawn(stop.clone()),
                server.spawn(stop.clone()),
            ];

            // Actuation
            let driver_log = driver.log();
            let motor =
                StepperMotor::from_config(driver, RecordingDelay::new(), &blueprint.actuator)
                    .unwrap();
            let sequencer =
                SequencerWorker::new(ActuatorSequencer::new(motor, (&blueprint.actuator).into()), job_rx)
                    .with_status(state_tx.clone());
            let actuation = sequencer.stats();
            handles.push(sequencer.spawn(stop.clone()));

            let arbiter = Arc::new(DetectionArbiter::from_blueprint(ActuationGate::new(), blueprint));
            handles.push(
                ArbiterWorker::new(arbiter.clone(), detection_rx, job_tx, state_tx.clone())
                    .spawn(stop.clone()),
            );

            // Inference
            let buffer = FrameBuffer::with_config((&blueprint.detection).into());
            handles.push(
                InferenceWorker::new(classifier, buffer.clone(), detection_tx, blueprint.into())
                    .spawn(stop.clone()),
            );

            // Level monitor: Metal 10%, Glass 30%, Plastic 50%, Carton 70%
            let (sensors, scripts): (Vec<Box<dyn RangeSensor>>, Vec<Arc<SensorScript>>) = blueprint
                .sensors
                .compartments
                .iter()
                .zip([45.0, 35.0, 25.0, 15.0])
                .map(|(compartment, distance)| {
                    let sensor = SimulatedRangeSensor::new(&compartment.name, distance);
                    let script = sensor.script();
                    (Box::new(sensor) as Box<dyn RangeSensor>, script)
                })
                .unzip();
            let monitor = LevelMonitor::new(sensors, (&blueprint.sensors).into(), RecordingDelay::new());
            handles.push(spawn_periodic(
                LevelMonitorTask::new(monitor, state_tx.clone(), Duration::from_millis(20)),
                stop.clone(),
            ));

            state_tx
                .send(StateEvent::Status(SystemStatus::active("test run")))
                .await
                .unwrap();

            // Capture
            let camera = MockCamera::new(0, blueprint.camera.frame_width, blueprint.camera.frame_height);
            let camera_script = camera.script();
            let mut ingest = FrameIngest::new(camera, &blueprint.camera)
                .with_stop(stop.clone())
                .with_metrics(buffer.metrics());
            ingest.open().await.unwrap();
            let capture = CaptureLoop::new(
                ingest,
                buffer.clone(),
                state_tx.clone(),
                Duration::from_millis(blueprint.camera.capture_interval_ms),
            );
            let capture_control = capture.control();
            handles.push(spawn_periodic(capture, stop.clone()));

            Self {
                stop,
                handles,
                buffer,
                client,
                camera: camera_script,
                capture: capture_control,
                sensors: scripts,
                driver: driver_log,
                arbiter,
                actuation,
            }
        }

        /// Poll the bridge until `accept` holds
        async fn wait_for(&self, what: &str, accept: impl Fn(&WireSnapshot) -> bool) -> WireSnapshot {
            let started = Instant::now();
            loop {
                if let Ok(snapshot) = self.client.fetch().await {
                    if accept(&snapshot) {
                        return snapshot;
                    }
                }
                assert!(started.elapsed() < DEADLINE, "timed out waiting for {what}");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        async fn shutdown(self) {
            self.stop.stop();
            self.buffer.close();
            for handle in self.handles {
                let name = handle.name().to_string();
                assert_eq!(
                    handle.join(Duration::from_secs(5)).await,
                    WorkerExit::Completed,
                    "{name} did not exit cleanly"
                );
            }
        }
    }

    /// mock camera -> inference -> arbiter -> sequencer, state -> bridge -> client
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_repeated_detection_sorts_once() {
        let blueprint = fast_blueprint();
        let classifier = Arc::new(ScriptedClassifier::repeating(vec![plastic()]));
        let harness = Harness::start(&blueprint, classifier).await;

        let snapshot = harness
            .wait_for("plastic detection and levels", |s| {
                s.system_status == "active"
                    && s.detection.as_ref().is_some_and(|d| d.class_name == "Plastic")
                    && s.fill_levels.get("Plastic") == Some(&Some(50.0))
            })
            .await;
        assert_eq!(snapshot.fill_levels.get("Metal"), Some(&Some(10.0)));

        let started = Instant::now();
        while harness.actuation.completed() < 1 {
            assert!(started.elapsed() < DEADLINE, "sort sequence never completed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Keep feeding the same class; it must not trigger again
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(harness.actuation.completed(), 1);
        assert_eq!(harness.actuation.failed(), 0);
        assert_eq!(harness.arbiter.counts().get("Plastic"), 1);
        assert!(!harness.arbiter.gate().is_busy());
        assert_eq!(harness.driver.position(), 0);
        assert_eq!(harness.driver.pulses(), 200);

        harness.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_jammed_gate_reports_error_status() {
        let blueprint = fast_blueprint();
        let classifier = Arc::new(ScriptedClassifier::repeating(vec![plastic()]));
        // Plastic sits at step 100: the move out succeeds, the way back and
        // the recovery move both jam
        let driver = SimulatedStepperDriver::new().stuck_from_pulse(110);
        let harness = Harness::start_with_driver(&blueprint, classifier, driver).await;

        harness
            .wait_for("error status after the plastic sort", |s| {
                s.system_status == "error"
                    && s.detection.as_ref().is_some_and(|d| d.class_name == "Plastic")
            })
            .await;

        assert_eq!(harness.actuation.failed(), 1);
        assert_eq!(harness.actuation.completed(), 0);
        assert!(!harness.arbiter.gate().is_busy());
        assert_eq!(harness.driver.position(), 100 - 9);

        harness.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_sensor_failure_serves_cached_level() {
        let blueprint = fast_blueprint();
        let harness = Harness::start(&blueprint, Arc::new(ScriptedClassifier::new())).await;

        harness
            .wait_for("first fill levels", |s| s.fill_levels.get("Metal") == Some(&Some(10.0)))
            .await;

        harness.sensors[0].set_offline(true);
        harness.sensors[1].set_distance(20.0);
        let snapshot = harness
            .wait_for("updated glass level", |s| s.fill_levels.get("Glass") == Some(&Some(60.0)))
            .await;

        assert_eq!(snapshot.fill_levels.get("Metal"), Some(&Some(10.0)));
        assert!(snapshot.detection.is_none());
        assert_eq!(snapshot.system_status, "active");

        let reply = harness.client.send_raw("PING").await.unwrap();
        assert!(reply.get("error").is_some());

        harness.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_camera_exhaustion_degrades_until_restart() {
        let blueprint = fast_blueprint();
        let harness = Harness::start(&blueprint, Arc::new(ScriptedClassifier::new())).await;
        harness.wait_for("active status", |s| s.system_status == "active").await;

        harness.camera.disconnect();
        harness.wait_for("error status", |s| s.system_status == "error").await;

        let opens = harness.camera.open_calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.camera.open_calls(), opens, "no reconnects while failed");

        harness.camera.reconnect();
        harness.capture.restart();
        harness.wait_for("recovered status", |s| s.system_status == "active").await;

        harness.shutdown().await;
    }
}
