//! Simulated hardware for `sortbin run`

use std::sync::Arc;
use std::time::Duration;

use contracts::{RangeSensor, SorterBlueprint, StopSignal, WorkerHandle};
use ingestion::MockCameraScript;
use level_monitor::{SensorScript, SimulatedRangeSensor};
use tracing::{info, warn};

use crate::cli::SimScenario;

/// Every n-th captured frame carries a detection
pub const SIM_DETECTION_EVERY: u64 = 50;

/// Confidence reported by the simulated classifier
pub const SIM_CONFIDENCE: f32 = 0.9;

const CAMERA_FAULT_AFTER: Duration = Duration::from_secs(3);
const CAMERA_REPLUG_AFTER: Duration = Duration::from_secs(10);

/// One simulated range sensor per configured compartment
///
/// Compartments start progressively fuller (10%, 30%, 50%, ...).
pub fn range_sensors(
    blueprint: &SorterBlueprint,
) -> (Vec<Box<dyn RangeSensor>>, Vec<Arc<SensorScript>>) {
    let depth = blueprint.sensors.bin_depth_cm;
    blueprint
        .sensors
        .compartments
        .iter()
        .enumerate()
        .map(|(i, compartment)| {
            let fill = (0.1 + 0.2 * i as f64).min(0.95);
            let sensor = SimulatedRangeSensor::new(&compartment.name, depth * (1.0 - fill));
            let script = sensor.script();
            (Box::new(sensor) as Box<dyn RangeSensor>, script)
        })
        .unzip()
}

/// Injects the scenario's faults into the simulated devices
pub struct ScenarioDriver {
    scenario: SimScenario,
    camera: Arc<MockCameraScript>,
    sensors: Vec<Arc<SensorScript>>,
    poll_interval: Duration,
}

impl ScenarioDriver {
    pub fn new(
        scenario: SimScenario,
        camera: Arc<MockCameraScript>,
        sensors: Vec<Arc<SensorScript>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scenario,
            camera,
            sensors,
            poll_interval,
        }
    }

    pub fn spawn(self, stop: StopSignal) -> WorkerHandle {
        let signal = stop.clone();
        WorkerHandle::spawn("sim_scenario", stop, async move {
            tokio::select! {
                _ = signal.stopped() => {}
                _ = self.run() => {}
            }
        })
    }

    async fn run(self) {
        match self.scenario {
            SimScenario::Steady => {}
            SimScenario::CameraFault => {
                tokio::time::sleep(CAMERA_FAULT_AFTER).await;
                warn!("simulated camera unplugged");
                self.camera.disconnect();

                tokio::time::sleep(CAMERA_REPLUG_AFTER).await;
                self.camera.reconnect();
                info!("simulated camera plugged back in; send SIGHUP to restart capture");
            }
            SimScenario::SensorFault => {
                let Some(script) = self.sensors.first() else {
                    warn!("no level sensors configured, sensor fault not injected");
                    return;
                };
                tokio::time::sleep(self.poll_interval + Duration::from_secs(1)).await;
                warn!("simulated level sensor went offline");
                script.set_offline(true);
            }
        }
    }
}
