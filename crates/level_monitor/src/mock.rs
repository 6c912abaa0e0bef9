//! Simulated range sensor

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{ContractError, EchoPulse, RangeSensor};

/// Sound speed the simulated echo widths are computed with (cm/s)
const SIM_SOUND_SPEED: f64 = 34_300.0;

/// One scripted reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Distance(f64),
    Timeout,
    Saturated,
}

/// Shared control over a `SimulatedRangeSensor`
#[derive(Debug)]
pub struct SensorScript {
    distance_cm: Mutex<f64>,
    queued: Mutex<VecDeque<Reading>>,
    offline: AtomicBool,
}

impl SensorScript {
    /// Distance returned once the queue is empty
    pub fn set_distance(&self, distance_cm: f64) {
        *self
            .distance_cm
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = distance_cm;
    }

    /// Readings returned before falling back to the steady distance
    pub fn queue(&self, readings: impl IntoIterator<Item = Reading>) {
        self.queued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(readings);
    }

    /// Offline sensors time out on every read
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn next(&self) -> Reading {
        if self.offline.load(Ordering::SeqCst) {
            return Reading::Timeout;
        }
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        queued.unwrap_or_else(|| {
            Reading::Distance(
                *self
                    .distance_cm
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            )
        })
    }
}

/// Range sensor answering from a script instead of GPIO
#[derive(Debug)]
pub struct SimulatedRangeSensor {
    compartment: String,
    script: Arc<SensorScript>,
}

impl SimulatedRangeSensor {
    pub fn new(compartment: impl Into<String>, distance_cm: f64) -> Self {
        Self {
            compartment: compartment.into(),
            script: Arc::new(SensorScript {
                distance_cm: Mutex::new(distance_cm),
                queued: Mutex::new(VecDeque::new()),
                offline: AtomicBool::new(false),
            }),
        }
    }

    pub fn script(&self) -> Arc<SensorScript> {
        self.script.clone()
    }
}

impl RangeSensor for SimulatedRangeSensor {
    fn compartment(&self) -> &str {
        &self.compartment
    }

    fn echo_pulse(&mut self, timeout: Duration) -> Result<EchoPulse, ContractError> {
        match self.script.next() {
            Reading::Distance(distance) => Ok(EchoPulse::Width(Duration::from_secs_f64(
                distance.max(0.0) * 2.0 / SIM_SOUND_SPEED,
            ))),
            Reading::Saturated => Ok(EchoPulse::Saturated),
            Reading::Timeout => Err(ContractError::SensorTimeout {
                compartment: self.compartment.clone(),
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
