//! Simulated actuator hardware
//!
//! `SimulatedStepperDriver` tracks pulses and the enable line instead of
//! toggling GPIO; `RecordingDelay` accounts for requested waits.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{ContractError, StepperDriver};
use embedded_hal::delay::DelayNs;

/// Observable state of a simulated driver
#[derive(Debug, Default)]
pub struct DriverLog {
    position: AtomicI64,
    pulses: AtomicU64,
    enabled: AtomicBool,
    forward: AtomicBool,
    step_high: AtomicBool,
}

impl DriverLog {
    /// Net position from counted rising edges
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    /// Total rising edges on the step line
    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::SeqCst)
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Driver stand-in counting step pulses
#[derive(Debug, Default)]
pub struct SimulatedStepperDriver {
    log: Arc<DriverLog>,
    fail_on_pulse: Option<u64>,
    stuck: bool,
}

impl SimulatedStepperDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail once when the `pulse`-th pulse (counted from 1) is emitted
    pub fn fail_on_pulse(mut self, pulse: u64) -> Self {
        self.fail_on_pulse = Some(pulse);
        self
    }

    /// Fail every pulse from the `pulse`-th on, as a jammed gate would
    pub fn stuck_from_pulse(mut self, pulse: u64) -> Self {
        self.fail_on_pulse = Some(pulse);
        self.stuck = true;
        self
    }

    pub fn log(&self) -> Arc<DriverLog> {
        self.log.clone()
    }
}

impl StepperDriver for SimulatedStepperDriver {
    fn set_direction(&mut self, forward: bool) -> Result<(), ContractError> {
        self.log.forward.store(forward, Ordering::SeqCst);
        Ok(())
    }

    fn set_step(&mut self, high: bool) -> Result<(), ContractError> {
        let was_high = self.log.step_high.swap(high, Ordering::SeqCst);
        if !high || was_high {
            return Ok(());
        }

        let pulse = self.log.pulses.load(Ordering::SeqCst) + 1;
        if self.fail_on_pulse.is_some_and(|fail| pulse >= fail) {
            if !self.stuck {
                self.fail_on_pulse = None;
            }
            self.log.step_high.store(false, Ordering::SeqCst);
            return Err(ContractError::actuator(format!("step line stuck at pulse {pulse}")));
        }

        self.log.pulses.store(pulse, Ordering::SeqCst);
        let delta = if self.log.forward.load(Ordering::SeqCst) { 1 } else { -1 };
        self.log.position.fetch_add(delta, Ordering::SeqCst);
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), ContractError> {
        self.log.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn has_enable_line(&self) -> bool {
        true
    }
}

/// `DelayNs` that only adds up the requested time
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    total_ns: Arc<AtomicU64>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all requested waits
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_ns.load(Ordering::SeqCst))
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.fetch_add(u64::from(ns), Ordering::SeqCst);
    }
}
