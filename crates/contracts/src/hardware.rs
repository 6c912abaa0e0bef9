//! Hardware and service seams
//!
//! Traits decoupling the coordination layer from the camera, the classifier
//! model, the stepper driver and the ultrasonic sensors. Real back-ends and the
//! simulated ones used in tests implement the same interfaces.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

use crate::{ContractError, Frame, RawDetection};

/// Capture device
///
/// # Example
///
/// ```ignore
/// let mut camera = MockCamera::new(0, 640, 480);
/// camera.open().await?;
/// let frame = camera.read().await?;
/// camera.release().await;
/// ```
#[trait_variant::make(FrameSource: Send)]
pub trait LocalFrameSource {
    /// Device index (used for logging/metrics)
    fn index(&self) -> u32;

    /// Open (or reopen) the device
    async fn open(&mut self) -> Result<(), ContractError>;

    /// Grab one frame
    async fn read(&mut self) -> Result<Frame, ContractError>;

    /// Release the device; reading afterwards requires `open`
    async fn release(&mut self);

    /// Whether the device is currently open
    fn is_open(&self) -> bool;
}

/// Image classification model
///
/// Stateless per call; invoked from the blocking thread pool.
pub trait Classifier: Send + Sync {
    /// Model name (used for logging)
    fn name(&self) -> &str;

    /// Run the model on one frame
    ///
    /// # Errors
    /// Returns classifier error (should include the frame id)
    fn classify(&self, frame: &Frame) -> Result<Vec<RawDetection>, ContractError>;
}

/// Step/direction stepper driver (A4988 style)
pub trait StepperDriver: Send {
    /// Drive the direction line; `true` moves towards increasing positions
    fn set_direction(&mut self, forward: bool) -> Result<(), ContractError>;

    /// Drive the step line
    fn set_step(&mut self, high: bool) -> Result<(), ContractError>;

    /// Enable or disable the driver outputs (no-op without an enable line)
    fn set_enabled(&mut self, enabled: bool) -> Result<(), ContractError>;

    /// Whether a separate enable line is wired
    fn has_enable_line(&self) -> bool;
}

/// Outcome of one echo measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoPulse {
    /// Echo went high then low again
    Width(Duration),

    /// Echo stayed high past the timeout (object right under the sensor)
    Saturated,
}

/// Ultrasonic range sensor (HC-SR04 style)
pub trait RangeSensor: Send {
    /// Compartment this sensor watches
    fn compartment(&self) -> &str;

    /// Fire one trigger pulse and time the echo
    ///
    /// # Errors
    /// Returns `SensorTimeout` if the echo never rises within `timeout`
    fn echo_pulse(&mut self, timeout: Duration) -> Result<EchoPulse, ContractError>;
}

/// `DelayNs` for host threads
///
/// Short waits busy-spin since the OS scheduler cannot honor microsecond
/// sleeps; longer ones sleep the thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

const SPIN_THRESHOLD_NS: u32 = 200_000;

impl DelayNs for ThreadDelay {
    fn delay_ns(&mut self, ns: u32) {
        let wait = Duration::from_nanos(u64::from(ns));
        if ns < SPIN_THRESHOLD_NS {
            let start = Instant::now();
            while start.elapsed() < wait {
                std::hint::spin_loop();
            }
        } else {
            std::thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_delay_waits_at_least_requested() {
        let mut delay = ThreadDelay;
        let start = Instant::now();
        delay.delay_us(50);
        delay.delay_ms(2);
        assert!(start.elapsed() >= Duration::from_micros(2050));
    }
}
