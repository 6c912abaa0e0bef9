//! A4988-style driver over `embedded-hal` output pins

use contracts::{ContractError, StepperDriver};
use embedded_hal::digital::{Error as _, OutputPin};

use crate::error::ActuationError;

/// Direction, step and optional enable lines
pub struct GpioStepperDriver<Dir, Step, En> {
    dir: Dir,
    step: Step,
    enable: Option<En>,
    enable_active_low: bool,
}

impl<Dir, Step, En> GpioStepperDriver<Dir, Step, En>
where
    Dir: OutputPin,
    Step: OutputPin,
    En: OutputPin,
{
    pub fn new(dir: Dir, step: Step, enable: Option<En>, enable_active_low: bool) -> Self {
        Self {
            dir,
            step,
            enable,
            enable_active_low,
        }
    }

    /// Give the pins back
    pub fn release(self) -> (Dir, Step, Option<En>) {
        (self.dir, self.step, self.enable)
    }
}

fn write<P: OutputPin>(pin: &mut P, line: &'static str, high: bool) -> Result<(), ContractError> {
    let result = if high { pin.set_high() } else { pin.set_low() };
    result.map_err(|e| ActuationError::pin(line, e.kind()).into())
}

impl<Dir, Step, En> StepperDriver for GpioStepperDriver<Dir, Step, En>
where
    Dir: OutputPin + Send,
    Step: OutputPin + Send,
    En: OutputPin + Send,
{
    fn set_direction(&mut self, forward: bool) -> Result<(), ContractError> {
        write(&mut self.dir, "direction", forward)
    }

    fn set_step(&mut self, high: bool) -> Result<(), ContractError> {
        write(&mut self.step, "step", high)
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), ContractError> {
        let active_low = self.enable_active_low;
        match self.enable.as_mut() {
            Some(pin) => write(pin, "enable", enabled != active_low),
            None => Ok(()),
        }
    }

    fn has_enable_line(&self) -> bool {
        self.enable.is_some()
    }
}
