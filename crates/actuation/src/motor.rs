//! Stepper motor position control

use std::time::Duration;

use contracts::{ActuatorConfig, ContractError, StepperDriver};
use embedded_hal::delay::DelayNs;
use tracing::{debug, info, instrument};

use crate::ramp::RampProfile;

/// Progress is logged every this many steps
const PROGRESS_EVERY: u32 = 25;

/// Step/direction motor with a tracked absolute position
///
/// The position is an open-loop count: it is only advanced once a move has
/// emitted every pulse, so a move aborted halfway leaves the old value.
pub struct StepperMotor<D, T> {
    driver: D,
    delay: T,
    ramp: RampProfile,
    settle: Duration,
    position: i64,
    enabled: bool,
}

impl<D: StepperDriver, T: DelayNs> StepperMotor<D, T> {
    /// Take over the driver at position 0 with outputs disabled
    pub fn new(
        mut driver: D,
        delay: T,
        ramp: RampProfile,
        settle: Duration,
    ) -> Result<Self, ContractError> {
        driver.set_step(false)?;
        driver.set_enabled(false)?;
        Ok(Self {
            driver,
            delay,
            ramp,
            settle,
            position: 0,
            enabled: false,
        })
    }

    pub fn from_config(driver: D, delay: T, config: &ActuatorConfig) -> Result<Self, ContractError> {
        Self::new(
            driver,
            delay,
            RampProfile::from_config(&config.ramp),
            Duration::from_millis(config.settle_ms),
        )
    }

    /// Current position in steps
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn ramp(&self) -> &RampProfile {
        &self.ramp
    }

    /// Move to an absolute position; blocks for the whole move
    ///
    /// The tracked position only changes once every pulse was emitted, so a
    /// failed move leaves it at the start of the move.
    ///
    /// # Errors
    /// Any driver error while enabling, setting direction or pulsing.
    #[instrument(name = "motor_move", skip(self), fields(from = self.position))]
    pub fn move_to(&mut self, target: i64) -> Result<(), ContractError> {
        if target == self.position {
            debug!(target, "motor already in position");
            return Ok(());
        }

        self.enable()?;

        let delta = target - self.position;
        self.driver.set_direction(delta > 0)?;
        self.pause(self.settle);

        let n = u32::try_from(delta.unsigned_abs()).map_err(|_| {
            ContractError::actuator(format!("move of {delta} steps exceeds the step counter"))
        })?;
        for i in 0..n {
            let half_period = self.ramp.delay_at(i, n);
            self.driver.set_step(true)?;
            self.pause(half_period);
            self.driver.set_step(false)?;
            self.pause(half_period);

            if i % PROGRESS_EVERY == 0 || i + 1 == n {
                debug!(
                    step = i + 1,
                    total = n,
                    progress = f64::from(i + 1) / f64::from(n) * 100.0,
                    "move progress"
                );
            }
        }

        self.position = target;
        observability::metrics::record_motor_position(target);
        info!(position = target, steps = n, "motor moved");
        Ok(())
    }

    /// Hold position for `duration`
    pub fn dwell(&mut self, duration: Duration) {
        self.pause(duration);
    }

    /// Cut the driver outputs; the next move re-enables them
    pub fn disable(&mut self) -> Result<(), ContractError> {
        self.driver.set_enabled(false)?;
        self.enabled = false;
        debug!("motor driver disabled");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self) -> Result<(), ContractError> {
        if self.enabled {
            return Ok(());
        }
        self.driver.set_enabled(true)?;
        self.enabled = true;
        if self.driver.has_enable_line() {
            self.pause(self.settle);
        }
        Ok(())
    }

    fn pause(&mut self, duration: Duration) {
        let micros = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        self.delay.delay_us(micros);
    }
}
