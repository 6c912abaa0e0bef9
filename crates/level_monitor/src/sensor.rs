//! HC-SR04 style ultrasonic sensor over `embedded-hal` pins

use std::time::{Duration, Instant};

use contracts::{ContractError, EchoPulse, RangeSensor};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, InputPin, OutputPin};

/// Trigger held low before the pulse
const TRIGGER_SETTLE_US: u32 = 20;
/// Trigger pulse width
const TRIGGER_PULSE_US: u32 = 10;

/// One trigger/echo pin pair
pub struct UltrasonicSensor<Trig, Echo, D> {
    compartment: String,
    trigger: Trig,
    echo: Echo,
    delay: D,
}

impl<Trig, Echo, D> UltrasonicSensor<Trig, Echo, D>
where
    Trig: OutputPin,
    Echo: InputPin,
    D: DelayNs,
{
    pub fn new(compartment: impl Into<String>, trigger: Trig, echo: Echo, delay: D) -> Self {
        Self {
            compartment: compartment.into(),
            trigger,
            echo,
            delay,
        }
    }

    fn fire(&mut self) -> Result<(), ContractError> {
        self.trigger.set_low().map_err(|e| self.pin_error("trigger", e.kind()))?;
        self.delay.delay_us(TRIGGER_SETTLE_US);
        self.trigger.set_high().map_err(|e| self.pin_error("trigger", e.kind()))?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.set_low().map_err(|e| self.pin_error("trigger", e.kind()))
    }

    fn echo_high(&mut self) -> Result<bool, ContractError> {
        let compartment = &self.compartment;
        self.echo
            .is_high()
            .map_err(|e| ContractError::sensor(compartment.clone(), format!("echo read failed: {:?}", e.kind())))
    }

    fn pin_error(&self, line: &str, kind: embedded_hal::digital::ErrorKind) -> ContractError {
        ContractError::sensor(self.compartment.clone(), format!("{line} write failed: {kind:?}"))
    }
}

impl<Trig, Echo, D> RangeSensor for UltrasonicSensor<Trig, Echo, D>
where
    Trig: OutputPin + Send,
    Echo: InputPin + Send,
    D: DelayNs + Send,
{
    fn compartment(&self) -> &str {
        &self.compartment
    }

    fn echo_pulse(&mut self, timeout: Duration) -> Result<EchoPulse, ContractError> {
        self.fire()?;

        let waiting = Instant::now();
        while !self.echo_high()? {
            if waiting.elapsed() > timeout {
                return Err(ContractError::SensorTimeout {
                    compartment: self.compartment.clone(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            std::hint::spin_loop();
        }

        let rise = Instant::now();
        while self.echo_high()? {
            if rise.elapsed() > timeout {
                return Ok(EchoPulse::Saturated);
            }
            std::hint::spin_loop();
        }
        Ok(EchoPulse::Width(rise.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ThreadDelay;
    use std::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    struct NullPin;

    impl ErrorType for NullPin {
        type Error = Infallible;
    }

    impl OutputPin for NullPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    /// Echo line that is high for a fixed window after the first poll
    struct TimedEcho {
        rise_after: Duration,
        high_for: Option<Duration>,
        first_poll: Option<Instant>,
    }

    impl TimedEcho {
        fn new(rise_after: Duration, high_for: Option<Duration>) -> Self {
            Self {
                rise_after,
                high_for,
                first_poll: None,
            }
        }
    }

    impl ErrorType for TimedEcho {
        type Error = Infallible;
    }

    impl InputPin for TimedEcho {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            let start = *self.first_poll.get_or_insert_with(Instant::now);
            let t = start.elapsed();
            if t < self.rise_after {
                return Ok(false);
            }
            Ok(match self.high_for {
                Some(width) => t < self.rise_after + width,
                None => true,
            })
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    #[test]
    fn test_measures_pulse_width() {
        let echo = TimedEcho::new(Duration::from_millis(1), Some(Duration::from_millis(3)));
        let mut sensor = UltrasonicSensor::new("Metal", NullPin, echo, ThreadDelay);

        match sensor.echo_pulse(Duration::from_millis(500)).unwrap() {
            EchoPulse::Width(width) => {
                assert!(width >= Duration::from_millis(2), "{width:?}");
                assert!(width < Duration::from_millis(50), "{width:?}");
            }
            EchoPulse::Saturated => panic!("unexpected saturation"),
        }
    }

    #[test]
    fn test_no_echo_times_out() {
        let echo = TimedEcho::new(Duration::from_secs(60), None);
        let mut sensor = UltrasonicSensor::new("Glass", NullPin, echo, ThreadDelay);

        let err = sensor.echo_pulse(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ContractError::SensorTimeout { waited_ms: 20, .. }));
    }

    #[test]
    fn test_stuck_high_echo_is_saturated() {
        let echo = TimedEcho::new(Duration::ZERO, None);
        let mut sensor = UltrasonicSensor::new("Carton", NullPin, echo, ThreadDelay);

        assert_eq!(
            sensor.echo_pulse(Duration::from_millis(20)).unwrap(),
            EchoPulse::Saturated
        );
    }
}
