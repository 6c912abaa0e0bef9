//! Trapezoidal step-delay profile

use std::time::Duration;

use contracts::RampConfig;

/// Per-step half-period schedule for a move
///
/// Linear from `start_delay` down to `min_delay` over the first
/// `accel_steps` steps, flat on the plateau, mirrored on the way out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampProfile {
    start_delay: Duration,
    min_delay: Duration,
    accel_steps: u32,
}

impl RampProfile {
    /// Ramped profile; `min_delay` is capped at `start_delay`
    pub fn new(start_delay: Duration, min_delay: Duration, accel_steps: u32) -> Self {
        Self {
            start_delay,
            min_delay: min_delay.min(start_delay),
            accel_steps,
        }
    }

    /// Same delay for every step
    pub fn constant(delay: Duration) -> Self {
        Self::new(delay, delay, 0)
    }

    pub fn from_config(config: &RampConfig) -> Self {
        if config.enabled {
            Self::new(
                Duration::from_secs_f64(config.start_delay_s),
                Duration::from_secs_f64(config.min_delay_s),
                config.accel_steps,
            )
        } else {
            Self::constant(Duration::from_secs_f64(config.constant_delay_s))
        }
    }

    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Ramp length actually used for an `n`-step move
    ///
    /// Shrinks to `n / 4` when two full ramps would not fit, so a plateau
    /// always remains.
    pub fn effective_accel(&self, n: u32) -> u32 {
        if self.accel_steps.saturating_mul(2) > n {
            n / 4
        } else {
            self.accel_steps
        }
    }

    /// Half-period of step `i` in an `n`-step move
    pub fn delay_at(&self, i: u32, n: u32) -> Duration {
        let accel = self.effective_accel(n);
        if accel == 0 || i >= n {
            return self.min_delay;
        }

        // Distance from the nearer end of the move
        let from_edge = i.min(n - 1 - i);
        if from_edge >= accel {
            return self.min_delay;
        }

        let start = self.start_delay.as_secs_f64();
        let min = self.min_delay.as_secs_f64();
        let fraction = f64::from(from_edge) / f64::from(accel);
        Duration::from_secs_f64(start - (start - min) * fraction)
    }

    /// All half-periods of an `n`-step move
    pub fn delays(&self, n: u32) -> impl Iterator<Item = Duration> + '_ {
        (0..n).map(move |i| self.delay_at(i, n))
    }

    /// Time spent pulsing an `n`-step move (both half-periods)
    pub fn move_duration(&self, n: u32) -> Duration {
        self.delays(n).sum::<Duration>() * 2
    }
}

impl Default for RampProfile {
    fn default() -> Self {
        Self::from_config(&RampConfig::default())
    }
}
