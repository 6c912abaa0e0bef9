//! LevelMonitor - fill levels from ultrasonic distance
//!
//! Readings are aggregated per compartment (median of three or more, mean
//! otherwise) and converted to a fill percentage. A compartment whose
//! measurement fails reports its last good percentage, or none at all if
//! there never was one.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{EchoPulse, FillLevel, RangeSensor, SensorsConfig};
use embedded_hal::delay::DelayNs;
use tracing::{debug, info, instrument, warn};

/// Distance reported for an echo that never falls (object at the sensor)
pub const NEAR_FIELD_CM: f64 = 2.0;

const RETRY_PAUSE: Duration = Duration::from_millis(50);
const READING_PAUSE: Duration = Duration::from_millis(50);
const COMPARTMENT_PAUSE: Duration = Duration::from_millis(100);

/// Speed of sound in cm/s at `temperature_c`
pub fn speed_of_sound(temperature_c: f64) -> f64 {
    (331.3 + 0.606 * temperature_c) * 100.0
}

/// Median for three or more readings, mean below that
pub fn aggregate_readings(readings: &[f64]) -> Option<f64> {
    match readings.len() {
        0 => None,
        1 | 2 => Some(readings.iter().sum::<f64>() / readings.len() as f64),
        n => {
            let mut sorted = readings.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = n / 2;
            if n % 2 == 0 {
                Some((sorted[mid - 1] + sorted[mid]) / 2.0)
            } else {
                Some(sorted[mid])
            }
        }
    }
}

/// Occupancy in percent, rounded to one decimal
pub fn fill_percentage(distance_cm: f64, bin_depth_cm: f64) -> f64 {
    let empty = distance_cm.clamp(0.0, bin_depth_cm);
    let filled = (bin_depth_cm - empty) / bin_depth_cm * 100.0;
    (filled.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Measurement parameters
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub bin_depth_cm: f64,
    pub sound_speed_cm_s: f64,
    pub temperature_compensation: bool,
    pub temperature_c: f64,
    pub readings_per_measurement: u32,
    pub read_retries: u32,
    pub measurement_timeout: Duration,
    pub stabilization: Duration,
}

impl From<&SensorsConfig> for MonitorSettings {
    fn from(config: &SensorsConfig) -> Self {
        Self {
            bin_depth_cm: config.bin_depth_cm,
            sound_speed_cm_s: config.sound_speed_cm_s,
            temperature_compensation: config.use_temperature_compensation,
            temperature_c: config.default_temperature_c,
            readings_per_measurement: config.readings_per_measurement,
            read_retries: config.read_retries,
            measurement_timeout: Duration::from_secs_f64(config.measurement_timeout_s),
            stabilization: Duration::from_secs_f64(config.stabilization_s),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedLevel {
    percentage: f64,
    at: DateTime<Utc>,
}

/// Owns the range sensors and the fill-level cache
pub struct LevelMonitor<D> {
    sensors: Vec<Box<dyn RangeSensor>>,
    settings: MonitorSettings,
    sound_speed: f64,
    cache: HashMap<String, CachedLevel>,
    failures: u64,
    delay: D,
}

impl<D: DelayNs> LevelMonitor<D> {
    pub fn new(sensors: Vec<Box<dyn RangeSensor>>, settings: MonitorSettings, delay: D) -> Self {
        let sound_speed = if settings.temperature_compensation {
            speed_of_sound(settings.temperature_c)
        } else {
            settings.sound_speed_cm_s
        };
        Self {
            sensors,
            settings,
            sound_speed,
            cache: HashMap::new(),
            failures: 0,
            delay,
        }
    }

    /// Compartments in measurement order
    pub fn compartments(&self) -> Vec<String> {
        self.sensors
            .iter()
            .map(|s| s.compartment().to_string())
            .collect()
    }

    /// Compartment measurements that produced no reading
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Current speed of sound (cm/s)
    pub fn sound_speed(&self) -> f64 {
        self.sound_speed
    }

    /// Update ambient temperature; ignored unless compensation is enabled
    pub fn set_temperature(&mut self, temperature_c: f64) -> f64 {
        if !self.settings.temperature_compensation {
            debug!("temperature compensation disabled, ignoring update");
            return self.sound_speed;
        }
        self.settings.temperature_c = temperature_c;
        self.sound_speed = speed_of_sound(temperature_c);
        info!(temperature_c, sound_speed = self.sound_speed, "sound speed updated");
        self.sound_speed
    }

    /// One distance reading with retries
    pub fn distance_once(&mut self, index: usize) -> Option<f64> {
        let timeout = self.settings.measurement_timeout;
        let attempts = self.settings.read_retries + 1;

        for attempt in 1..=attempts {
            let sensor = self.sensors.get_mut(index)?;
            match sensor.echo_pulse(timeout) {
                Ok(EchoPulse::Width(width)) => {
                    return Some(width.as_secs_f64() * self.sound_speed / 2.0);
                }
                Ok(EchoPulse::Saturated) => {
                    debug!(compartment = sensor.compartment(), "echo saturated, object very close");
                    return Some(NEAR_FIELD_CM);
                }
                Err(e) => {
                    debug!(compartment = sensor.compartment(), attempt, error = %e, "distance read failed");
                }
            }
            if attempt < attempts {
                self.pause(RETRY_PAUSE);
            }
        }
        None
    }

    /// Aggregated distance over `readings_per_measurement` reads
    pub fn avg_distance(&mut self, index: usize) -> Option<f64> {
        let count = self.settings.readings_per_measurement.max(1);
        let mut readings = Vec::with_capacity(count as usize);
        for i in 0..count {
            if let Some(distance) = self.distance_once(index) {
                readings.push(distance);
            }
            if i + 1 < count {
                self.pause(READING_PAUSE);
            }
        }
        aggregate_readings(&readings)
    }

    /// Measure every compartment, falling back to cached values
    #[instrument(name = "level_measure_all", skip(self))]
    pub fn measure_all(&mut self) -> Vec<FillLevel> {
        let count = self.sensors.len();
        let mut levels = Vec::with_capacity(count);

        for index in 0..count {
            let compartment = self.sensors[index].compartment().to_string();
            let distance = if self.settings.readings_per_measurement > 1 {
                self.avg_distance(index)
            } else {
                self.distance_once(index)
            };

            let level = match distance {
                Some(distance) => {
                    let percentage = fill_percentage(distance, self.settings.bin_depth_cm);
                    let at = Utc::now();
                    self.cache
                        .insert(compartment.clone(), CachedLevel { percentage, at });
                    debug!(%compartment, distance, percentage, "fill level measured");
                    FillLevel {
                        compartment,
                        percentage: Some(percentage),
                        last_good_at: Some(at),
                        stale: false,
                    }
                }
                None => {
                    self.failures += 1;
                    observability::metrics::record_sensor_failure(&compartment);
                    match self.cache.get(&compartment) {
                        Some(cached) => {
                            warn!(%compartment, percentage = cached.percentage, "sensor read failed, using cached level");
                            FillLevel {
                                percentage: Some(cached.percentage),
                                last_good_at: Some(cached.at),
                                stale: true,
                                compartment,
                            }
                        }
                        None => {
                            warn!(%compartment, "sensor read failed and no cached level");
                            FillLevel {
                                stale: true,
                                ..FillLevel::unknown(compartment)
                            }
                        }
                    }
                }
            };

            observability::metrics::record_fill_level(&level.compartment, level.percentage);
            levels.push(level);
            if index + 1 < count {
                self.pause(COMPARTMENT_PAUSE);
            }
        }
        levels
    }

    /// Startup probe: one reading per sensor after the stabilization wait
    ///
    /// Returns the compartments that did not respond. Monitoring still runs
    /// for them.
    #[instrument(name = "level_self_test", skip(self))]
    pub fn self_test(&mut self) -> Vec<String> {
        info!(
            seconds = self.settings.stabilization.as_secs_f64(),
            "waiting for sensors to stabilize"
        );
        self.pause(self.settings.stabilization);

        let mut unresponsive = Vec::new();
        for index in 0..self.sensors.len() {
            let compartment = self.sensors[index].compartment().to_string();
            match self.distance_once(index) {
                Some(distance) => debug!(%compartment, distance, "sensor responds"),
                None => {
                    warn!(%compartment, "sensor not responding in self test");
                    unresponsive.push(compartment);
                }
            }
        }
        unresponsive
    }

    fn pause(&mut self, duration: Duration) {
        let micros = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        self.delay.delay_us(micros);
    }
}
