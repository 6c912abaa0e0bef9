//! # Level Monitor
//!
//! Compartment fill levels from ultrasonic range sensors.
//!
//! Responsibilities:
//! - Time echo pulses and convert them to distance
//! - Aggregate readings and map distance to a fill percentage
//! - Cache the last good level per compartment
//! - Poll periodically and publish `StateEvent::FillLevels`

mod mock;
mod monitor;
mod sensor;
mod task;

pub use mock::{Reading, SensorScript, SimulatedRangeSensor};
pub use monitor::{
    aggregate_readings, fill_percentage, speed_of_sound, LevelMonitor, MonitorSettings,
    NEAR_FIELD_CM,
};
pub use sensor::UltrasonicSensor;
pub use task::LevelMonitorTask;
