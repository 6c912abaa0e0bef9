//! SorterBlueprint - Config Loader output
//!
//! Describes the complete sorter configuration: waste classes and their target
//! slots, detection tuning, camera, actuator, level sensors and state bridge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete sorter configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SorterBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Waste classes in model index order
    #[serde(default = "default_classes")]
    #[validate(length(min = 1), nested)]
    pub classes: Vec<ClassConfig>,

    /// Inference and arbitration tuning
    #[serde(default)]
    #[validate(nested)]
    pub detection: DetectionConfig,

    /// Capture device
    #[serde(default)]
    #[validate(nested)]
    pub camera: CameraConfig,

    /// Stepper motor and sequence timing
    #[serde(default)]
    #[validate(nested)]
    pub actuator: ActuatorConfig,

    /// Ultrasonic level sensors
    #[serde(default)]
    #[validate(nested)]
    pub sensors: SensorsConfig,

    /// State bridge server
    #[serde(default)]
    #[validate(nested)]
    pub bridge: BridgeConfig,
}

/// One waste class
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClassConfig {
    /// Display name (e.g., "Plastic")
    #[validate(length(min = 1))]
    pub name: String,

    /// Motor position of the matching compartment; unmapped classes never actuate
    #[serde(default)]
    pub target_steps: Option<i64>,
}

fn default_classes() -> Vec<ClassConfig> {
    [("Metal", 0), ("Glass", 50), ("Plastic", 100), ("Carton", 150)]
        .into_iter()
        .map(|(name, steps)| ClassConfig {
            name: name.to_string(),
            target_steps: Some(steps),
        })
        .collect()
}

/// Inference and arbitration tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DetectionConfig {
    /// Detections scoring below this are discarded
    #[serde(default = "default_min_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f32,

    /// Frame buffer capacity
    #[serde(default = "default_buffer_size")]
    #[validate(range(min = 1))]
    pub buffer_size: usize,

    /// Frames skipped between classified frames (1 = every other frame)
    #[serde(default = "default_skip_frames")]
    pub skip_frames: u32,

    /// Frame buffer poll timeout (ms)
    #[serde(default = "default_poll_timeout_ms")]
    #[validate(range(min = 1))]
    pub poll_timeout_ms: u64,
}

fn default_min_confidence() -> f32 {
    0.5
}

fn default_buffer_size() -> usize {
    5
}

fn default_skip_frames() -> u32 {
    1
}

fn default_poll_timeout_ms() -> u64 {
    100
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            buffer_size: default_buffer_size(),
            skip_frames: default_skip_frames(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Capture device configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CameraConfig {
    /// Device index
    #[serde(default)]
    pub index: u32,

    /// Frame width (pixels)
    #[serde(default = "default_frame_width")]
    #[validate(range(min = 1))]
    pub frame_width: u32,

    /// Frame height (pixels)
    #[serde(default = "default_frame_height")]
    #[validate(range(min = 1))]
    pub frame_height: u32,

    /// Capture loop period (ms)
    #[serde(default = "default_capture_interval_ms")]
    #[validate(range(min = 1))]
    pub capture_interval_ms: u64,

    /// Reconnect attempts before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed pause between reconnect attempts (ms)
    #[serde(default = "default_retry_backoff_ms")]
    #[validate(range(min = 500))]
    pub retry_backoff_ms: u64,
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

fn default_capture_interval_ms() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            capture_interval_ms: default_capture_interval_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Stepper motor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ActuatorConfig {
    /// Direction output (BCM numbering)
    #[serde(default = "default_dir_pin")]
    pub dir_pin: u8,

    /// Step pulse output (BCM numbering)
    #[serde(default = "default_step_pin")]
    pub step_pin: u8,

    /// Driver enable output; `None` when ENABLE is tied to ground
    #[serde(default = "default_enable_pin")]
    pub enable_pin: Option<u8>,

    /// A4988-style enable (low = enabled)
    #[serde(default = "default_true")]
    pub enable_active_low: bool,

    /// Home position (steps)
    #[serde(default)]
    pub home_position_steps: i64,

    /// Dwell at the target so the item can drop (seconds)
    #[serde(default = "default_drop_delay_s")]
    #[validate(range(min = 0.0))]
    pub drop_delay_s: f64,

    /// Pause after returning home (seconds)
    #[serde(default = "default_return_pause_s")]
    #[validate(range(min = 0.0))]
    pub return_pause_s: f64,

    /// Settle time after enabling or switching direction (ms)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Velocity ramp
    #[serde(default)]
    #[validate(nested)]
    pub ramp: RampConfig,
}

fn default_dir_pin() -> u8 {
    20
}

fn default_step_pin() -> u8 {
    21
}

fn default_enable_pin() -> Option<u8> {
    Some(16)
}

fn default_true() -> bool {
    true
}

fn default_drop_delay_s() -> f64 {
    2.0
}

fn default_return_pause_s() -> f64 {
    0.5
}

fn default_settle_ms() -> u64 {
    10
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            dir_pin: default_dir_pin(),
            step_pin: default_step_pin(),
            enable_pin: default_enable_pin(),
            enable_active_low: true,
            home_position_steps: 0,
            drop_delay_s: default_drop_delay_s(),
            return_pause_s: default_return_pause_s(),
            settle_ms: default_settle_ms(),
            ramp: RampConfig::default(),
        }
    }
}

/// Trapezoidal ramp parameters
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RampConfig {
    /// Use the trapezoidal profile; otherwise every step uses `constant_delay_s`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Half-period of the first and last step (seconds)
    #[serde(default = "default_start_delay_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub start_delay_s: f64,

    /// Half-period on the plateau (seconds)
    #[serde(default = "default_min_delay_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub min_delay_s: f64,

    /// Steps spent accelerating (and decelerating)
    #[serde(default = "default_accel_steps")]
    pub accel_steps: u32,

    /// Half-period when ramping is disabled (seconds)
    #[serde(default = "default_constant_delay_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub constant_delay_s: f64,
}

fn default_start_delay_s() -> f64 {
    0.01
}

fn default_min_delay_s() -> f64 {
    0.001
}

fn default_accel_steps() -> u32 {
    20
}

fn default_constant_delay_s() -> f64 {
    0.005
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay_s: default_start_delay_s(),
            min_delay_s: default_min_delay_s(),
            accel_steps: default_accel_steps(),
            constant_delay_s: default_constant_delay_s(),
        }
    }
}

/// Ultrasonic level sensing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorsConfig {
    /// One sensor per compartment
    #[serde(default = "default_compartments")]
    #[validate(nested)]
    pub compartments: Vec<CompartmentSensorConfig>,

    /// Distance from sensor to an empty bin floor (cm)
    #[serde(default = "default_bin_depth_cm")]
    #[validate(range(exclusive_min = 0.0))]
    pub bin_depth_cm: f64,

    /// Speed of sound (cm/s) used without temperature compensation
    #[serde(default = "default_sound_speed_cm_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub sound_speed_cm_s: f64,

    /// Derive the speed of sound from the ambient temperature
    #[serde(default)]
    pub use_temperature_compensation: bool,

    /// Ambient temperature assumed at startup (°C)
    #[serde(default = "default_temperature_c")]
    pub default_temperature_c: f64,

    /// Raw reads per measurement
    #[serde(default = "default_readings_per_measurement")]
    #[validate(range(min = 1))]
    pub readings_per_measurement: u32,

    /// Retries per raw read
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    /// Echo wait timeout (seconds)
    #[serde(default = "default_measurement_timeout_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub measurement_timeout_s: f64,

    /// Monitoring period (seconds)
    #[serde(default = "default_poll_interval_s")]
    #[validate(range(exclusive_min = 0.0))]
    pub poll_interval_s: f64,

    /// Settle time before the startup self test (seconds)
    #[serde(default = "default_stabilization_s")]
    #[validate(range(min = 0.0))]
    pub stabilization_s: f64,
}

fn default_compartments() -> Vec<CompartmentSensorConfig> {
    [
        ("Metal", 23, 24),
        ("Glass", 25, 8),
        ("Plastic", 7, 12),
        ("Carton", 1, 18),
    ]
    .into_iter()
    .map(|(name, trigger_pin, echo_pin)| CompartmentSensorConfig {
        name: name.to_string(),
        trigger_pin,
        echo_pin,
    })
    .collect()
}

fn default_bin_depth_cm() -> f64 {
    50.0
}

fn default_sound_speed_cm_s() -> f64 {
    34_300.0
}

fn default_temperature_c() -> f64 {
    20.0
}

fn default_readings_per_measurement() -> u32 {
    3
}

fn default_read_retries() -> u32 {
    1
}

fn default_measurement_timeout_s() -> f64 {
    0.5
}

fn default_poll_interval_s() -> f64 {
    10.0
}

fn default_stabilization_s() -> f64 {
    0.5
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            compartments: default_compartments(),
            bin_depth_cm: default_bin_depth_cm(),
            sound_speed_cm_s: default_sound_speed_cm_s(),
            use_temperature_compensation: false,
            default_temperature_c: default_temperature_c(),
            readings_per_measurement: default_readings_per_measurement(),
            read_retries: default_read_retries(),
            measurement_timeout_s: default_measurement_timeout_s(),
            poll_interval_s: default_poll_interval_s(),
            stabilization_s: default_stabilization_s(),
        }
    }
}

/// Pin pair of one compartment sensor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompartmentSensorConfig {
    /// Compartment name
    #[validate(length(min = 1))]
    pub name: String,

    /// Trigger output (BCM numbering)
    pub trigger_pin: u8,

    /// Echo input (BCM numbering)
    pub echo_pin: u8,
}

/// State bridge server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BridgeConfig {
    /// Bind address
    #[serde(default = "default_bridge_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Bind port
    #[serde(default = "default_bridge_port")]
    pub port: u16,

    /// Listen backlog
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,

    /// Wait for the first request chunk (ms)
    #[serde(default = "default_read_timeout_ms")]
    #[validate(range(min = 1))]
    pub read_timeout_ms: u64,

    /// Silence after which a request is considered complete (ms)
    #[serde(default = "default_inter_chunk_timeout_ms")]
    #[validate(range(min = 1))]
    pub inter_chunk_timeout_ms: u64,
}

fn default_bridge_host() -> String {
    "127.0.0.1".to_string()
}

fn default_bridge_port() -> u16 {
    5001
}

fn default_max_connections() -> u32 {
    5
}

fn default_read_timeout_ms() -> u64 {
    5000
}

fn default_inter_chunk_timeout_ms() -> u64 {
    500
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_bridge_host(),
            port: default_bridge_port(),
            max_connections: default_max_connections(),
            read_timeout_ms: default_read_timeout_ms(),
            inter_chunk_timeout_ms: default_inter_chunk_timeout_ms(),
        }
    }
}

impl BridgeConfig {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SorterBlueprint {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            classes: default_classes(),
            detection: DetectionConfig::default(),
            camera: CameraConfig::default(),
            actuator: ActuatorConfig::default(),
            sensors: SensorsConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

impl SorterBlueprint {
    /// Class names in model index order
    pub fn class_names(&self) -> Vec<String> {
        self.classes.iter().map(|c| c.name.clone()).collect()
    }

    /// Class index -> target position, for mapped classes only
    pub fn target_steps_map(&self) -> HashMap<usize, i64> {
        self.classes
            .iter()
            .enumerate()
            .filter_map(|(index, class)| class.target_steps.map(|steps| (index, steps)))
            .collect()
    }

    /// Compartment names in sensor order
    pub fn compartment_names(&self) -> Vec<String> {
        self.sensors
            .compartments
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_hardware() {
        let blueprint = SorterBlueprint::default();
        assert_eq!(
            blueprint.class_names(),
            vec!["Metal", "Glass", "Plastic", "Carton"]
        );
        assert_eq!(blueprint.target_steps_map().get(&2).copied(), Some(100));
        assert_eq!(blueprint.detection.buffer_size, 5);
        assert_eq!(blueprint.detection.skip_frames, 1);
        assert_eq!(blueprint.camera.max_retries, 5);
        assert_eq!(blueprint.actuator.enable_pin, Some(16));
        assert_eq!(blueprint.sensors.compartments[3].trigger_pin, 1);
        assert_eq!(blueprint.bridge.address(), "127.0.0.1:5001");
        assert!(blueprint.validate().is_ok());
    }

    #[test]
    fn unmapped_class_is_left_out_of_target_map() {
        let mut blueprint = SorterBlueprint::default();
        blueprint.classes[1].target_steps = None;
        let map = blueprint.target_steps_map();
        assert_eq!(map.len(), 3);
        assert!(!map.contains_key(&1));
    }

    #[test]
    fn derive_rules_reject_out_of_range_values() {
        let mut blueprint = SorterBlueprint::default();
        blueprint.detection.min_confidence = 1.5;
        assert!(blueprint.validate().is_err());

        let mut blueprint = SorterBlueprint::default();
        blueprint.camera.retry_backoff_ms = 100;
        assert!(blueprint.validate().is_err());

        let mut blueprint = SorterBlueprint::default();
        blueprint.classes.clear();
        assert!(blueprint.validate().is_err());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let blueprint: SorterBlueprint = serde_json::from_str("{}").unwrap();
        assert_eq!(blueprint.classes.len(), 4);
        assert_eq!(blueprint.sensors.bin_depth_cm, 50.0);
        assert_eq!(blueprint.actuator.ramp.accel_steps, 20);
    }
}
