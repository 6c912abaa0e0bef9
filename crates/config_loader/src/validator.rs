//! Config validation
//!
//! Rules:
//! - field ranges (derive rules on `SorterBlueprint`)
//! - every float finite; durations at most `MAX_DURATION_S`
//! - class names unique, at least one class mapped to a slot
//! - compartment names unique
//! - ramp min_delay_s <= start_delay_s
//! - no GPIO pin assigned twice

use std::collections::{HashMap, HashSet};

use contracts::{ContractError, SorterBlueprint};
use validator::Validate;

/// Upper bound for any configured duration (seconds)
pub const MAX_DURATION_S: f64 = 3600.0;

/// Validate a SorterBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    validate_ranges(blueprint)?;
    validate_timings(blueprint)?;
    validate_classes(blueprint)?;
    validate_compartments(blueprint)?;
    validate_ramp(blueprint)?;
    validate_pins(blueprint)?;
    Ok(())
}

/// Run the derive rules
fn validate_ranges(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string()))
}

/// Durations convert to `Duration` without overflow; other floats are finite
///
/// The derive range rules let NaN through, so this runs on every float field.
fn validate_timings(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let actuator = &blueprint.actuator;
    let sensors = &blueprint.sensors;
    let durations = [
        ("actuator.drop_delay_s", actuator.drop_delay_s),
        ("actuator.return_pause_s", actuator.return_pause_s),
        ("actuator.ramp.start_delay_s", actuator.ramp.start_delay_s),
        ("actuator.ramp.min_delay_s", actuator.ramp.min_delay_s),
        ("actuator.ramp.constant_delay_s", actuator.ramp.constant_delay_s),
        ("sensors.measurement_timeout_s", sensors.measurement_timeout_s),
        ("sensors.poll_interval_s", sensors.poll_interval_s),
        ("sensors.stabilization_s", sensors.stabilization_s),
    ];
    for (field, seconds) in durations {
        if !seconds.is_finite() || !(0.0..=MAX_DURATION_S).contains(&seconds) {
            return Err(ContractError::config_validation(
                field,
                format!("{seconds} is not a duration in [0, {MAX_DURATION_S}] seconds"),
            ));
        }
    }

    let values = [
        ("detection.min_confidence", f64::from(blueprint.detection.min_confidence)),
        ("sensors.bin_depth_cm", sensors.bin_depth_cm),
        ("sensors.sound_speed_cm_s", sensors.sound_speed_cm_s),
        ("sensors.default_temperature_c", sensors.default_temperature_c),
    ];
    for (field, value) in values {
        if !value.is_finite() {
            return Err(ContractError::config_validation(field, format!("{value} is not finite")));
        }
    }
    Ok(())
}

/// Class names unique and at least one slot mapping
fn validate_classes(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, class) in blueprint.classes.iter().enumerate() {
        if !seen.insert(class.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("classes[{idx}].name"),
                format!("duplicate class name '{}'", class.name),
            ));
        }
    }

    if blueprint.target_steps_map().is_empty() {
        return Err(ContractError::config_validation(
            "classes",
            "no class has target_steps, nothing could ever be sorted",
        ));
    }
    Ok(())
}

/// Compartment names unique
fn validate_compartments(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, compartment) in blueprint.sensors.compartments.iter().enumerate() {
        if !seen.insert(compartment.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sensors.compartments[{idx}].name"),
                format!("duplicate compartment '{}'", compartment.name),
            ));
        }
    }
    Ok(())
}

/// Ramp must accelerate, not decelerate, towards the plateau
fn validate_ramp(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let ramp = &blueprint.actuator.ramp;
    if ramp.min_delay_s > ramp.start_delay_s {
        return Err(ContractError::config_validation(
            "actuator.ramp.min_delay_s / actuator.ramp.start_delay_s",
            format!(
                "min_delay_s ({}) must be <= start_delay_s ({})",
                ramp.min_delay_s, ramp.start_delay_s
            ),
        ));
    }
    Ok(())
}

/// Every GPIO line has a single owner
fn validate_pins(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let actuator = &blueprint.actuator;
    let mut owners: Vec<(u8, String)> = vec![
        (actuator.dir_pin, "actuator.dir_pin".to_string()),
        (actuator.step_pin, "actuator.step_pin".to_string()),
    ];
    if let Some(pin) = actuator.enable_pin {
        owners.push((pin, "actuator.enable_pin".to_string()));
    }
    for compartment in &blueprint.sensors.compartments {
        owners.push((
            compartment.trigger_pin,
            format!("sensors.compartments[{}].trigger_pin", compartment.name),
        ));
        owners.push((
            compartment.echo_pin,
            format!("sensors.compartments[{}].echo_pin", compartment.name),
        ));
    }

    let mut seen: HashMap<u8, String> = HashMap::new();
    for (pin, owner) in owners {
        if let Some(previous) = seen.get(&pin) {
            return Err(ContractError::config_validation(
                owner,
                format!("GPIO {pin} already used by {previous}"),
            ));
        }
        seen.insert(pin, owner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ClassConfig, CompartmentSensorConfig};

    #[test]
    fn test_valid_config() {
        let bp = SorterBlueprint::default();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_duplicate_class_name() {
        let mut bp = SorterBlueprint::default();
        bp.classes.push(ClassConfig {
            name: "Glass".into(),
            target_steps: Some(200),
        });
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate class name"), "got: {err}");
    }

    #[test]
    fn test_no_mapped_class() {
        let mut bp = SorterBlueprint::default();
        for class in &mut bp.classes {
            class.target_steps = None;
        }
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("no class has target_steps"), "got: {err}");
    }

    #[test]
    fn test_duplicate_compartment() {
        let mut bp = SorterBlueprint::default();
        bp.sensors.compartments.push(CompartmentSensorConfig {
            name: "Metal".into(),
            trigger_pin: 2,
            echo_pin: 3,
        });
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate compartment"), "got: {err}");
    }

    #[test]
    fn test_inverted_ramp() {
        let mut bp = SorterBlueprint::default();
        bp.actuator.ramp.min_delay_s = 0.02;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("min_delay_s"), "got: {err}");
    }

    #[test]
    fn test_pin_conflict() {
        let mut bp = SorterBlueprint::default();
        bp.sensors.compartments[0].echo_pin = 21;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("GPIO 21 already used by actuator.step_pin"), "got: {err}");
    }

    #[test]
    fn test_enable_pin_not_checked_when_absent() {
        let mut bp = SorterBlueprint::default();
        bp.actuator.enable_pin = None;
        bp.sensors.compartments[0].trigger_pin = 16;
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_oversized_duration_rejected() {
        let mut bp = SorterBlueprint::default();
        bp.actuator.drop_delay_s = 1e30;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("actuator.drop_delay_s"), "got: {err}");

        let mut bp = SorterBlueprint::default();
        bp.sensors.poll_interval_s = MAX_DURATION_S + 1.0;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut bp = SorterBlueprint::default();
        bp.sensors.measurement_timeout_s = f64::NAN;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("sensors.measurement_timeout_s"), "got: {err}");

        let mut bp = SorterBlueprint::default();
        bp.actuator.ramp.start_delay_s = f64::INFINITY;
        assert!(validate(&bp).is_err());

        let mut bp = SorterBlueprint::default();
        bp.sensors.default_temperature_c = f64::NAN;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("default_temperature_c"), "got: {err}");
    }

    #[test]
    fn test_range_rules_reported() {
        let mut bp = SorterBlueprint::default();
        bp.detection.buffer_size = 0;
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
        assert!(err.to_string().contains("buffer_size"), "got: {err}");
    }
}
