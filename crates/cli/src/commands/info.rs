//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::SorterBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    classes: Vec<ClassInfo>,
    detection: DetectionInfo,
    camera: CameraInfo,
    actuator: ActuatorInfo,
    compartments: Vec<CompartmentInfo>,
    bridge_address: String,
}

#[derive(Serialize)]
struct ClassInfo {
    index: usize,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_steps: Option<i64>,
}

#[derive(Serialize)]
struct DetectionInfo {
    min_confidence: f32,
    buffer_size: usize,
    skip_frames: u32,
}

#[derive(Serialize)]
struct CameraInfo {
    index: u32,
    resolution: String,
    capture_interval_ms: u64,
    max_retries: u32,
}

#[derive(Serialize)]
struct ActuatorInfo {
    home_position_steps: i64,
    drop_delay_s: f64,
    ramp_enabled: bool,
    accel_steps: u32,
}

#[derive(Serialize)]
struct CompartmentInfo {
    name: String,
    trigger_pin: u8,
    echo_pin: u8,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = super::load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn build_config_info(blueprint: &SorterBlueprint) -> ConfigInfo {
    let classes = blueprint
        .classes
        .iter()
        .enumerate()
        .map(|(index, class)| ClassInfo {
            index,
            name: class.name.clone(),
            target_steps: class.target_steps,
        })
        .collect();

    let compartments = blueprint
        .sensors
        .compartments
        .iter()
        .map(|c| CompartmentInfo {
            name: c.name.clone(),
            trigger_pin: c.trigger_pin,
            echo_pin: c.echo_pin,
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        classes,
        detection: DetectionInfo {
            min_confidence: blueprint.detection.min_confidence,
            buffer_size: blueprint.detection.buffer_size,
            skip_frames: blueprint.detection.skip_frames,
        },
        camera: CameraInfo {
            index: blueprint.camera.index,
            resolution: format!(
                "{}x{}",
                blueprint.camera.frame_width, blueprint.camera.frame_height
            ),
            capture_interval_ms: blueprint.camera.capture_interval_ms,
            max_retries: blueprint.camera.max_retries,
        },
        actuator: ActuatorInfo {
            home_position_steps: blueprint.actuator.home_position_steps,
            drop_delay_s: blueprint.actuator.drop_delay_s,
            ramp_enabled: blueprint.actuator.ramp.enabled,
            accel_steps: blueprint.actuator.ramp.accel_steps,
        },
        compartments,
        bridge_address: blueprint.bridge.address(),
    }
}

fn print_config_info(blueprint: &SorterBlueprint) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  sortbin Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🗑  Classes ({})", blueprint.classes.len());
    for (i, class) in blueprint.classes.iter().enumerate() {
        let prefix = tree_prefix(i, blueprint.classes.len());
        match class.target_steps {
            Some(steps) => println!("   {} [{}] {} → step {}", prefix, i, class.name, steps),
            None => println!("   {} [{}] {} (not sorted)", prefix, i, class.name),
        }
    }

    let detection = &blueprint.detection;
    println!("\n🔍 Detection");
    println!("   ├─ Min confidence: {:.2}", detection.min_confidence);
    println!(
        "   ├─ Frame buffer: {} (oldest evicted when full)",
        detection.buffer_size
    );
    println!("   └─ Skip frames: {}", detection.skip_frames);

    let camera = &blueprint.camera;
    println!("\n📷 Camera");
    println!("   ├─ Index: {}", camera.index);
    println!(
        "   ├─ Resolution: {}x{}",
        camera.frame_width, camera.frame_height
    );
    println!(
        "   └─ Reconnect: {} attempts, {} ms apart",
        camera.max_retries, camera.retry_backoff_ms
    );

    let actuator = &blueprint.actuator;
    println!("\n⚙️  Actuator");
    println!(
        "   ├─ Pins: dir {}, step {}, enable {}",
        actuator.dir_pin,
        actuator.step_pin,
        actuator
            .enable_pin
            .map_or_else(|| "(tied)".to_string(), |pin| pin.to_string())
    );
    println!("   ├─ Home: step {}", actuator.home_position_steps);
    println!("   ├─ Drop delay: {:.1}s", actuator.drop_delay_s);
    if actuator.ramp.enabled {
        println!(
            "   └─ Ramp: {:.4}s → {:.4}s over {} steps",
            actuator.ramp.start_delay_s, actuator.ramp.min_delay_s, actuator.ramp.accel_steps
        );
    } else {
        println!(
            "   └─ Ramp: disabled ({:.4}s per half-step)",
            actuator.ramp.constant_delay_s
        );
    }

    let sensors = &blueprint.sensors;
    println!(
        "\n📏 Level Sensors ({}, bin depth {} cm, every {}s)",
        sensors.compartments.len(),
        sensors.bin_depth_cm,
        sensors.poll_interval_s
    );
    for (i, compartment) in sensors.compartments.iter().enumerate() {
        println!(
            "   {} {} (trigger {}, echo {})",
            tree_prefix(i, sensors.compartments.len()),
            compartment.name,
            compartment.trigger_pin,
            compartment.echo_pin
        );
    }

    println!("\n📡 State Bridge");
    println!("   └─ {}", blueprint.bridge.address());

    println!();
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_lists_classes_in_index_order() {
        let info = build_config_info(&SorterBlueprint::default());
        let names: Vec<_> = info.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Metal", "Glass", "Plastic", "Carton"]);
        assert_eq!(info.classes[2].target_steps, Some(100));
        assert_eq!(info.bridge_address, "127.0.0.1:5001");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["camera"]["resolution"], "640x480");
    }
}
