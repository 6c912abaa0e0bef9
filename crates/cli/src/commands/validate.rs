//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    class_count: usize,
    mapped_class_count: usize,
    compartment_count: usize,
    bridge_address: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    class_count: blueprint.classes.len(),
                    mapped_class_count: blueprint.target_steps_map().len(),
                    compartment_count: blueprint.sensors.compartments.len(),
                    bridge_address: blueprint.bridge.address(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("{e:#}")),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &contracts::SorterBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for class in &blueprint.classes {
        if class.target_steps.is_none() {
            warnings.push(format!(
                "Class '{}' has no target_steps - it will be counted but never sorted",
                class.name
            ));
        }
    }

    let compartments = blueprint.compartment_names();
    for class in &blueprint.classes {
        if class.target_steps.is_some() && !compartments.contains(&class.name) {
            warnings.push(format!(
                "Class '{}' has no level sensor - its fill level is not reported",
                class.name
            ));
        }
    }

    if blueprint.sensors.compartments.is_empty() {
        warnings.push("No level sensors configured - fill levels stay empty".to_string());
    }

    if blueprint.detection.skip_frames == 0 {
        warnings.push("detection.skip_frames is 0 - every frame is classified".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Classes: {} ({} mapped)",
                summary.class_count, summary.mapped_class_count
            );
            println!("  Compartments: {}", summary.compartment_count);
            println!("  State bridge: {}", summary.bridge_address);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
