//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::SorterBlueprint;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            super::load_blueprint(path)?
        }
        None => {
            info!("No configuration file given, using built-in defaults");
            SorterBlueprint::default()
        }
    };

    if let Some(ref addr) = args.bridge_addr {
        info!(addr = %addr, "Overriding state bridge address from CLI");
        apply_bridge_addr(&mut blueprint, addr)?;
        config_loader::ConfigLoader::validate(&blueprint)
            .context("Configuration invalid after CLI overrides")?;
    }

    info!(
        classes = blueprint.classes.len(),
        compartments = blueprint.sensors.compartments.len(),
        bridge = %blueprint.bridge.address(),
        "Configuration loaded"
    );

    let pipeline_config = PipelineConfig {
        blueprint,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
        scenario: args.sim_scenario,
    };

    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        frames_captured = stats.summary.frames_captured,
        actuations = stats.summary.actuations,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("sortbin finished");
    Ok(())
}

/// Split `host:port` into the bridge section
fn apply_bridge_addr(blueprint: &mut SorterBlueprint, addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("Bridge address '{addr}' is not host:port"))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid bridge port in '{addr}'"))?;

    blueprint.bridge.host = host.to_string();
    blueprint.bridge.port = port;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
