//! `init` command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use contracts::SorterBlueprint;
use tracing::info;

use crate::cli::InitArgs;
use crate::error::CliError;

/// Execute the `init` command
pub fn run_init(args: &InitArgs) -> Result<()> {
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("sortbin.{}", args.format.extension())));

    write_defaults(&path, args)?;
    println!("✓ Wrote default configuration to {}", path.display());
    Ok(())
}

fn write_defaults(path: &Path, args: &InitArgs) -> Result<()> {
    if path.exists() && !args.force {
        return Err(CliError::already_exists(path.display().to_string()).into());
    }

    let content =
        config_loader::ConfigLoader::to_string(&SorterBlueprint::default(), args.format.into())
            .context("Failed to serialize default configuration")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), format = ?args.format, "default configuration written");
    Ok(())
}
