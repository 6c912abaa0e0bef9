//! Command implementations.

mod info;
mod init;
mod query;
mod run;
mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::SorterBlueprint;

use crate::error::CliError;

pub use info::run_info;
pub use init::run_init;
pub use query::run_query;
pub use run::run_pipeline;
pub use validate::run_validate;

/// Load and validate a configuration file
fn load_blueprint(path: &Path) -> Result<SorterBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
