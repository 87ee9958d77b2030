//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_sinks;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, SinkBlueprint};

use crate::error::CliError;

/// Load and validate a blueprint, failing early on a missing file
fn load_blueprint(path: &Path) -> Result<SinkBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
