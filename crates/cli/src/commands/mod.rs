//! Command implementations.

mod info;
mod ports;
mod run;
mod validate;

pub use info::run_info;
pub use ports::run_ports;
pub use run::run_recording;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::AcquisitionBlueprint;

use crate::error::CliError;

/// Load and validate a configuration file that must exist
fn load_blueprint(path: &Path) -> Result<AcquisitionBlueprint> {
    config_loader::ConfigLoader::load_optional(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?
        .ok_or_else(|| CliError::config_not_found(path).into())
}

/// One-line summary of a serial section
fn describe_port(config: &contracts::SerialDeviceConfig) -> String {
    if !config.enabled {
        return "disabled".to_string();
    }
    let port = if config.port.is_empty() {
        "<unset>"
    } else {
        config.port.as_str()
    };
    format!("{port} @ {} baud", config.baud_rate)
}
