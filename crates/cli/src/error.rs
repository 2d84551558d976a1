//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Configuration rejected after command-line overrides
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// Recording could not be started or finished
    #[error("Recording failed: {message}")]
    Recording { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    pub fn recording(message: impl Into<String>) -> Self {
        Self::Recording {
            message: message.into(),
        }
    }
}
