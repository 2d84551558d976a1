//! Layered error definitions
//!
//! Categorized by source: config / device / encoder / sink

use thiserror::Error;

/// Unified error type shared across crates
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Device Errors =====
    /// A device link is not open
    #[error("device '{device}' is not connected")]
    NotConnected { device: String },

    /// A device command could not be delivered
    #[error("device '{device}' command failed: {message}")]
    DeviceCommand { device: String, message: String },

    /// Camera trigger failed
    #[error("camera trigger failed: {message}")]
    CameraTrigger { message: String },

    // ===== Encoder Errors =====
    /// Video encoder failure
    #[error("encoder error: {message}")]
    Encoder { message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create not-connected error
    pub fn not_connected(device: impl Into<String>) -> Self {
        Self::NotConnected {
            device: device.into(),
        }
    }

    /// Create device command error
    pub fn device_command(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceCommand {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create camera trigger error
    pub fn camera_trigger(message: impl Into<String>) -> Self {
        Self::CameraTrigger {
            message: message.into(),
        }
    }

    /// Create encoder error
    pub fn encoder(message: impl Into<String>) -> Self {
        Self::Encoder {
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
