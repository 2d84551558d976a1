//! Dispatcher errors

use std::path::PathBuf;

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Output file for a sink could not be created
    #[error("failed to create {sink} output {path:?}: {source}")]
    SinkCreation {
        sink: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sink worker ended abnormally
    #[error("sink '{sink_name}' worker failed: {message}")]
    SinkWorker { sink_name: String, message: String },

    /// Video encoder could not open its output
    #[error("failed to open encoder output {path:?}: {message}")]
    EncoderOpen { path: PathBuf, message: String },

    /// Frame rate has no representable frame interval
    #[error("invalid frame rate {fps} fps")]
    InvalidFrameRate { fps: f64 },

    /// Encoding pipeline is not running
    #[error("encoding pipeline is not running")]
    NotRunning,

    /// Consumer thread did not exit in time
    #[error("encoding consumer did not stop within {timeout_ms} ms")]
    StopTimeout { timeout_ms: u64 },

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Sink write error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    pub fn sink_creation(sink: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SinkCreation {
            sink,
            path: path.into(),
            source,
        }
    }

    /// Create a sink worker error
    pub fn sink_worker(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWorker {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create an encoder open error
    pub fn encoder_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::EncoderOpen {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatcherError>;
