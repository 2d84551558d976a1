//! Collaborator boundaries: camera, sensor command channel, video encoder
//!
//! The core drives hardware only through these traits. Real camera SDKs and
//! codecs live behind them; the workspace ships simulated and file-backed
//! implementations.

use std::path::{Path, PathBuf};

use crate::{ContractError, Frame, Listener, PixelLayout, SubscriptionId};

/// Software capture trigger
#[trait_variant::make(CameraTrigger: Send)]
pub trait LocalCameraTrigger {
    /// Ask the camera to capture one frame now
    async fn trigger_capture(&self) -> Result<(), ContractError>;
}

/// Outbound command channel to the sensor board
#[trait_variant::make(SensorCommander: Send)]
pub trait LocalSensorCommander {
    /// Whether the underlying link is open
    fn is_connected(&self) -> bool;

    /// Send one command line; the line terminator is appended by the implementation
    async fn send_command(&self, command: &str) -> Result<(), ContractError>;
}

/// Camera event source
///
/// Frames are delivered as RGB (or mono) in the capture callback context.
pub trait CameraFeed: Send + Sync {
    /// Frame width and height
    fn resolution(&self) -> (u32, u32);

    /// Nominal frame rate
    fn fps(&self) -> f64;

    /// Register a frame callback
    fn subscribe_frames(&self, listener: Listener<Frame>) -> SubscriptionId;

    /// Register a sensor temperature callback (°C)
    fn subscribe_temperature(&self, listener: Listener<f64>) -> SubscriptionId;

    /// Remove a frame or temperature callback
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Output file of a finished encoding run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFileInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Video encoder boundary
///
/// Called from the encoding consumer thread only.
pub trait VideoEncoder: Send {
    /// Channel order the encoder expects
    fn input_layout(&self) -> PixelLayout {
        PixelLayout::Bgr8
    }

    /// Open the output
    fn start_encoding(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<(), ContractError>;

    /// Append one frame
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ContractError>;

    /// Finalize the output
    fn stop_encoding(&mut self) -> Result<VideoFileInfo, ContractError>;
}

impl<E: VideoEncoder + ?Sized> VideoEncoder for Box<E> {
    fn input_layout(&self) -> PixelLayout {
        (**self).input_layout()
    }

    fn start_encoding(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<(), ContractError> {
        (**self).start_encoding(path, width, height, fps)
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), ContractError> {
        (**self).write_frame(frame)
    }

    fn stop_encoding(&mut self) -> Result<VideoFileInfo, ContractError> {
        (**self).stop_encoding()
    }
}
