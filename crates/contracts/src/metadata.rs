//! RecordingMetadata - per-session JSON document
//!
//! Written once by the session recorder after every writer has closed.

use serde::{Deserialize, Serialize};

use crate::{
    CameraSettings, EnvironmentTags, GpsFix, RecordingMode, SyncQualityMetrics, SyncStatistics,
};

/// Root metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub timestamp: TimestampInfo,
    pub environment: EnvironmentTags,
    pub camera_settings: CameraSettingsInfo,
    pub hardware: HardwareInfo,
    pub recording_mode: RecordingMode,
    /// Only present for synchronized recordings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synchronization: Option<SynchronizationInfo>,
}

/// Session time range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampInfo {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
}

/// Camera settings as persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSettingsInfo {
    pub exposure_time: u32,
    pub white_balance_mode: String,
    pub white_balance_temperature: u32,
}

impl From<&CameraSettings> for CameraSettingsInfo {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            exposure_time: settings.exposure_time,
            white_balance_mode: settings.white_balance_mode.as_str().to_string(),
            white_balance_temperature: settings.white_balance_temperature,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    /// Last reported camera temperature, °C
    pub camera_temperature: f64,
    pub gps: GpsInfo,
    pub sensors: SensorInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsInfo {
    pub start: Option<GpsFix>,
    pub end: Option<GpsFix>,
    pub track_file: Option<String>,
    /// Hz
    pub sample_rate: u32,
    pub total_points: Option<u64>,
}

impl Default for GpsInfo {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            track_file: None,
            sample_rate: 1,
            total_points: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Hz
    pub sample_rate: u32,
    pub total_samples: Option<u64>,
    pub data_file: Option<String>,
    pub summary: SensorSummary,
}

impl Default for SensorInfo {
    fn default() -> Self {
        Self {
            sample_rate: 1,
            total_samples: None,
            data_file: None,
            summary: SensorSummary::default(),
        }
    }
}

/// Environmental ranges over the whole session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub temperature: SensorRange,
    pub humidity: SensorRange,
    pub light_level: SensorRange,
}

/// Empty when no samples were recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

/// Synchronization block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronizationInfo {
    pub method: String,
    pub master_frequency_hz: f64,
    pub total_sync_points: u64,
    pub sync_log_file: Option<String>,
    pub quality_metrics: SyncQualityMetrics,
    pub statistics: SyncStatistics,
}

impl SynchronizationInfo {
    pub const METHOD_SOFTWARE_TRIGGER: &'static str = "software_trigger_30hz";
}
