//! Recording settings: environment tags, camera settings, recording mode

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Road type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadType {
    #[default]
    Highway,
    Urban,
}

/// Weather tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Clear,
    Cloudy,
}

/// Time of day (AM 07-10, Midday 10-14, PM 14-18, Night 18-23)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    #[default]
    Am,
    Midday,
    Pm,
    Night,
}

/// Which side of the vehicle the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingSide {
    #[default]
    Left,
    Right,
}

macro_rules! tag_str {
    ($ty:ty { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

tag_str!(RoadType { Highway => "highway", Urban => "urban" });
tag_str!(Weather { Clear => "clear", Cloudy => "cloudy" });
tag_str!(TimeOfDay { Am => "am", Midday => "midday", Pm => "pm", Night => "night" });
tag_str!(RecordingSide { Left => "left", Right => "right" });

/// Tag combination that selects the dataset folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentTags {
    #[serde(default)]
    pub road_type: RoadType,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub recording_side: RecordingSide,
}

impl EnvironmentTags {
    /// `root/road/weather/time/side`
    pub fn folder_path(&self, root: &Path) -> PathBuf {
        root.join(self.road_type.as_str())
            .join(self.weather.as_str())
            .join(self.time_of_day.as_str())
            .join(self.recording_side.as_str())
    }
}

/// Acquisition regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// Each source free-runs and is stamped independently
    #[default]
    Continuous,
    /// 30 Hz software trigger with shared sequence numbers
    Synchronized,
}

impl RecordingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Synchronized => "synchronized",
        }
    }
}

/// Auto / manual control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[default]
    Auto,
    Manual,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// White balance presets in Kelvin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalancePreset {
    Daylight,
    Cloudy,
    Tungsten,
    Fluorescent,
}

impl WhiteBalancePreset {
    pub fn kelvin(&self) -> u32 {
        match self {
            Self::Daylight => 5600,
            Self::Cloudy => 6500,
            Self::Tungsten => 3200,
            Self::Fluorescent => 4000,
        }
    }
}

/// Exposure presets, range in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposurePreset {
    Daylight,
    Cloudy,
    Indoor,
    Night,
}

impl ExposurePreset {
    pub fn range_us(&self) -> (u32, u32) {
        match self {
            Self::Daylight => (1000, 5000),
            Self::Cloudy => (3000, 10000),
            Self::Indoor => (5000, 20000),
            Self::Night => (10000, 50000),
        }
    }
}

/// Camera settings snapshot recorded with each session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// microseconds
    pub exposure_time: u32,
    pub exposure_mode: ControlMode,
    pub white_balance_mode: ControlMode,
    /// Kelvin
    pub white_balance_temperature: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            exposure_time: 5000,
            exposure_mode: ControlMode::Manual,
            white_balance_mode: ControlMode::Auto,
            white_balance_temperature: 5600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_path_lowercase() {
        let tags = EnvironmentTags {
            road_type: RoadType::Urban,
            weather: Weather::Cloudy,
            time_of_day: TimeOfDay::Pm,
            recording_side: RecordingSide::Right,
        };
        let path = tags.folder_path(Path::new("/data"));
        assert_eq!(path, PathBuf::from("/data/urban/cloudy/pm/right"));
    }

    #[test]
    fn test_presets() {
        assert_eq!(WhiteBalancePreset::Tungsten.kelvin(), 3200);
        assert_eq!(ExposurePreset::Night.range_us(), (10000, 50000));
    }
}
