//! AcquisitionBlueprint - Config Loader 输出
//!
//! 描述一次采集的完整配置：存储位置、串口设备、相机、录制模式、同步与输出参数。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::{
    CameraSettings, ControlMode, EnvironmentTags, ExposurePreset, RecordingMode,
    WhiteBalancePreset,
};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的采集配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AcquisitionBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 数据集根目录
    #[serde(default)]
    pub storage: StorageConfig,

    /// GPS 串口
    #[serde(default = "SerialDeviceConfig::gps")]
    #[validate(nested)]
    pub gps: SerialDeviceConfig,

    /// 传感器板串口
    #[serde(default = "SerialDeviceConfig::sensor")]
    #[validate(nested)]
    pub sensor: SerialDeviceConfig,

    /// 相机
    #[serde(default)]
    #[validate(nested)]
    pub camera: CameraConfig,

    /// 录制模式与环境标签
    #[serde(default)]
    pub recording: RecordingConfig,

    /// 同步触发
    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncConfig,

    /// 视频编码队列
    #[serde(default)]
    #[validate(nested)]
    pub video: VideoConfig,

    /// 传感器日志
    #[serde(default)]
    #[validate(nested)]
    pub sensor_log: SensorLogConfig,
}

impl Default for AcquisitionBlueprint {
    fn default() -> Self {
        Self {
            version: ConfigVersion::default(),
            storage: StorageConfig::default(),
            gps: SerialDeviceConfig::gps(),
            sensor: SerialDeviceConfig::sensor(),
            camera: CameraConfig::default(),
            recording: RecordingConfig::default(),
            sync: SyncConfig::default(),
            video: VideoConfig::default(),
            sensor_log: SensorLogConfig::default(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./dataset")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// 串口设备配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SerialDeviceConfig {
    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 端口名 (e.g. "/dev/ttyUSB0", "COM3")
    #[serde(default)]
    pub port: String,

    /// 波特率 (8-N-1)
    #[validate(range(min = 1))]
    pub baud_rate: u32,

    /// 读超时
    #[serde(default = "default_read_timeout_ms")]
    #[validate(range(min = 1, max = 10000))]
    pub read_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_read_timeout_ms() -> u64 {
    500
}

impl SerialDeviceConfig {
    /// NMEA 接收机默认值 (9600 baud)
    pub fn gps() -> Self {
        Self {
            enabled: true,
            port: String::new(),
            baud_rate: 9600,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }

    /// 传感器板默认值 (115200 baud)
    pub fn sensor() -> Self {
        Self {
            enabled: true,
            port: String::new(),
            baud_rate: 115_200,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// 相机配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CameraConfig {
    #[validate(range(min = 1))]
    pub width: u32,

    #[validate(range(min = 1))]
    pub height: u32,

    /// 目标帧率
    #[validate(range(min = 0.01, max = 240.0))]
    pub fps: f64,

    #[serde(default = "default_true")]
    pub is_color: bool,

    /// 曝光时间 (µs)
    #[validate(range(min = 1))]
    pub exposure_time_us: u32,

    #[serde(default = "default_manual")]
    pub exposure_mode: ControlMode,

    #[serde(default)]
    pub white_balance_mode: ControlMode,

    /// 色温 (K)
    #[validate(range(min = 2000, max = 10000))]
    pub white_balance_temperature: u32,

    /// 色温预设，优先于 white_balance_temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_balance_preset: Option<WhiteBalancePreset>,

    /// 曝光预设，exposure_time_us 必须落在预设范围内
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_preset: Option<ExposurePreset>,
}

fn default_manual() -> ControlMode {
    ControlMode::Manual
}

impl CameraConfig {
    /// 解析预设，得到随会话记录的相机参数快照
    pub fn settings(&self) -> CameraSettings {
        let white_balance_temperature = self
            .white_balance_preset
            .map(|p| p.kelvin())
            .unwrap_or(self.white_balance_temperature);

        CameraSettings {
            exposure_time: self.exposure_time_us,
            exposure_mode: self.exposure_mode,
            white_balance_mode: self.white_balance_mode,
            white_balance_temperature,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        let settings = CameraSettings::default();
        Self {
            width: 1920,
            height: 1080,
            fps: 30.0,
            is_color: true,
            exposure_time_us: settings.exposure_time,
            exposure_mode: settings.exposure_mode,
            white_balance_mode: settings.white_balance_mode,
            white_balance_temperature: settings.white_balance_temperature,
            white_balance_preset: None,
            exposure_preset: None,
        }
    }
}

/// 录制配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default)]
    pub mode: RecordingMode,

    #[serde(default)]
    pub environment: EnvironmentTags,
}

/// 同步触发配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncConfig {
    /// 触发频率 (Hz)
    #[serde(default = "default_sync_rate_hz")]
    #[validate(range(min = 0.01, max = 1000.0))]
    pub rate_hz: f64,

    /// Stop 时等待进行中 tick 的上限
    #[serde(default = "default_stop_timeout_ms")]
    #[validate(range(min = 1))]
    pub stop_timeout_ms: u64,
}

fn default_sync_rate_hz() -> f64 {
    30.0
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_sync_rate_hz(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

/// 帧输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl FrameImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// 视频编码配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VideoConfig {
    /// 帧队列容量
    #[serde(default = "default_video_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    #[serde(default)]
    pub image_format: FrameImageFormat,

    /// Stop 时等待消费线程排空的上限
    #[serde(default = "default_stop_timeout_ms")]
    #[validate(range(min = 1))]
    pub stop_timeout_ms: u64,
}

fn default_video_queue_capacity() -> usize {
    120
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_video_queue_capacity(),
            image_format: FrameImageFormat::default(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

/// 传感器日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorLogConfig {
    /// JSON 缓冲条数
    #[serde(default = "default_flush_every")]
    #[validate(range(min = 1))]
    pub flush_every: usize,

    /// 写入队列容量
    #[serde(default = "default_sink_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
}

fn default_flush_every() -> usize {
    10
}

fn default_sink_queue_capacity() -> usize {
    256
}

impl Default for SensorLogConfig {
    fn default() -> Self {
        Self {
            flush_every: default_flush_every(),
            queue_capacity: default_sink_queue_capacity(),
        }
    }
}
