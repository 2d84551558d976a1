//! Decoded device readings produced by ingestion
//!
//! `SensorReading` comes from the environmental/IMU board, `GpsFix` from the
//! NMEA receiver. Both carry a `Timestamp` from the shared `TimeBase`.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Three-axis vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Euler angles (degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// IMU block of a sensor packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Acceleration
    pub accel: Vector3,
    /// Angular velocity
    pub gyro: Vector3,
    /// Magnetic field
    pub mag: Vector3,
    /// Attitude
    pub euler: EulerAngles,
}

/// One decoded sensor packet
///
/// `sequence` is present only for packets answering a synchronized-mode
/// `GET` request; `is_synchronized()` is defined by its presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Sync sequence echoed by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    /// Receipt instant from the shared time base
    pub timestamp: Timestamp,

    /// Raw timestamp field reported by the device (synchronized packets)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_timestamp: Option<String>,

    /// Device-side processing delay between request and reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_delay_ms: Option<f64>,

    /// Light level, 0-100 %
    pub light_level: f64,

    /// Relative humidity, %
    pub humidity: f64,

    /// Temperature, °C
    pub temperature: f64,

    pub imu: ImuSample,

    /// Most recent GPS fix at the time this reading was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_sync: Option<GpsFix>,
}

impl SensorReading {
    /// Reading with all measurements zeroed
    pub fn empty(timestamp: Timestamp) -> Self {
        Self {
            sequence: None,
            timestamp,
            device_timestamp: None,
            processing_delay_ms: None,
            light_level: 0.0,
            humidity: 0.0,
            temperature: 0.0,
            imu: ImuSample::default(),
            gps_sync: None,
        }
    }

    /// Whether this reading answers a sync request
    pub fn is_synchronized(&self) -> bool {
        self.sequence.is_some()
    }
}

/// Position fix in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u32>,
}
