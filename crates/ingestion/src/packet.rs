//! Sensor board packet decoder
//!
//! Two line formats, comma separated, optionally prefixed with `*` and
//! suffixed with `@`:
//!
//! | format | fields |
//! |--------|--------|
//! | sync   | `SYNC,seq,device_ts,delay_ms,light,humidity,temp,ax,ay,az,gx,gy,gz,mx,my,mz,roll,pitch,yaw` |
//! | legacy | `light,humidity,temp,ax,ay,az,gx,gy,gz,mx,my,mz,roll,pitch,yaw` |
//!
//! `light` arrives as a raw 10-bit ADC value and is normalized to 0-100 %.

use contracts::{EulerAngles, ImuSample, SensorReading, Timestamp, Vector3};
use tracing::warn;

/// Field count of a synchronized packet including the tag
pub const SYNC_FIELD_COUNT: usize = 19;

/// Field count of a legacy packet
pub const LEGACY_FIELD_COUNT: usize = 15;

const SYNC_TAG: &str = "SYNC";

/// Raw ADC light reading (0 = bright, 1024 = dark) to percent
pub fn normalize_light(raw: f64) -> f64 {
    ((1024.0 - raw) / 1024.0 * 100.0).clamp(0.0, 100.0)
}

/// Numeric field, 0.0 when absent or unparseable
fn number(field: &str) -> f64 {
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Stateless decoder for sensor board lines
#[derive(Debug, Default, Clone, Copy)]
pub struct SensorProtocolDecoder;

impl SensorProtocolDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one line received at `timestamp`
    ///
    /// Returns `None` for blank lines and for packets with too few fields.
    pub fn decode(&self, line: &str, timestamp: Timestamp) -> Option<SensorReading> {
        let data = line.trim();
        let data = data.strip_prefix('*').unwrap_or(data).trim();
        if data.is_empty() {
            return None;
        }

        let fields: Vec<&str> = data
            .split(',')
            .map(|f| f.trim().trim_end_matches(['@', '\r']))
            .collect();

        if fields[0].eq_ignore_ascii_case(SYNC_TAG) {
            if fields.len() < SYNC_FIELD_COUNT {
                warn!(
                    field_count = fields.len(),
                    expected = SYNC_FIELD_COUNT,
                    "Truncated SYNC packet, discarding"
                );
                return None;
            }
            Some(Self::decode_sync(&fields, timestamp))
        } else if fields.len() >= LEGACY_FIELD_COUNT {
            Some(Self::decode_payload(&fields, timestamp))
        } else {
            warn!(
                field_count = fields.len(),
                "Invalid sensor packet format, discarding"
            );
            None
        }
    }

    fn decode_sync(fields: &[&str], timestamp: Timestamp) -> SensorReading {
        let mut reading = Self::decode_payload(&fields[4..], timestamp);

        // an unparseable sequence means an unsynchronized reading
        reading.sequence = fields[1].parse::<u64>().ok();
        reading.device_timestamp = Some(fields[2].to_string()).filter(|s| !s.is_empty());
        reading.processing_delay_ms = Some(number(fields[3]));
        reading
    }

    /// The 15 measurement fields shared by both formats
    fn decode_payload(v: &[&str], timestamp: Timestamp) -> SensorReading {
        let mut reading = SensorReading::empty(timestamp);
        reading.light_level = normalize_light(number(v[0]));
        reading.humidity = number(v[1]);
        reading.temperature = number(v[2]);
        reading.imu = ImuSample {
            accel: Vector3::new(number(v[3]), number(v[4]), number(v[5])),
            gyro: Vector3::new(number(v[6]), number(v[7]), number(v[8])),
            mag: Vector3::new(number(v[9]), number(v[10]), number(v[11])),
            euler: EulerAngles {
                roll: number(v[12]),
                pitch: number(v[13]),
                yaw: number(v[14]),
            },
        };
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TimeBase;

    fn now() -> Timestamp {
        TimeBase::new().now()
    }

    #[test]
    fn test_sync_packet() {
        let line = "*SYNC,42,123456,1.5,512,45.2,23.1,0.01,0.02,9.81,0.1,0.2,0.3,10,20,30,1.0,2.0,3.0@";
        let r = SensorProtocolDecoder::new().decode(line, now()).unwrap();

        assert_eq!(r.sequence, Some(42));
        assert!(r.is_synchronized());
        assert_eq!(r.device_timestamp.as_deref(), Some("123456"));
        assert_eq!(r.processing_delay_ms, Some(1.5));
        assert_eq!(r.light_level, 50.0);
        assert_eq!(r.humidity, 45.2);
        assert_eq!(r.temperature, 23.1);
        assert_eq!(r.imu.accel.z, 9.81);
        assert_eq!(r.imu.mag.y, 20.0);
        assert_eq!(r.imu.euler.yaw, 3.0);
    }

    #[test]
    fn test_legacy_packet() {
        let line = "*1024,40.0,21.5,0,0,1,0,0,0,0,0,0,5,6,7@\r";
        let r = SensorProtocolDecoder::new().decode(line, now()).unwrap();
        assert!(!r.is_synchronized());
        assert_eq!(r.light_level, 0.0);
        assert_eq!(r.temperature, 21.5);
        assert_eq!(r.imu.euler.roll, 5.0);
    }

    #[test]
    fn test_lowercase_tag_and_spaces() {
        let line = "sync, 7 ,ts,0, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14";
        let r = SensorProtocolDecoder::new().decode(line, now()).unwrap();
        assert_eq!(r.sequence, Some(7));
        assert_eq!(r.light_level, 100.0);
    }

    #[test]
    fn test_truncated_sync_rejected() {
        // 18 fields: not accepted as legacy either
        let line = "SYNC,1,ts,0,1,2,3,4,5,6,7,8,9,10,11,12,13,14";
        assert!(SensorProtocolDecoder::new().decode(line, now()).is_none());
    }

    #[test]
    fn test_short_and_blank_lines() {
        let decoder = SensorProtocolDecoder::new();
        assert!(decoder.decode("*1,2,3@", now()).is_none());
        assert!(decoder.decode("", now()).is_none());
        assert!(decoder.decode("*@", now()).is_none());
    }

    #[test]
    fn test_unparseable_fields_become_zero() {
        let line = "SYNC,abc,ts,x,nan,h,t,1,2,3,4,5,6,7,8,9,10,11,12";
        let r = SensorProtocolDecoder::new().decode(line, now()).unwrap();
        assert_eq!(r.sequence, None);
        assert_eq!(r.processing_delay_ms, Some(0.0));
        assert_eq!(r.humidity, 0.0);
        assert_eq!(r.light_level, 100.0);
    }

    #[test]
    fn test_normalize_light_clamps() {
        assert_eq!(normalize_light(0.0), 100.0);
        assert_eq!(normalize_light(1024.0), 0.0);
        assert_eq!(normalize_light(2000.0), 0.0);
        assert_eq!(normalize_light(-10.0), 100.0);
        assert_eq!(normalize_light(256.0), 75.0);
    }
}
