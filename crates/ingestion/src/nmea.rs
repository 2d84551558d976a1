//! NMEA 0183 decoder (RMC / GGA)

use contracts::{GpsFix, Timestamp};
use tracing::{debug, warn};

/// Verify the `*hh` XOR checksum of an NMEA sentence
///
/// The checksum covers every byte between `$` and the last `*`.
pub fn verify_checksum(sentence: &str) -> bool {
    let Some(body) = sentence.strip_prefix('$') else {
        return false;
    };
    let Some(star) = body.rfind('*') else {
        return false;
    };

    let expected = &body[star + 1..];
    if expected.len() != 2 {
        return false;
    }
    let Ok(expected) = u8::from_str_radix(expected, 16) else {
        return false;
    };

    let actual = body[..star].bytes().fold(0u8, |acc, b| acc ^ b);
    actual == expected
}

/// Convert `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed decimal degrees
pub fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    let raw: f64 = value.trim().parse().ok()?;
    let degrees = (raw / 100.0).floor();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;

    match hemisphere.trim() {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Stateful NMEA decoder
///
/// RMC only toggles the fix-valid flag from its status field. GGA carries
/// the position: it sets the flag from the fix quality, records satellites in
/// use and emits a fix when the quality is valid and both coordinates parse.
#[derive(Debug, Default)]
pub struct GpsProtocolDecoder {
    has_valid_fix: bool,
    satellites: Option<u32>,
}

impl GpsProtocolDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_valid_fix(&self) -> bool {
        self.has_valid_fix
    }

    /// Satellites from the last GGA sentence
    pub fn satellites(&self) -> Option<u32> {
        self.satellites
    }

    pub fn reset(&mut self) {
        self.has_valid_fix = false;
        self.satellites = None;
    }

    /// Decode one sentence received at `timestamp`
    pub fn decode(&mut self, line: &str, timestamp: Timestamp) -> Option<GpsFix> {
        let sentence = line.trim();
        if !sentence.starts_with('$') {
            return None;
        }
        if !verify_checksum(sentence) {
            warn!(sentence = %sentence, "NMEA checksum mismatch, discarding");
            return None;
        }

        let body = match sentence.rfind('*') {
            Some(star) => &sentence[1..star],
            None => &sentence[1..],
        };
        let fields: Vec<&str> = body.split(',').collect();

        // GP (GPS) or GN (multi-constellation) talker
        let kind = fields[0].get(2..).unwrap_or_default();
        match kind {
            "RMC" => self.decode_rmc(&fields),
            "GGA" => self.decode_gga(&fields, timestamp),
            _ => None,
        }
    }

    fn decode_rmc(&mut self, fields: &[&str]) -> Option<GpsFix> {
        if fields.len() < 7 {
            warn!(field_count = fields.len(), "RMC sentence too short");
            return None;
        }

        self.has_valid_fix = fields[2] == "A";
        if !self.has_valid_fix {
            debug!("RMC reports no fix");
        }
        None
    }

    fn decode_gga(&mut self, fields: &[&str], timestamp: Timestamp) -> Option<GpsFix> {
        if fields.len() < 10 {
            warn!(field_count = fields.len(), "GGA sentence too short");
            return None;
        }

        let quality = fields[6].trim();
        self.satellites = fields[7].trim().parse().ok();
        self.has_valid_fix = !(quality.is_empty() || quality == "0");
        if !self.has_valid_fix {
            debug!("GGA reports no fix");
            return None;
        }

        self.fix_from(fields[2], fields[3], fields[4], fields[5], timestamp)
    }

    fn fix_from(
        &self,
        lat: &str,
        lat_hemi: &str,
        lon: &str,
        lon_hemi: &str,
        timestamp: Timestamp,
    ) -> Option<GpsFix> {
        let latitude = parse_coordinate(lat, lat_hemi)?;
        let longitude = parse_coordinate(lon, lon_hemi)?;
        Some(GpsFix {
            latitude,
            longitude,
            timestamp,
            satellites: self.satellites,
        })
    }
}
