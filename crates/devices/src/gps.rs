//! Simulated NMEA GPS receiver
//!
//! Pushes an RMC + GGA pair per period into a mock serial port, walking a
//! straight line from the configured start position.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ingestion::MockLinkHandle;
use tracing::{debug, warn};

/// `$body*CS` with the XOR checksum of `body`
pub fn nmea_sentence(body: &str) -> String {
    let checksum = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${body}*{checksum:02X}")
}

/// Decimal degrees to `ddmm.mmmmm` (latitude) or `dddmm.mmmmm` (longitude)
pub fn to_nmea_coordinate(value: f64, is_latitude: bool) -> (String, char) {
    let hemisphere = match (is_latitude, value < 0.0) {
        (true, false) => 'N',
        (true, true) => 'S',
        (false, false) => 'E',
        (false, true) => 'W',
    };
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;
    let text = if is_latitude {
        format!("{:02}{:08.5}", degrees as u32, minutes)
    } else {
        format!("{:03}{:08.5}", degrees as u32, minutes)
    };
    (text, hemisphere)
}

/// `hhmmss.ss`
fn utc_time(time: DateTime<Utc>) -> String {
    format!(
        "{}.{:02}",
        time.format("%H%M%S"),
        time.timestamp_subsec_millis() / 10
    )
}

/// GGA with fix quality 1
pub fn gga_sentence(latitude: f64, longitude: f64, satellites: u32, time: DateTime<Utc>) -> String {
    let (lat, ns) = to_nmea_coordinate(latitude, true);
    let (lon, ew) = to_nmea_coordinate(longitude, false);
    nmea_sentence(&format!(
        "GPGGA,{},{lat},{ns},{lon},{ew},1,{satellites:02},0.90,42.8,M,25.0,M,,",
        utc_time(time)
    ))
}

/// RMC with status `A`
pub fn rmc_sentence(latitude: f64, longitude: f64, time: DateTime<Utc>) -> String {
    let (lat, ns) = to_nmea_coordinate(latitude, true);
    let (lon, ew) = to_nmea_coordinate(longitude, false);
    nmea_sentence(&format!(
        "GPRMC,{},A,{lat},{ns},{lon},{ew},0.021,,{},,,A",
        utc_time(time),
        time.format("%d%m%y")
    ))
}

/// Simulated receiver configuration
#[derive(Debug, Clone)]
pub struct SimulatedGpsConfig {
    pub rate_hz: f64,
    pub start_latitude: f64,
    pub start_longitude: f64,
    /// Degrees moved per fix on both axes
    pub step_degrees: f64,
    pub satellites: u32,
}

impl Default for SimulatedGpsConfig {
    fn default() -> Self {
        Self {
            rate_hz: 1.0,
            start_latitude: 37.406_919,
            start_longitude: 126.722_887,
            step_degrees: 0.000_05,
            satellites: 8,
        }
    }
}

struct Track {
    config: SimulatedGpsConfig,
    handle: MockLinkHandle,
    emitted: AtomicU64,
}

impl Track {
    fn emit_next(&self) {
        let index = self.emitted.fetch_add(1, Ordering::Relaxed);
        let offset = index as f64 * self.config.step_degrees;
        let latitude = self.config.start_latitude + offset;
        let longitude = self.config.start_longitude + offset;
        let now = Utc::now();

        self.handle.push_line(&rmc_sentence(latitude, longitude, now));
        self.handle
            .push_line(&gga_sentence(latitude, longitude, self.config.satellites, now));
    }
}

/// Simulated GPS on a mock serial port
pub struct SimulatedGps {
    track: Arc<Track>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedGps {
    pub fn new(handle: MockLinkHandle, config: SimulatedGpsConfig) -> Self {
        Self {
            track: Arc::new(Track {
                config,
                handle,
                emitted: AtomicU64::new(0),
            }),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Push one RMC + GGA pair now
    pub fn emit_fix(&self) {
        self.track.emit_next();
    }

    /// Fix pairs pushed so far
    pub fn emitted(&self) -> u64 {
        self.track.emitted.load(Ordering::Relaxed)
    }

    /// Start periodic output. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let track = Arc::clone(&self.track);
        let running = Arc::clone(&self.running);
        let interval = Duration::from_secs_f64(1.0 / track.config.rate_hz.max(0.01));

        let spawned = thread::Builder::new()
            .name("sim-gps".to_string())
            .spawn(move || {
                debug!(rate_hz = track.config.rate_hz, "simulated GPS started");
                while running.load(Ordering::Relaxed) {
                    track.emit_next();
                    sleep_while_running(&running, interval);
                }
                debug!("simulated GPS stopped");
            });
        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle)
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                warn!(error = %e, "Failed to spawn simulated GPS thread");
            }
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatedGps {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep in short slices so `stop` returns promptly
pub(crate) fn sleep_while_running(running: &AtomicBool, total: Duration) {
    const SLICE: Duration = Duration::from_millis(10);
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::Relaxed) {
        let step = remaining.min(SLICE);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use contracts::TimeBase;
    use ingestion::{verify_checksum, GpsProtocolDecoder, SerialLink};

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 29, 6, 38, 2).unwrap()
    }

    #[test]
    fn test_known_checksum() {
        let sentence = nmea_sentence(
            "GPGGA,063802.00,3724.41511,N,12643.37321,E,1,07,1.23,42.8,M,25.0,M,,",
        );
        assert!(sentence.ends_with("*69"));
    }

    #[test]
    fn test_coordinate_format() {
        assert_eq!(to_nmea_coordinate(-33.75, true), ("3345.00000".to_string(), 'S'));
        assert_eq!(to_nmea_coordinate(8.5, false), ("00830.00000".to_string(), 'E'));
    }

    #[test]
    fn test_generated_sentences_decode() {
        let rmc = rmc_sentence(37.5, -122.25, fixed_time());
        let gga = gga_sentence(37.5, -122.25, 9, fixed_time());
        assert!(verify_checksum(&rmc));
        assert!(verify_checksum(&gga));
        assert!(gga.starts_with("$GPGGA,063802.00,"));

        let mut decoder = GpsProtocolDecoder::new();
        let time_base = TimeBase::new();
        assert!(decoder.decode(&rmc, time_base.now()).is_none());
        let fix = decoder.decode(&gga, time_base.now()).unwrap();
        assert!((fix.latitude - 37.5).abs() < 1e-6);
        assert!((fix.longitude + 122.25).abs() < 1e-6);
        assert_eq!(fix.satellites, Some(9));
    }

    #[test]
    fn test_emit_fix_pushes_pair() {
        let handle = MockLinkHandle::new();
        let gps = SimulatedGps::new(handle.clone(), SimulatedGpsConfig::default());
        gps.emit_fix();
        gps.emit_fix();
        assert_eq!(gps.emitted(), 2);

        let mut link = handle.link("sim", Duration::from_millis(10));
        let first = link.read_line().unwrap().unwrap();
        assert!(first.starts_with("$GPRMC"));
    }
}
