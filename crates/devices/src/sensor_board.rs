//! Simulated environmental / IMU sensor board
//!
//! Answers `GET,<seq>,<ticks>` with a `SYNC` packet and, when streaming,
//! pushes legacy 15-field packets at a fixed rate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ingestion::MockLinkHandle;
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::gps::sleep_while_running;

/// One set of raw board measurements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardSample {
    /// Raw 10-bit light ADC value
    pub light_raw: f64,
    pub humidity: f64,
    pub temperature: f64,
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
    pub mag: [f64; 3],
    /// roll, pitch, yaw
    pub euler: [f64; 3],
}

impl BoardSample {
    /// Plausible values for a vehicle at rest
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            light_raw: rng.random_range(200.0..800.0),
            humidity: rng.random_range(35.0..60.0),
            temperature: rng.random_range(18.0..28.0),
            accel: [
                rng.random_range(-0.05..0.05),
                rng.random_range(-0.05..0.05),
                rng.random_range(9.75..9.85),
            ],
            gyro: [
                rng.random_range(-0.01..0.01),
                rng.random_range(-0.01..0.01),
                rng.random_range(-0.01..0.01),
            ],
            mag: [
                rng.random_range(20.0..30.0),
                rng.random_range(-5.0..5.0),
                rng.random_range(40.0..45.0),
            ],
            euler: [
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(0.0..360.0),
            ],
        }
    }

    fn payload(&self) -> String {
        let mut fields = vec![
            format!("{:.0}", self.light_raw),
            format!("{:.2}", self.humidity),
            format!("{:.2}", self.temperature),
        ];
        for v in self.accel.iter().chain(&self.gyro).chain(&self.mag) {
            fields.push(format!("{v:.4}"));
        }
        for v in &self.euler {
            fields.push(format!("{v:.3}"));
        }
        fields.join(",")
    }
}

/// `*SYNC,seq,device_ts,delay,<15 measurement fields>@`
pub fn sync_packet(sequence: u64, device_timestamp: &str, delay_ms: f64, sample: &BoardSample) -> String {
    format!(
        "*SYNC,{sequence},{device_timestamp},{delay_ms:.2},{}@",
        sample.payload()
    )
}

/// `*<15 measurement fields>@`
pub fn legacy_packet(sample: &BoardSample) -> String {
    format!("*{}@", sample.payload())
}

/// Split `GET,<seq>,<ticks>` into its arguments
pub fn parse_get_request(line: &str) -> Option<(u64, &str)> {
    let mut parts = line.trim().split(',');
    if !parts.next()?.eq_ignore_ascii_case("GET") {
        return None;
    }
    let sequence = parts.next()?.trim().parse().ok()?;
    let ticks = parts.next().unwrap_or("").trim();
    Some((sequence, ticks))
}

/// Simulated board configuration
#[derive(Debug, Clone)]
pub struct SimulatedSensorConfig {
    /// Legacy packet rate while streaming
    pub stream_rate_hz: f64,
    /// Processing delay reported in SYNC replies
    pub processing_delay_ms: f64,
}

impl Default for SimulatedSensorConfig {
    fn default() -> Self {
        Self {
            stream_rate_hz: 10.0,
            processing_delay_ms: 1.2,
        }
    }
}

/// Simulated sensor board on a mock serial port
pub struct SimulatedSensorBoard {
    handle: MockLinkHandle,
    config: SimulatedSensorConfig,
    answered: Arc<AtomicU64>,
    streaming: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedSensorBoard {
    /// Attach to a mock port and start answering `GET` requests
    pub fn new(handle: MockLinkHandle, config: SimulatedSensorConfig) -> Self {
        let answered = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&answered);
        let delay_ms = config.processing_delay_ms;

        handle.set_responder(Arc::new(move |line: &str| {
            let Some((sequence, ticks)) = parse_get_request(line) else {
                return Vec::new();
            };
            counter.fetch_add(1, Ordering::Relaxed);
            let sample = BoardSample::random(&mut rand::rng());
            trace!(sequence, "simulated SYNC reply");
            vec![sync_packet(sequence, ticks, delay_ms, &sample)]
        }));

        Self {
            handle,
            config,
            answered,
            streaming: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// `GET` requests answered so far
    pub fn requests_answered(&self) -> u64 {
        self.answered.load(Ordering::Relaxed)
    }

    /// Push one legacy packet now
    pub fn emit_reading(&self) {
        let sample = BoardSample::random(&mut rand::rng());
        self.handle.push_line(&legacy_packet(&sample));
    }

    /// Start free-running legacy output. Idempotent.
    pub fn start_streaming(&self) {
        if self.streaming.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.handle.clone();
        let streaming = Arc::clone(&self.streaming);
        let rate_hz = self.config.stream_rate_hz;
        let interval = Duration::from_secs_f64(1.0 / rate_hz.max(0.01));

        let spawned = thread::Builder::new()
            .name("sim-sensor".to_string())
            .spawn(move || {
                debug!(rate_hz, "simulated sensor board streaming");
                let mut rng = rand::rng();
                while streaming.load(Ordering::Relaxed) {
                    handle.push_line(&legacy_packet(&BoardSample::random(&mut rng)));
                    sleep_while_running(&streaming, interval);
                }
                debug!("simulated sensor board stopped");
            });
        match spawned {
            Ok(worker) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker)
            }
            Err(e) => {
                self.streaming.store(false, Ordering::SeqCst);
                warn!(error = %e, "Failed to spawn simulated sensor thread");
            }
        }
    }

    pub fn stop_streaming(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

impl Drop for SimulatedSensorBoard {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}
