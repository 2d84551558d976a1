//! Mock camera
//!
//! Streams synthetic frames from a background thread at the configured fps,
//! reports a sensor temperature once per interval and answers software
//! triggers. Used for tests and `--simulate` runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    CameraConfig, CameraFeed, CameraTrigger, ContractError, Frame, Listener, ListenerRegistry,
    SubscriptionId,
};
use rand::Rng;
use tracing::{debug, trace, warn};

/// Reported sensor temperature range, °C
pub const TEMPERATURE_RANGE: (f64, f64) = (42.0, 50.0);

/// Mock camera configuration
#[derive(Debug, Clone)]
pub struct MockCameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub is_color: bool,
    /// Time a software trigger takes to complete
    pub trigger_latency: Duration,
    pub temperature_interval: Duration,
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fps: 30.0,
            is_color: true,
            trigger_latency: Duration::from_micros(300),
            temperature_interval: Duration::from_secs(1),
        }
    }
}

impl From<&CameraConfig> for MockCameraConfig {
    fn from(config: &CameraConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            is_color: config.is_color,
            ..Self::default()
        }
    }
}

struct Events {
    frames: ListenerRegistry<Frame>,
    temperature: ListenerRegistry<f64>,
}

/// Simulated camera
pub struct MockCamera {
    config: MockCameraConfig,
    events: Arc<Events>,
    streaming: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    triggers: AtomicU64,
    fail_triggers: AtomicBool,
}

impl MockCamera {
    pub fn new(config: MockCameraConfig) -> Self {
        Self {
            config,
            events: Arc::new(Events {
                frames: ListenerRegistry::new(),
                temperature: ListenerRegistry::new(),
            }),
            streaming: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            triggers: AtomicU64::new(0),
            fail_triggers: AtomicBool::new(false),
        }
    }

    /// Start the frame thread. Idempotent.
    pub fn start_streaming(&self) {
        if self.streaming.swap(true, Ordering::SeqCst) {
            return;
        }

        let config = self.config.clone();
        let events = Arc::clone(&self.events);
        let streaming = Arc::clone(&self.streaming);

        let spawned = thread::Builder::new()
            .name("mock-camera".to_string())
            .spawn(move || stream_frames(config, events, streaming));
        match spawned {
            Ok(handle) => *self.lock_worker() = Some(handle),
            Err(e) => {
                self.streaming.store(false, Ordering::SeqCst);
                warn!(error = %e, "Failed to spawn mock camera thread");
            }
        }
    }

    /// Stop the frame thread and wait for it
    pub fn stop_streaming(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        let handle = self.lock_worker().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Mock camera thread panicked");
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Software triggers answered so far
    pub fn trigger_count(&self) -> u64 {
        self.triggers.load(Ordering::Relaxed)
    }

    /// Make subsequent triggers fail
    pub fn set_trigger_failure(&self, fail: bool) {
        self.fail_triggers.store(fail, Ordering::SeqCst);
    }

    /// Synthetic test pattern, shifted by `index`
    pub fn render(
        width: u32,
        height: u32,
        is_color: bool,
        index: u64,
    ) -> Result<Frame, ContractError> {
        let shift = (index % 256) as u8;
        let channels = if is_color { 3 } else { 1 };
        let mut pixels = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height {
            for x in 0..width {
                let v = (x as u8).wrapping_add(shift);
                if is_color {
                    pixels.extend_from_slice(&[v, y as u8, shift]);
                } else {
                    pixels.push(v ^ y as u8);
                }
            }
        }
        Frame::from_capture(pixels, width, height, is_color)
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(MockCameraConfig::default())
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

fn stream_frames(config: MockCameraConfig, events: Arc<Events>, streaming: Arc<AtomicBool>) {
    let interval = Duration::from_secs_f64(1.0 / config.fps.max(0.1));
    let mut rng = rand::rng();
    let mut index: u64 = 0;
    let mut last_temperature: Option<Instant> = None;
    let mut next = Instant::now();

    debug!(
        width = config.width,
        height = config.height,
        fps = config.fps,
        "mock camera started"
    );

    while streaming.load(Ordering::Relaxed) {
        index += 1;
        match MockCamera::render(config.width, config.height, config.is_color, index) {
            Ok(frame) => {
                events.frames.notify(&frame);
                trace!(index, "mock frame delivered");
            }
            Err(e) => {
                warn!(error = %e, "mock frame rejected, stopping");
                break;
            }
        }

        let due = last_temperature.is_none_or(|t| t.elapsed() >= config.temperature_interval);
        if due {
            let celsius = rng.random_range(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1);
            events.temperature.notify(&celsius);
            last_temperature = Some(Instant::now());
        }

        next += interval;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }

    debug!(frames = index, "mock camera stopped");
}

impl CameraFeed for MockCamera {
    fn resolution(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn fps(&self) -> f64 {
        self.config.fps
    }

    fn subscribe_frames(&self, listener: Listener<Frame>) -> SubscriptionId {
        self.events.frames.subscribe(listener)
    }

    fn subscribe_temperature(&self, listener: Listener<f64>) -> SubscriptionId {
        self.events.temperature.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if !self.events.frames.unsubscribe(id) {
            self.events.temperature.unsubscribe(id);
        }
    }
}

impl CameraTrigger for MockCamera {
    async fn trigger_capture(&self) -> Result<(), ContractError> {
        if self.fail_triggers.load(Ordering::SeqCst) {
            return Err(ContractError::camera_trigger("simulated trigger failure"));
        }
        tokio::time::sleep(self.config.trigger_latency).await;
        self.triggers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
