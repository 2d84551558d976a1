//! FrameEncodingPipeline - rate-limited camera frames in front of one encoder thread
//!
//! The producer (camera callback thread) only checks the limiter, copies and
//! calls `try_send`, so it never blocks. A single consumer thread owns the
//! encoder and writes frames in arrival order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender, TrySendError};
use contracts::{ContractError, Frame, PixelLayout, VideoConfig, VideoEncoder, VideoFileInfo};
use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{DispatcherError, Result};

/// A frame is admitted once this fraction of the nominal frame interval has passed
pub const ADMIT_RATIO: f64 = 0.8;

/// Progress is logged every this many written frames
pub const PROGRESS_EVERY: u64 = 30;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Drops frames arriving faster than 80% of the target interval
#[derive(Debug, Clone)]
pub struct FrameRateLimiter {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl FrameRateLimiter {
    /// # Errors
    /// `InvalidFrameRate` unless `fps` is positive and the resulting interval fits a `Duration`.
    pub fn new(fps: f64) -> Result<Self> {
        let invalid = || DispatcherError::InvalidFrameRate { fps };
        if !(fps.is_finite() && fps > 0.0) {
            return Err(invalid());
        }
        let min_interval = Duration::try_from_secs_f64(ADMIT_RATIO / fps).map_err(|_| invalid())?;
        Ok(Self {
            min_interval,
            last_accepted: None,
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Would a frame arriving at `now` be admitted. Does not start a new interval.
    pub fn check_at(&self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }

    /// Start the next interval at `now`; call once the frame is actually queued
    pub fn commit_at(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }

    /// Check and commit in one step
    pub fn admit_at(&mut self, now: Instant) -> bool {
        let admitted = self.check_at(now);
        if admitted {
            self.commit_at(now);
        }
        admitted
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// Outcome of [`FrameEncodingPipeline::add_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAdmission {
    Accepted,
    RateLimited,
    QueueFull,
    Stopped,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    accepted: AtomicU64,
    rate_limited: AtomicU64,
    queue_full: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub accepted: u64,
    pub rate_limited: u64,
    pub queue_full: u64,
    pub written: u64,
    pub failed: u64,
}

impl PipelineStats {
    /// Frames that never reached the queue
    pub fn dropped(&self) -> u64 {
        self.rate_limited + self.queue_full
    }
}

/// Result of a finished encoding run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedFileInfo {
    pub path: PathBuf,
    pub bytes: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
}

type ConsumerHandle = thread::JoinHandle<std::result::Result<VideoFileInfo, ContractError>>;

/// Rate-limited, bounded frame queue in front of a [`VideoEncoder`]
pub struct FrameEncodingPipeline {
    path: PathBuf,
    tx: Sender<Frame>,
    limiter: Mutex<FrameRateLimiter>,
    layout: PixelLayout,
    counters: Arc<PipelineCounters>,
    consumer: Mutex<Option<ConsumerHandle>>,
    stop_timeout: Duration,
}

impl FrameEncodingPipeline {
    /// Open the encoder output and start the consumer thread
    ///
    /// # Errors
    /// `InvalidFrameRate` before the encoder is touched, `EncoderOpen` when the
    /// encoder refuses the output; nothing is left running.
    #[instrument(
        name = "encoding_pipeline_start",
        skip(encoder, config),
        fields(path = %path.display())
    )]
    pub fn start<E: VideoEncoder + 'static>(
        mut encoder: E,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        config: &VideoConfig,
    ) -> Result<Self> {
        let limiter = FrameRateLimiter::new(fps)?;
        encoder
            .start_encoding(path, width, height, fps)
            .map_err(|e| DispatcherError::encoder_open(path, e.to_string()))?;

        let layout = encoder.input_layout();
        let (tx, rx) = async_channel::bounded(config.queue_capacity.max(1));
        let counters = Arc::new(PipelineCounters::default());

        let consumer_counters = Arc::clone(&counters);
        let consumer = thread::Builder::new()
            .name("video-encoder".to_string())
            .spawn(move || consume(encoder, rx, consumer_counters))?;

        info!(width, height, fps, queue = config.queue_capacity, "Encoding pipeline started");
        Ok(Self {
            path: path.to_path_buf(),
            tx,
            limiter: Mutex::new(limiter),
            layout,
            counters,
            consumer: Mutex::new(Some(consumer)),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        })
    }

    /// Offer a frame from the capture callback
    ///
    /// The frame is copied only when admitted.
    pub fn add_frame(&self, frame: &Frame) -> FrameAdmission {
        if self.tx.is_closed() {
            return FrameAdmission::Stopped;
        }

        let now = Instant::now();
        if !self.lock_limiter().check_at(now) {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            observability::record_frame_dropped("rate_limit");
            trace!("Frame rate-limited");
            return FrameAdmission::RateLimited;
        }

        let mut owned = frame.clone();
        owned.convert_to(self.layout);

        match self.tx.try_send(owned) {
            Ok(()) => {
                self.lock_limiter().commit_at(now);
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                observability::record_frame_enqueued(self.tx.len());
                FrameAdmission::Accepted
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.counters.queue_full.fetch_add(1, Ordering::Relaxed) + 1;
                observability::record_frame_dropped("queue_full");
                warn!(dropped, "Encoding queue full, frame dropped");
                FrameAdmission::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                observability::record_frame_dropped("closed");
                FrameAdmission::Stopped
            }
        }
    }

    fn lock_limiter(&self) -> std::sync::MutexGuard<'_, FrameRateLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Frames waiting for the encoder
    pub fn queue_len(&self) -> usize {
        self.tx.len()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            queue_full: self.counters.queue_full.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue, let the consumer drain it and finalize the output
    ///
    /// Blocks for at most the configured stop timeout.
    #[instrument(name = "encoding_pipeline_stop", skip(self), fields(path = %self.path.display()))]
    pub fn stop(&self) -> Result<EncodedFileInfo> {
        self.tx.close();

        let handle = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Err(DispatcherError::NotRunning);
        };

        let deadline = Instant::now() + self.stop_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    pending = self.tx.len(),
                    "Encoding consumer did not finish in time, detaching"
                );
                return Err(DispatcherError::StopTimeout {
                    timeout_ms: self.stop_timeout.as_millis() as u64,
                });
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        let file = handle
            .join()
            .map_err(|_| ContractError::encoder("encoding thread panicked"))??;

        let stats = self.stats();
        info!(
            frames_written = stats.written,
            frames_dropped = stats.dropped(),
            frames_failed = stats.failed,
            bytes = file.size_bytes,
            "Encoding finished"
        );
        Ok(EncodedFileInfo {
            path: file.path,
            bytes: file.size_bytes,
            frames_written: stats.written,
            frames_dropped: stats.dropped(),
        })
    }
}

impl Drop for FrameEncodingPipeline {
    fn drop(&mut self) {
        // The consumer drains and finalizes on its own once the queue is closed
        self.tx.close();
    }
}

fn consume<E: VideoEncoder>(
    mut encoder: E,
    rx: Receiver<Frame>,
    counters: Arc<PipelineCounters>,
) -> std::result::Result<VideoFileInfo, ContractError> {
    debug!("Encoding consumer started");

    while let Ok(frame) = rx.recv_blocking() {
        match encoder.write_frame(&frame) {
            Ok(()) => {
                let written = counters.written.fetch_add(1, Ordering::Relaxed) + 1;
                observability::record_frame_encoded(true);
                if written % PROGRESS_EVERY == 0 {
                    debug!(frames_written = written, queued = rx.len(), "Encoding progress");
                }
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                observability::record_frame_encoded(false);
                warn!(error = %e, "Frame write failed");
            }
        }
    }

    debug!("Encoding consumer drained");
    encoder.stop_encoding()
}
