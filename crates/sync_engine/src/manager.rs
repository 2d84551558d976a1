//! SyncManager - 30 Hz software trigger loop
//!
//! Each tick bumps the sequence, runs the camera trigger and the sensor
//! `GET,<seq>,<ticks>` request concurrently, times both, then updates the
//! statistics and notifies subscribers. Ticks never block each other.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{
    CameraTrigger, ContractError, Listener, ListenerRegistry, SensorCommander, SubscriptionId,
    SyncConfig, SyncQualityMetrics, SyncReport, SyncTick, TimeBase,
};
use observability::SyncMetricsAggregator;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::quality;

/// Extra time granted to the loop task on top of the tick drain timeout
const LOOP_EXIT_GRACE: Duration = Duration::from_millis(500);

/// Manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
}

struct Shared<C, S> {
    camera: Arc<C>,
    sensor: Arc<S>,
    time_base: TimeBase,
    sequence: AtomicU64,
    stats: Mutex<SyncMetricsAggregator>,
    ticks: ListenerRegistry<SyncTick>,
}

impl<C, S> Shared<C, S>
where
    C: CameraTrigger + Sync,
    S: SensorCommander + Sync,
{
    fn lock_stats(&self) -> MutexGuard<'_, SyncMetricsAggregator> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_tick(&self) -> SyncTick {
        // failed ticks consume a sequence number too
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let timestamp = self.time_base.now();
        let command = format!("GET,{sequence},{}", timestamp.ticks());

        let (camera, sensor) = tokio::join!(
            timed(self.camera.trigger_capture()),
            timed(self.sensor.send_command(&command)),
        );

        let camera_latency_ms = match camera {
            Ok(ms) => Some(ms),
            Err(e) => {
                warn!(sequence, error = %e, "Camera trigger failed");
                None
            }
        };
        let sensor_latency_ms = match sensor {
            Ok(ms) => Some(ms),
            Err(e) => {
                warn!(sequence, error = %e, "Sensor request failed");
                None
            }
        };

        let tick = SyncTick {
            sequence,
            timestamp,
            camera_latency_ms,
            sensor_latency_ms,
        };

        self.lock_stats().update(&tick);
        observability::record_sync_tick(&tick);
        self.ticks.notify(&tick);
        tick
    }
}

/// Wall-clock latency of one call, in milliseconds
async fn timed<F>(call: F) -> std::result::Result<f64, ContractError>
where
    F: Future<Output = std::result::Result<(), ContractError>>,
{
    let started = Instant::now();
    call.await?;
    Ok(started.elapsed().as_secs_f64() * 1000.0)
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic camera/sensor trigger
///
/// `start` arms a timer at `rate_hz`; `stop` disarms it and waits (bounded)
/// for in-flight ticks. Statistics stay readable until the next `start`.
pub struct SyncManager<C, S> {
    shared: Arc<Shared<C, S>>,
    period: Duration,
    stop_timeout: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl<C, S> SyncManager<C, S>
where
    C: CameraTrigger + Sync + 'static,
    S: SensorCommander + Sync + 'static,
{
    pub fn new(
        camera: Arc<C>,
        sensor: Arc<S>,
        time_base: TimeBase,
        config: &SyncConfig,
    ) -> Result<Self> {
        let invalid = || SyncError::InvalidRate {
            rate_hz: config.rate_hz,
        };
        if !(config.rate_hz.is_finite() && config.rate_hz > 0.0) {
            return Err(invalid());
        }
        let period = Duration::try_from_secs_f64(1.0 / config.rate_hz).map_err(|_| invalid())?;

        Ok(Self {
            shared: Arc::new(Shared {
                camera,
                sensor,
                time_base,
                sequence: AtomicU64::new(0),
                stats: Mutex::new(SyncMetricsAggregator::new()),
                ticks: ListenerRegistry::new(),
            }),
            period,
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
            running: Mutex::new(None),
        })
    }

    /// Nominal tick interval
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SyncState {
        match self.lock_running().as_ref() {
            Some(running) if !running.handle.is_finished() => SyncState::Running,
            _ => SyncState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SyncState::Running
    }

    /// Reset counters and arm the timer. No-op while already running.
    #[instrument(name = "sync_start", skip(self), fields(period_ms = self.period.as_secs_f64() * 1000.0))]
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let mut running = self.lock_running();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!("Sync manager already running");
            return Ok(());
        }

        self.shared.sequence.store(0, Ordering::SeqCst);
        self.shared.lock_stats().reset();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(tick_loop(
            Arc::clone(&self.shared),
            self.period,
            self.stop_timeout,
            stop_rx,
        ));
        *running = Some(RunningLoop { stop_tx, handle });

        info!(
            rate_hz = 1.0 / self.period.as_secs_f64(),
            "Sync manager started"
        );
        Ok(())
    }

    /// Disarm the timer and wait for in-flight ticks. Safe to call when idle.
    #[instrument(name = "sync_stop", skip(self))]
    pub async fn stop(&self) -> SyncReport {
        let taken = self.lock_running().take();
        let Some(mut running) = taken else {
            return self.report();
        };

        let _ = running.stop_tx.send(true);
        match tokio::time::timeout(self.stop_timeout + LOOP_EXIT_GRACE, &mut running.handle).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Sync loop task failed"),
            Err(_) => {
                warn!("Sync loop did not exit in time, aborting");
                running.handle.abort();
            }
        }

        let report = self.report();
        info!(
            total_ticks = report.total_ticks,
            successful_ticks = report.successful_ticks,
            max_sync_error_ms = report.quality.max_sync_error_ms,
            score = %report.quality.sync_quality_score,
            "Sync manager stopped"
        );
        report
    }

    /// Run one tick now, outside the timer
    pub async fn run_tick(&self) -> SyncTick {
        self.shared.run_tick().await
    }

    /// Last issued sequence number (0 before the first tick)
    pub fn sequence(&self) -> u64 {
        self.shared.sequence.load(Ordering::SeqCst)
    }

    /// Register a tick callback (runs on the tick task)
    pub fn subscribe_ticks(&self, listener: Listener<SyncTick>) -> SubscriptionId {
        self.shared.ticks.subscribe(listener)
    }

    pub fn unsubscribe_ticks(&self, id: SubscriptionId) -> bool {
        self.shared.ticks.unsubscribe(id)
    }

    pub fn quality_metrics(&self) -> SyncQualityMetrics {
        quality::quality_metrics(&self.shared.lock_stats())
    }

    pub fn report(&self) -> SyncReport {
        quality::report(&self.shared.lock_stats())
    }

    /// Success rate in percent
    pub fn success_rate_percent(&self) -> f64 {
        self.shared.lock_stats().success_rate() * 100.0
    }

    /// Human readable statistics
    pub fn summary(&self) -> observability::SyncMetricsSummary {
        self.shared.lock_stats().summary()
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C, S> Drop for SyncManager<C, S> {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            let _ = running.stop_tx.send(true);
            running.handle.abort();
        }
    }
}

async fn tick_loop<C, S>(
    shared: Arc<Shared<C, S>>,
    period: Duration,
    stop_timeout: Duration,
    mut stop_rx: watch::Receiver<bool>,
) where
    C: CameraTrigger + Sync + 'static,
    S: SensorCommander + Sync + 'static,
{
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let shared = Arc::clone(&shared);
                in_flight.spawn(async move {
                    shared.run_tick().await;
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Sync tick task failed");
                }
            }
            _ = stop_rx.changed() => break,
        }
    }

    let pending = in_flight.len();
    debug!(pending, "Draining in-flight ticks");
    let drained = tokio::time::timeout(stop_timeout, async {
        while in_flight.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            remaining = in_flight.len(),
            "In-flight ticks did not finish in time, cancelling"
        );
        in_flight.abort_all();
    }
}
