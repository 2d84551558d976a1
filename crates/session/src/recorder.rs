//! SessionRecorder - one recording from directory creation to metadata
//!
//! `start` opens the writers for the connected devices, wires the device
//! events into them and arms the sync timer in synchronized mode. `stop`
//! tears everything down in reverse order and writes the metadata document
//! last, once every writer has closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{
    AcquisitionBlueprint, CameraFeed, CameraTrigger, Frame, GpsFix, GpsInfo, HardwareInfo,
    Listener, RecordSink, RecordingMetadata, RecordingMode, SensorInfo, SensorReading,
    SensorSummary, SubscriptionId, SyncReport, TimeBase, Timestamp, VideoConfig, VideoEncoder,
};
use dispatcher::{
    EncodedFileInfo, FrameEncodingPipeline, GpxTrackWriter, ImageSequenceEncoder,
    SensorLogWriter, SinkHandle, SinkSender,
};
use ingestion::{GpsLink, SensorLink};
use serde::Serialize;
use sync_engine::SyncManager;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, SessionError};
use crate::layout::{file_name, SessionPaths};
use crate::metadata::{build_metadata, synchronization_info, write_metadata};

/// GPS fixes arrive at ~1 Hz
const TRACK_QUEUE_CAPACITY: usize = 64;

/// Builds the encoder for each new session
pub type EncoderFactory = Box<dyn Fn(&VideoConfig) -> Box<dyn VideoEncoder> + Send + Sync>;

/// Producer slot shared with a device listener; cleared at stop
type Slot<R> = Arc<Mutex<Option<SinkSender<R>>>>;

fn forward_into<R>(slot: &Slot<R>) -> Listener<R>
where
    R: Clone + Send + 'static,
{
    let slot = Arc::clone(slot);
    Arc::new(move |record: &R| {
        if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            tx.try_send(record.clone());
        }
    })
}

fn clear<R>(slot: &Slot<R>) {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take();
}

/// A session that has started
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSession {
    pub paths: SessionPaths,
    pub mode: RecordingMode,
    pub started_at: Timestamp,
}

/// Everything a finished session produced
#[derive(Debug, Clone)]
pub struct CompletedSession {
    pub session: RecordingSession,
    pub ended_at: Timestamp,
    pub metadata: RecordingMetadata,
    /// None when the encoder failed to finalize
    pub video: Option<EncodedFileInfo>,
    /// None when no track was recorded
    pub gps_points: Option<u64>,
    pub sensor_samples: Option<u64>,
    pub sync_report: Option<SyncReport>,
}

struct ActiveSession {
    session: RecordingSession,
    gps_start: Option<GpsFix>,
    track: Option<SinkHandle<GpxTrackWriter>>,
    track_slot: Slot<GpsFix>,
    gps_subscription: Option<SubscriptionId>,
    sensor_log: Option<SinkHandle<SensorLogWriter>>,
    sensor_slot: Slot<SensorReading>,
    sensor_subscription: Option<SubscriptionId>,
    pipeline: Arc<FrameEncodingPipeline>,
    frame_subscription: SubscriptionId,
}

struct ClosedWriters {
    gps_points: Option<u64>,
    sensor: Option<(u64, SensorSummary)>,
    video: Option<EncodedFileInfo>,
}

/// Coordinates one recording session at a time
pub struct SessionRecorder<C: CameraFeed> {
    blueprint: AcquisitionBlueprint,
    time_base: TimeBase,
    camera: Arc<C>,
    gps: Arc<GpsLink>,
    sensor: Arc<SensorLink>,
    sync: SyncManager<C, SensorLink>,
    encoder_factory: EncoderFactory,
    /// Last reported camera temperature, f64 bits
    camera_temperature: Arc<AtomicU64>,
    temperature_subscription: SubscriptionId,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl<C> SessionRecorder<C>
where
    C: CameraFeed + CameraTrigger + Sync + 'static,
{
    /// Wire the recorder to its devices
    ///
    /// The links may be connected or not; only connected devices get a writer.
    pub fn new(
        blueprint: AcquisitionBlueprint,
        time_base: TimeBase,
        camera: Arc<C>,
        gps: Arc<GpsLink>,
        sensor: Arc<SensorLink>,
    ) -> Result<Self> {
        let sync = SyncManager::new(
            Arc::clone(&camera),
            Arc::clone(&sensor),
            time_base.clone(),
            &blueprint.sync,
        )?;
        sensor.attach_gps(&gps);

        let camera_temperature = Arc::new(AtomicU64::new(0f64.to_bits()));
        let cell = Arc::clone(&camera_temperature);
        let temperature_subscription =
            camera.subscribe_temperature(Arc::new(move |celsius: &f64| {
                cell.store(celsius.to_bits(), Ordering::Relaxed);
            }));

        Ok(Self {
            blueprint,
            time_base,
            camera,
            gps,
            sensor,
            sync,
            encoder_factory: Box::new(|video: &VideoConfig| {
                Box::new(ImageSequenceEncoder::new(video.image_format)) as Box<dyn VideoEncoder>
            }),
            camera_temperature,
            temperature_subscription,
            active: tokio::sync::Mutex::new(None),
        })
    }

    /// Replace the default image-sequence encoder
    pub fn with_encoder_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&VideoConfig) -> Box<dyn VideoEncoder> + Send + Sync + 'static,
    {
        self.encoder_factory = Box::new(factory);
        self
    }

    pub fn blueprint(&self) -> &AcquisitionBlueprint {
        &self.blueprint
    }

    pub fn time_base(&self) -> &TimeBase {
        &self.time_base
    }

    pub fn sync_manager(&self) -> &SyncManager<C, SensorLink> {
        &self.sync
    }

    pub async fn is_recording(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Begin a session
    ///
    /// # Errors
    /// - `AlreadyRecording` while a session is active
    /// - `Storage` when the session directory cannot be created
    /// - `VideoStart` when the encoder refuses the output; writers opened so
    ///   far are closed again
    #[instrument(
        name = "session_start",
        skip(self),
        fields(mode = self.blueprint.recording.mode.as_str())
    )]
    pub async fn start(&self) -> Result<RecordingSession> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(SessionError::AlreadyRecording);
        }

        self.time_base.reset();
        let started_at = self.time_base.now();
        let mode = self.blueprint.recording.mode;
        let synchronized = mode == RecordingMode::Synchronized;
        let paths = SessionPaths::new(
            &self.blueprint.storage.root,
            &self.blueprint.recording.environment,
            &started_at,
        );
        std::fs::create_dir_all(&paths.dir).map_err(|e| SessionError::storage(&paths.dir, e))?;

        let gps_start = self.gps.current_location();

        let track = self.open_track(&paths);
        let sensor_log = self.open_sensor_log(&paths, synchronized);

        let (width, height) = self.camera.resolution();
        let encoder = (self.encoder_factory)(&self.blueprint.video);
        let pipeline = match FrameEncodingPipeline::start(
            encoder,
            &paths.video_target,
            width,
            height,
            self.camera.fps(),
            &self.blueprint.video,
        ) {
            Ok(pipeline) => Arc::new(pipeline),
            Err(e) => {
                error!(error = %e, "Video recording failed to start");
                shutdown_track(track).await;
                shutdown_sensor_log(sensor_log).await;
                return Err(SessionError::VideoStart(e));
            }
        };

        let frame_pipeline = Arc::clone(&pipeline);
        let frame_subscription = self.camera.subscribe_frames(Arc::new(move |frame: &Frame| {
            frame_pipeline.add_frame(frame);
        }));

        let track_slot: Slot<GpsFix> = Arc::new(Mutex::new(track.as_ref().map(|h| h.sender())));
        let gps_subscription = track
            .as_ref()
            .map(|_| self.gps.subscribe(forward_into(&track_slot)));
        let sensor_slot: Slot<SensorReading> =
            Arc::new(Mutex::new(sensor_log.as_ref().map(|h| h.sender())));
        let sensor_subscription = sensor_log
            .as_ref()
            .map(|_| self.sensor.subscribe(forward_into(&sensor_slot)));

        let session = RecordingSession {
            paths,
            mode,
            started_at,
        };
        let opened = ActiveSession {
            session: session.clone(),
            gps_start,
            track,
            track_slot,
            gps_subscription,
            sensor_log,
            sensor_slot,
            sensor_subscription,
            pipeline,
            frame_subscription,
        };

        if synchronized {
            if let Err(e) = self.sync.start() {
                error!(error = %e, "Sync manager failed to start, rolling back");
                self.close_writers(opened).await;
                return Err(e.into());
            }
        }

        *active = Some(opened);
        info!(
            dir = %session.paths.dir.display(),
            base_name = %session.paths.base_name,
            "Recording started"
        );
        Ok(session)
    }

    /// End the active session and write its metadata
    ///
    /// A video that fails to finalize is logged and reported as `None`; the
    /// metadata is still written.
    #[instrument(name = "session_stop", skip(self))]
    pub async fn stop(&self) -> Result<CompletedSession> {
        let taken = self.active.lock().await.take();
        let Some(active) = taken else {
            return Err(SessionError::NotRecording);
        };

        let synchronized = active.session.mode == RecordingMode::Synchronized;
        let sync_report = if synchronized {
            Some(self.sync.stop().await)
        } else {
            None
        };

        let ended_at = self.time_base.now();
        let camera_temperature = f64::from_bits(self.camera_temperature.load(Ordering::Relaxed));
        let gps_end = self.gps.current_location();
        let session = active.session.clone();
        let gps_start = active.gps_start;

        let closed = self.close_writers(active).await;

        let rate_hz = self.blueprint.sync.rate_hz;
        let paths = &session.paths;
        let (sensor_samples, sensor_summary) = match closed.sensor {
            Some((count, summary)) => (Some(count), summary),
            None => (None, SensorSummary::default()),
        };
        let hardware = HardwareInfo {
            camera_temperature,
            gps: GpsInfo {
                start: gps_start,
                end: gps_end,
                track_file: closed.gps_points.map(|_| file_name(&paths.track)),
                total_points: closed.gps_points,
                ..GpsInfo::default()
            },
            sensors: SensorInfo {
                sample_rate: if synchronized { rate_hz.round() as u32 } else { 1 },
                total_samples: sensor_samples,
                data_file: sensor_samples.map(|_| file_name(&paths.sensor_json)),
                summary: sensor_summary,
            },
        };
        let synchronization = sync_report.as_ref().map(|report| {
            synchronization_info(
                rate_hz,
                report,
                sensor_samples.map(|_| file_name(&paths.sensor_csv)),
            )
        });

        let metadata = build_metadata(
            &self.blueprint,
            &session.started_at,
            &ended_at,
            hardware,
            synchronization,
        );
        write_metadata(&paths.metadata, &metadata)?;

        info!(
            dir = %paths.dir.display(),
            gps_points = closed.gps_points.unwrap_or(0),
            sensor_samples = sensor_samples.unwrap_or(0),
            frames_written = closed.video.as_ref().map_or(0, |v| v.frames_written),
            sync_points = sync_report.as_ref().map_or(0, |r| r.total_ticks),
            "Recording stopped"
        );

        Ok(CompletedSession {
            session,
            ended_at,
            metadata,
            video: closed.video,
            gps_points: closed.gps_points,
            sensor_samples,
            sync_report,
        })
    }

    fn open_track(&self, paths: &SessionPaths) -> Option<SinkHandle<GpxTrackWriter>> {
        if !self.gps.is_connected() {
            return None;
        }
        match GpxTrackWriter::create(&paths.track, &paths.base_name) {
            Ok(writer) => Some(SinkHandle::spawn(writer, TRACK_QUEUE_CAPACITY)),
            Err(e) => {
                warn!(path = %paths.track.display(), error = %e, "GPS track not recorded");
                None
            }
        }
    }

    fn open_sensor_log(
        &self,
        paths: &SessionPaths,
        synchronized: bool,
    ) -> Option<SinkHandle<SensorLogWriter>> {
        if !self.sensor.is_connected() {
            return None;
        }
        let csv = synchronized.then_some(paths.sensor_csv.as_path());
        let config = &self.blueprint.sensor_log;
        match SensorLogWriter::create(&paths.sensor_json, csv, config.flush_every) {
            Ok(writer) => Some(SinkHandle::spawn(writer, config.queue_capacity)),
            Err(e) => {
                warn!(path = %paths.sensor_json.display(), error = %e, "Sensor data not recorded");
                None
            }
        }
    }

    /// Detach listeners, then drain and close every writer
    async fn close_writers(&self, active: ActiveSession) -> ClosedWriters {
        self.camera.unsubscribe(active.frame_subscription);
        if let Some(id) = active.gps_subscription {
            self.gps.unsubscribe(id);
        }
        if let Some(id) = active.sensor_subscription {
            self.sensor.unsubscribe(id);
        }
        // Sink workers exit only after every sender is gone
        clear(&active.track_slot);
        clear(&active.sensor_slot);

        let gps_points = shutdown_track(active.track).await;
        let sensor = shutdown_sensor_log(active.sensor_log).await;

        let pipeline = active.pipeline;
        let video = match tokio::task::spawn_blocking(move || pipeline.stop()).await {
            Ok(Ok(info)) => Some(info),
            Ok(Err(e)) => {
                warn!(error = %e, "Video was not finalized");
                None
            }
            Err(e) => {
                warn!(error = %e, "Video finalization task failed");
                None
            }
        };

        ClosedWriters {
            gps_points,
            sensor,
            video,
        }
    }
}

impl<C: CameraFeed> Drop for SessionRecorder<C> {
    fn drop(&mut self) {
        self.camera.unsubscribe(self.temperature_subscription);
    }
}

/// Warn when a sink lost records along the way
fn report_losses<S>(handle: &SinkHandle<S>)
where
    S: RecordSink + 'static,
    S::Record: Send + Sync + 'static,
{
    let stats = handle.stats();
    if !stats.is_lossless() {
        warn!(sink = handle.name(), %stats, "Records lost during session");
    }
}

async fn shutdown_track(track: Option<SinkHandle<GpxTrackWriter>>) -> Option<u64> {
    let track = track?;
    report_losses(&track);
    match track.shutdown().await {
        Ok(writer) => Some(writer.point_count()),
        Err(e) => {
            warn!(error = %e, "GPS track writer failed");
            None
        }
    }
}

async fn shutdown_sensor_log(
    sensor_log: Option<SinkHandle<SensorLogWriter>>,
) -> Option<(u64, SensorSummary)> {
    let sensor_log = sensor_log?;
    report_losses(&sensor_log);
    match sensor_log.shutdown().await {
        Ok(writer) => Some((writer.record_count(), writer.summary())),
        Err(e) => {
            warn!(error = %e, "Sensor log writer failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::read_metadata;
    use contracts::{ContractError, FrameImageFormat, QualityScore, VideoFileInfo};
    use devices::{SimulatedGpsConfig, SimulatedRig, SimulatedSensorConfig};
    use std::path::Path;
    use std::time::Duration;

    struct Rig {
        _tmp: tempfile::TempDir,
        devices: SimulatedRig,
        recorder: SessionRecorder<devices::MockCamera>,
    }

    fn small_blueprint(root: &Path, mode: RecordingMode) -> AcquisitionBlueprint {
        let mut blueprint = AcquisitionBlueprint::default();
        blueprint.storage.root = root.to_path_buf();
        blueprint.recording.mode = mode;
        blueprint.camera.width = 16;
        blueprint.camera.height = 12;
        blueprint.camera.fps = 20.0;
        blueprint.video.image_format = FrameImageFormat::Png;
        blueprint
    }

    fn rig(mode: RecordingMode, tweak: impl FnOnce(&mut AcquisitionBlueprint)) -> Rig {
        let tmp = tempfile::tempdir().unwrap();
        let mut blueprint = small_blueprint(tmp.path(), mode);
        tweak(&mut blueprint);

        let devices = SimulatedRig::with_configs(
            &blueprint,
            SimulatedGpsConfig {
                rate_hz: 20.0,
                ..SimulatedGpsConfig::default()
            },
            SimulatedSensorConfig {
                stream_rate_hz: 50.0,
                ..SimulatedSensorConfig::default()
            },
        );
        devices.apply_ports(&mut blueprint);

        let time_base = TimeBase::new();
        let timeout = Duration::from_millis(20);
        let gps = Arc::new(GpsLink::with_read_timeout(
            devices.opener(),
            time_base.clone(),
            timeout,
        ));
        let sensor = Arc::new(SensorLink::with_read_timeout(
            devices.opener(),
            time_base.clone(),
            timeout,
        ));
        gps.connect(devices.gps_port(), 9600).unwrap();
        sensor.connect(devices.sensor_port(), 115_200).unwrap();

        let recorder = SessionRecorder::new(
            blueprint,
            time_base,
            Arc::clone(&devices.camera),
            gps,
            sensor,
        )
        .unwrap();
        Rig {
            _tmp: tmp,
            devices,
            recorder,
        }
    }

    struct RefusingEncoder;

    impl VideoEncoder for RefusingEncoder {
        fn start_encoding(
            &mut self,
            _path: &Path,
            _width: u32,
            _height: u32,
            _fps: f64,
        ) -> std::result::Result<(), ContractError> {
            Err(ContractError::encoder("codec unavailable"))
        }

        fn write_frame(&mut self, _frame: &Frame) -> std::result::Result<(), ContractError> {
            Ok(())
        }

        fn stop_encoding(&mut self) -> std::result::Result<VideoFileInfo, ContractError> {
            Err(ContractError::encoder("not started"))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_continuous_session_writes_all_outputs() {
        let rig = rig(RecordingMode::Continuous, |_| {});
        rig.devices.start(RecordingMode::Continuous);

        let session = rig.recorder.start().await.unwrap();
        assert!(rig.recorder.is_recording().await);
        tokio::time::sleep(Duration::from_millis(400)).await;
        let done = rig.recorder.stop().await.unwrap();
        rig.devices.stop();

        let paths = &session.paths;
        assert!(paths.metadata.exists());
        assert!(paths.track.exists());
        assert!(paths.sensor_json.exists());
        assert!(!paths.sensor_csv.exists());

        assert!(done.gps_points.unwrap() > 0);
        assert!(done.sensor_samples.unwrap() > 0);
        let video = done.video.as_ref().unwrap();
        assert!(video.frames_written > 0);
        assert_eq!(video.path, paths.dir.join(format!("{}_frames", paths.base_name)));
        assert!(!paths.video_target.exists());
        assert!(done.sync_report.is_none());

        let md = read_metadata(&paths.metadata).unwrap();
        assert_eq!(md, done.metadata);
        assert!(md.synchronization.is_none());
        assert!((42.0..=50.0).contains(&md.hardware.camera_temperature));
        assert!(md.hardware.gps.start.is_some() || md.hardware.gps.end.is_some());
        assert_eq!(
            md.hardware.gps.track_file.as_deref(),
            Some(file_name(&paths.track).as_str())
        );
        assert_eq!(md.hardware.sensors.sample_rate, 1);
        assert!(md.hardware.sensors.summary.temperature.avg.is_some());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.sensor_json).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len() as u64, done.sensor_samples.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_synchronized_session_counts_manual_ticks() {
        // Period of 100 s: the timer never fires during the test
        let rig = rig(RecordingMode::Synchronized, |b| b.sync.rate_hz = 0.01);
        rig.devices.start(RecordingMode::Synchronized);

        let session = rig.recorder.start().await.unwrap();
        for _ in 0..20 {
            rig.recorder.sync_manager().run_tick().await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        let done = rig.recorder.stop().await.unwrap();
        rig.devices.stop();

        let sync = done.metadata.synchronization.as_ref().unwrap();
        assert_eq!(sync.total_sync_points, 20);
        assert_eq!(sync.master_frequency_hz, 0.01);
        assert_eq!(sync.quality_metrics.sync_success_rate, 1.0);
        assert!(matches!(
            sync.quality_metrics.sync_quality_score,
            QualityScore::Excellent | QualityScore::Good | QualityScore::Poor
        ));
        assert_eq!(
            sync.sync_log_file.as_deref(),
            Some(file_name(&session.paths.sensor_csv).as_str())
        );
        assert_eq!(rig.devices.camera.trigger_count(), 20);

        let csv = std::fs::read_to_string(&session.paths.sensor_csv).unwrap();
        assert!(csv.lines().count() > 1);
        assert!(csv.lines().nth(1).unwrap().starts_with("1,"));
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_idle() {
        let rig = rig(RecordingMode::Continuous, |_| {});
        assert!(matches!(
            rig.recorder.stop().await,
            Err(SessionError::NotRecording)
        ));

        rig.recorder.start().await.unwrap();
        assert!(matches!(
            rig.recorder.start().await,
            Err(SessionError::AlreadyRecording)
        ));
        rig.recorder.stop().await.unwrap();
        assert!(!rig.recorder.is_recording().await);
    }

    #[tokio::test]
    async fn test_encoder_failure_aborts_start() {
        let rig = rig(RecordingMode::Continuous, |_| {});
        let recorder = SessionRecorder::new(
            rig.recorder.blueprint().clone(),
            rig.recorder.time_base().clone(),
            Arc::clone(&rig.devices.camera),
            Arc::clone(&rig.recorder.gps),
            Arc::clone(&rig.recorder.sensor),
        )
        .unwrap()
        .with_encoder_factory(|_| Box::new(RefusingEncoder) as Box<dyn VideoEncoder>);

        let err = recorder.start().await.unwrap_err();
        assert!(matches!(err, SessionError::VideoStart(_)));
        assert!(!recorder.is_recording().await);
    }

    #[tokio::test]
    async fn test_vanishing_rates_are_errors() {
        let rig = rig(RecordingMode::Continuous, |_| {});
        let rebuild = |blueprint: AcquisitionBlueprint| {
            SessionRecorder::new(
                blueprint,
                rig.recorder.time_base().clone(),
                Arc::clone(&rig.devices.camera),
                Arc::clone(&rig.recorder.gps),
                Arc::clone(&rig.recorder.sensor),
            )
        };

        let mut blueprint = rig.recorder.blueprint().clone();
        blueprint.sync.rate_hz = 1e-30;
        assert!(matches!(
            rebuild(blueprint),
            Err(SessionError::Sync(sync_engine::SyncError::InvalidRate { .. }))
        ));

        let mut blueprint = rig.recorder.blueprint().clone();
        blueprint.camera.fps = 1e-30;
        let recorder = rebuild(blueprint).unwrap();
        let err = recorder.start().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::VideoStart(dispatcher::DispatcherError::InvalidFrameRate { .. })
        ));
        assert!(!recorder.is_recording().await);
    }

    #[tokio::test]
    async fn test_disconnected_devices_get_no_writers() {
        let rig = rig(RecordingMode::Continuous, |_| {});
        rig.recorder.gps.disconnect();
        rig.recorder.sensor.disconnect();

        let session = rig.recorder.start().await.unwrap();
        let done = rig.recorder.stop().await.unwrap();

        assert!(!session.paths.track.exists());
        assert!(!session.paths.sensor_json.exists());
        assert_eq!(done.gps_points, None);
        assert_eq!(done.metadata.hardware.gps.track_file, None);
        assert_eq!(done.metadata.hardware.sensors.data_file, None);
        assert!(session.paths.metadata.exists());
    }
}
