//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟设备上的 e2e 录制（无需串口与相机）

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{AcquisitionBlueprint, RecordingMode};

    #[test]
    fn test_blueprint_survives_toml_and_json() {
        let mut blueprint = AcquisitionBlueprint::default();
        blueprint.gps.port = "/dev/ttyUSB0".to_string();
        blueprint.sensor.port = "/dev/ttyACM0".to_string();
        blueprint.recording.mode = RecordingMode::Synchronized;

        let toml = ConfigLoader::to_toml(&blueprint).unwrap();
        let from_toml = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(from_toml.gps.port, "/dev/ttyUSB0");
        assert_eq!(from_toml.recording.mode, RecordingMode::Synchronized);

        let json = ConfigLoader::to_json(&from_toml).unwrap();
        let from_json = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(from_json.sensor.baud_rate, 115_200);
        assert_eq!(from_json.sync.rate_hz, 30.0);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        AcquisitionBlueprint, FrameImageFormat, QualityScore, RecordingMode, TimeBase,
    };
    use devices::{MockCamera, SimulatedGpsConfig, SimulatedRig, SimulatedSensorConfig};
    use ingestion::{GpsLink, SensorLink};
    use session::{read_metadata, SessionRecorder};

    struct Bench {
        _tmp: tempfile::TempDir,
        rig: SimulatedRig,
        gps: Arc<GpsLink>,
        sensor: Arc<SensorLink>,
        recorder: SessionRecorder<MockCamera>,
    }

    /// Simulated rig wired to real links and a recorder writing under a tempdir
    fn bench(mode: RecordingMode, rate_hz: f64) -> Bench {
        let tmp = tempfile::tempdir().unwrap();
        let mut blueprint = AcquisitionBlueprint::default();
        blueprint.storage.root = tmp.path().to_path_buf();
        blueprint.recording.mode = mode;
        blueprint.sync.rate_hz = rate_hz;
        blueprint.camera.width = 24;
        blueprint.camera.height = 16;
        blueprint.camera.fps = 25.0;
        blueprint.video.image_format = FrameImageFormat::Png;

        let rig = SimulatedRig::with_configs(
            &blueprint,
            SimulatedGpsConfig {
                rate_hz: 25.0,
                ..SimulatedGpsConfig::default()
            },
            SimulatedSensorConfig {
                stream_rate_hz: 40.0,
                ..SimulatedSensorConfig::default()
            },
        );
        rig.apply_ports(&mut blueprint);

        let time_base = TimeBase::new();
        let timeout = Duration::from_millis(20);
        let gps = Arc::new(GpsLink::with_read_timeout(
            rig.opener(),
            time_base.clone(),
            timeout,
        ));
        let sensor = Arc::new(SensorLink::with_read_timeout(
            rig.opener(),
            time_base.clone(),
            timeout,
        ));
        gps.connect(rig.gps_port(), blueprint.gps.baud_rate).unwrap();
        sensor
            .connect(rig.sensor_port(), blueprint.sensor.baud_rate)
            .unwrap();

        let recorder = SessionRecorder::new(
            blueprint,
            time_base,
            Arc::clone(&rig.camera),
            Arc::clone(&gps),
            Arc::clone(&sensor),
        )
        .unwrap();

        Bench {
            _tmp: tmp,
            rig,
            gps,
            sensor,
            recorder,
        }
    }

    fn count_occurrences(path: &Path, needle: &str) -> usize {
        std::fs::read_to_string(path).unwrap().matches(needle).count()
    }

    /// 100 synchronized ticks -> TotalSyncPoints == 100 with a valid score
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_synchronized_session_100_ticks() {
        // 0.01 Hz keeps the timer quiet; ticks are driven by hand
        let bench = bench(RecordingMode::Synchronized, 0.01);
        bench.rig.start(RecordingMode::Synchronized);

        let session = bench.recorder.start().await.unwrap();
        for _ in 0..100 {
            bench.recorder.sync_manager().run_tick().await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        let done = bench.recorder.stop().await.unwrap();
        bench.rig.stop();

        let md = read_metadata(&session.paths.metadata).unwrap();
        let sync = md.synchronization.expect("synchronization block");
        assert_eq!(sync.total_sync_points, 100);
        assert_eq!(sync.method, "software_trigger_30hz");
        assert!(matches!(
            sync.quality_metrics.sync_quality_score,
            QualityScore::Excellent | QualityScore::Good | QualityScore::Poor
        ));
        assert_eq!(sync.quality_metrics.sync_success_rate, 1.0);
        assert_eq!(bench.rig.sensor.requests_answered(), 100);

        let distribution = sync.statistics.sync_error_distribution;
        assert_eq!(distribution.total(), 100);

        // Every SYNC reply lands in the CSV with its sequence number
        let csv = std::fs::read_to_string(&session.paths.sensor_csv).unwrap();
        let sequences: Vec<u64> = csv
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(sequences.len(), 100);
        assert_eq!(sequences.first(), Some(&1));
        assert_eq!(sequences.last(), Some(&100));
        assert_eq!(done.sync_report.unwrap().total_ticks, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_continuous_session_outputs_agree_with_metadata() {
        let bench = bench(RecordingMode::Continuous, 30.0);
        bench.rig.start(RecordingMode::Continuous);

        let session = bench.recorder.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        let done = bench.recorder.stop().await.unwrap();
        bench.rig.stop();

        let paths = &session.paths;
        let md = read_metadata(&paths.metadata).unwrap();
        assert!(md.synchronization.is_none());
        assert_eq!(md.recording_mode, RecordingMode::Continuous);

        let points = md.hardware.gps.total_points.unwrap();
        assert!(points > 0);
        assert_eq!(count_occurrences(&paths.track, "<trkpt "), points as usize);
        let gpx = std::fs::read_to_string(&paths.track).unwrap();
        assert!(gpx.trim_end().ends_with("</gpx>"));

        let samples = md.hardware.sensors.total_samples.unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.sensor_json).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len() as u64, samples);
        // Readings carry the GPS fix current at the time they were decoded
        assert!(json
            .as_array()
            .unwrap()
            .iter()
            .any(|reading| !reading["gps_sync"].is_null()));

        let summary = md.hardware.sensors.summary;
        let (min, max, avg) = (
            summary.temperature.min.unwrap(),
            summary.temperature.max.unwrap(),
            summary.temperature.avg.unwrap(),
        );
        assert!(min <= avg && avg <= max);

        let video = done.video.unwrap();
        assert!(video.frames_written > 0);
        assert_eq!(
            std::fs::read_dir(&video.path).unwrap().count() as u64,
            video.frames_written
        );
    }

    /// A sensor link that is down fails every tick but the count still advances
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_sync_without_sensor_counts_failed_ticks() {
        let bench = bench(RecordingMode::Synchronized, 0.01);
        bench.sensor.disconnect();

        bench.recorder.start().await.unwrap();
        for _ in 0..10 {
            let tick = bench.recorder.sync_manager().run_tick().await;
            assert!(tick.sensor_latency_ms.is_none());
        }
        let done = bench.recorder.stop().await.unwrap();

        let sync = done.metadata.synchronization.unwrap();
        assert_eq!(sync.total_sync_points, 10);
        assert_eq!(sync.quality_metrics.sync_success_rate, 0.0);
        assert_eq!(sync.quality_metrics.sync_quality_score, QualityScore::Poor);
        assert_eq!(sync.sync_log_file, None);
        assert_eq!(done.sensor_samples, None);
        assert!(bench.gps.is_connected());
    }

    /// A corrupted RMC sentence never reaches the location snapshot
    #[test]
    fn test_e2e_checksum_failure_leaves_no_fix() {
        let opener = Arc::new(ingestion::MockOpener::new());
        let handle = opener.add_port("gps0");
        let gps = GpsLink::with_read_timeout(
            Arc::clone(&opener) as Arc<dyn ingestion::LinkOpener>,
            TimeBase::new(),
            Duration::from_millis(20),
        );
        gps.connect("gps0", 9600).unwrap();

        let now = chrono::Utc::now();
        // Flip one data byte, keep the checksum
        let rmc = devices::rmc_sentence(37.5, 127.0, now).replacen("3730", "3830", 1);
        let gga = devices::gga_sentence(37.5, 127.0, 7, now).replacen("3730", "3830", 1);
        assert!(!ingestion::verify_checksum(&rmc));
        handle.push_line(&rmc);
        handle.push_line(&gga);
        std::thread::sleep(Duration::from_millis(150));

        assert!(!gps.has_valid_fix());
        assert!(gps.current_location().is_none());
        assert_eq!(gps.metrics().parse_errors, 2);
        gps.disconnect();
    }
}
