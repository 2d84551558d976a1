//! `run` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{
    AcquisitionBlueprint, CameraFeed, CameraTrigger, RecordingMode, SerialDeviceConfig, TimeBase,
};
use devices::{MockCamera, MockCameraConfig, SimulatedRig};
use ingestion::{GpsLink, LinkOpener, SensorLink, SerialPortOpener};
use session::{CompletedSession, SessionRecorder};
use tracing::{info, warn};

use super::describe_port;
use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_recording(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let loaded = config_loader::ConfigLoader::load_optional(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let mut blueprint = match loaded {
        Some(blueprint) => blueprint,
        None if args.simulate => {
            warn!(
                config = %args.config.display(),
                "Configuration file not found, simulating with defaults"
            );
            AcquisitionBlueprint::default()
        }
        None => return Err(CliError::config_not_found(&args.config).into()),
    };

    apply_overrides(&mut blueprint, args);

    let rig = args.simulate.then(|| {
        let rig = SimulatedRig::new(&blueprint);
        rig.apply_ports(&mut blueprint);
        rig
    });

    config_loader::ConfigLoader::validate(&blueprint)
        .map_err(|e| CliError::config_validation(e.to_string()))?;

    info!(
        mode = blueprint.recording.mode.as_str(),
        root = %blueprint.storage.root.display(),
        gps = %describe_port(&blueprint.gps),
        sensor = %describe_port(&blueprint.sensor),
        simulate = args.simulate,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let time_base = TimeBase::new();
    let opener: Arc<dyn LinkOpener> = match &rig {
        Some(rig) => rig.opener(),
        None => Arc::new(SerialPortOpener),
    };
    let camera = match &rig {
        Some(rig) => Arc::clone(&rig.camera),
        None => {
            warn!("No camera SDK backend is linked in, recording the synthetic camera");
            Arc::new(MockCamera::new(MockCameraConfig::from(&blueprint.camera)))
        }
    };

    let gps = Arc::new(GpsLink::with_read_timeout(
        Arc::clone(&opener),
        time_base.clone(),
        Duration::from_millis(blueprint.gps.read_timeout_ms),
    ));
    let sensor = Arc::new(SensorLink::with_read_timeout(
        opener,
        time_base.clone(),
        Duration::from_millis(blueprint.sensor.read_timeout_ms),
    ));
    connect_device("gps", &blueprint.gps, |port, baud| gps.connect(port, baud));
    connect_device("sensor", &blueprint.sensor, |port, baud| {
        sensor.connect(port, baud)
    });

    match &rig {
        Some(rig) => rig.start(blueprint.recording.mode),
        None => camera.start_streaming(),
    }

    let recorder = SessionRecorder::new(
        blueprint,
        time_base,
        Arc::clone(&camera),
        Arc::clone(&gps),
        Arc::clone(&sensor),
    )
    .context("Failed to set up session recorder")?;

    let outcome = record(&recorder, args.duration).await;

    match &rig {
        Some(rig) => rig.stop(),
        None => camera.stop_streaming(),
    }
    gps.disconnect();
    sensor.disconnect();

    let done = outcome?;
    print_session_summary(&done);

    info!("SRVS recorder finished");
    Ok(())
}

/// Command-line values win over the configuration file
pub(crate) fn apply_overrides(blueprint: &mut AcquisitionBlueprint, args: &RunArgs) {
    if let Some(ref port) = args.gps_port {
        info!(port = %port, "Overriding GPS port from CLI");
        blueprint.gps.port = port.clone();
        blueprint.gps.enabled = true;
    }
    if let Some(ref port) = args.sensor_port {
        info!(port = %port, "Overriding sensor port from CLI");
        blueprint.sensor.port = port.clone();
        blueprint.sensor.enabled = true;
    }
    if let Some(mode) = args.mode {
        let mode = RecordingMode::from(mode);
        info!(mode = mode.as_str(), "Overriding recording mode from CLI");
        blueprint.recording.mode = mode;
    }
    if let Some(ref root) = args.output {
        info!(root = %root.display(), "Overriding dataset root from CLI");
        blueprint.storage.root = root.clone();
    }
}

/// Open one serial device; a failure leaves the device out of the session
fn connect_device(
    name: &str,
    config: &SerialDeviceConfig,
    connect: impl FnOnce(&str, u32) -> ingestion::Result<()>,
) -> bool {
    if !config.enabled {
        info!(device = name, "Device disabled, skipping");
        return false;
    }
    match connect(&config.port, config.baud_rate) {
        Ok(()) => true,
        Err(e) => {
            warn!(device = name, port = %config.port, error = %e, "Device not connected, recording without it");
            false
        }
    }
}

async fn record<C>(recorder: &SessionRecorder<C>, duration_secs: u64) -> Result<CompletedSession>
where
    C: CameraFeed + CameraTrigger + Sync + 'static,
{
    let session = recorder
        .start()
        .await
        .map_err(|e| CliError::recording(format!("could not start session: {e}")))?;

    if duration_secs == 0 {
        info!(dir = %session.paths.dir.display(), "Recording, press Ctrl+C to stop");
    } else {
        info!(dir = %session.paths.dir.display(), duration_secs, "Recording");
    }

    let limit = async {
        if duration_secs == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(duration_secs)).await
        }
    };

    tokio::select! {
        _ = limit => info!(duration_secs, "Recording duration reached"),
        _ = shutdown_signal() => warn!("Received shutdown signal, stopping recording..."),
    }

    let done = recorder
        .stop()
        .await
        .map_err(|e| CliError::recording(format!("could not finish session: {e}")))?;
    Ok(done)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &AcquisitionBlueprint) {
    let env = &blueprint.recording.environment;
    println!("\n=== Configuration Summary ===\n");
    println!("Recording:");
    println!("  Mode: {}", blueprint.recording.mode.as_str());
    println!("  Root: {}", blueprint.storage.root.display());
    println!(
        "  Folder: {}",
        env.folder_path(&blueprint.storage.root).display()
    );
    println!("\nDevices:");
    println!("  GPS: {}", describe_port(&blueprint.gps));
    println!("  Sensor: {}", describe_port(&blueprint.sensor));
    println!(
        "  Camera: {}x{} @ {} fps",
        blueprint.camera.width, blueprint.camera.height, blueprint.camera.fps
    );
    if blueprint.recording.mode == RecordingMode::Synchronized {
        println!("\nSync Settings:");
        println!("  Rate: {} Hz", blueprint.sync.rate_hz);
        println!("  Stop timeout: {} ms", blueprint.sync.stop_timeout_ms);
    }
    println!();
}

fn print_session_summary(done: &CompletedSession) {
    let paths = &done.session.paths;
    println!("\n=== Session {} ===\n", paths.base_name);
    println!("  Directory: {}", paths.dir.display());
    match &done.video {
        Some(video) => println!(
            "  Video: {} ({} frames, {} dropped, {} bytes)",
            video.path.display(),
            video.frames_written,
            video.frames_dropped,
            video.bytes
        ),
        None => println!("  Video: not finalized"),
    }
    match done.gps_points {
        Some(points) => println!("  GPS track: {} points", points),
        None => println!("  GPS track: not recorded"),
    }
    match done.sensor_samples {
        Some(samples) => println!("  Sensor log: {} samples", samples),
        None => println!("  Sensor log: not recorded"),
    }
    if let Some(report) = &done.sync_report {
        println!(
            "  Sync: {} ticks, {:.1}% ok, max error {:.2} ms, quality {}",
            report.total_ticks,
            report.quality.sync_success_rate * 100.0,
            report.quality.max_sync_error_ms,
            report.quality.sync_quality_score
        );
    }
    println!("  Metadata: {}", paths.metadata.display());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["srvs-recorder", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Run(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_overrides_applied() {
        let args = run_args(&[
            "--gps-port",
            "COM3",
            "--mode",
            "synchronized",
            "--output",
            "/tmp/ds",
        ]);
        let mut blueprint = AcquisitionBlueprint::default();
        blueprint.gps.enabled = false;
        apply_overrides(&mut blueprint, &args);

        assert_eq!(blueprint.gps.port, "COM3");
        assert!(blueprint.gps.enabled);
        assert_eq!(blueprint.recording.mode, RecordingMode::Synchronized);
        assert_eq!(blueprint.storage.root, std::path::PathBuf::from("/tmp/ds"));
        assert_eq!(blueprint.sensor.port, AcquisitionBlueprint::default().sensor.port);
    }

    #[test]
    fn test_connect_device_skips_disabled_and_failed() {
        let mut config = SerialDeviceConfig::gps();
        config.enabled = false;
        assert!(!connect_device("gps", &config, |_, _| Ok(())));

        config.enabled = true;
        config.port = "COM9".to_string();
        assert!(connect_device("gps", &config, |port, baud| {
            assert_eq!((port, baud), ("COM9", 9600));
            Ok(())
        }));
        assert!(!connect_device("gps", &config, |port, _| {
            Err(ingestion::IngestionError::link_open(port, "busy"))
        }));
    }

    const SMALL_SIM_CONFIG: &str = r#"
[gps]
port = "SIM-GPS"
baud_rate = 9600

[sensor]
port = "SIM-SENSOR"
baud_rate = 115200

[camera]
width = 32
height = 24
fps = 10.0

[recording]
mode = "synchronized"

[recording.environment]
road_type = "urban"
weather = "cloudy"
time_of_day = "pm"
recording_side = "right"
"#;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_simulated_run_records_session() {
        let tmp = tempfile::tempdir().unwrap();
        let config = tmp.path().join("acquisition.toml");
        std::fs::write(&config, SMALL_SIM_CONFIG).unwrap();
        let output = tmp.path().join("dataset");
        let args = run_args(&[
            "--config",
            config.to_str().unwrap(),
            "--simulate",
            "--duration",
            "1",
            "--output",
            output.to_str().unwrap(),
        ]);

        run_recording(&args).await.unwrap();

        let side_dir = output.join("urban/cloudy/pm/right");
        let names: Vec<String> = std::fs::read_dir(&side_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("_right.json")));
        assert!(names.iter().any(|n| n.ends_with("_right.gpx")));
        assert!(names.iter().any(|n| n.ends_with("_sensors.csv")));

        let metadata = names.iter().find(|n| n.ends_with("_right.json")).unwrap();
        let md = session::read_metadata(&side_dir.join(metadata)).unwrap();
        let sync = md.synchronization.unwrap();
        assert!(sync.total_sync_points > 0);
    }
}
