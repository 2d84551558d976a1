//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{AcquisitionBlueprint, RecordingMode};
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    storage: StorageInfo,
    devices: DevicesInfo,
    recording: RecordingInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_settings: Option<SyncInfo>,
}

#[derive(Serialize)]
struct StorageInfo {
    root: String,
    session_dir: String,
}

#[derive(Serialize)]
struct DevicesInfo {
    gps: SerialInfo,
    sensor: SerialInfo,
    camera: CameraInfo,
}

#[derive(Serialize)]
struct SerialInfo {
    enabled: bool,
    port: String,
    baud_rate: u32,
    read_timeout_ms: u64,
}

#[derive(Serialize)]
struct CameraInfo {
    width: u32,
    height: u32,
    fps: f64,
    is_color: bool,
    exposure_time_us: u32,
    white_balance_mode: String,
    white_balance_temperature: u32,
}

#[derive(Serialize)]
struct RecordingInfo {
    mode: String,
    road_type: String,
    weather: String,
    time_of_day: String,
    recording_side: String,
    image_format: String,
}

#[derive(Serialize)]
struct SyncInfo {
    rate_hz: f64,
    stop_timeout_ms: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else if args.toml {
        let toml = config_loader::ConfigLoader::to_toml(&blueprint)
            .context("Failed to serialize config as TOML")?;
        println!("{}", toml);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn serial_info(config: &contracts::SerialDeviceConfig) -> SerialInfo {
    SerialInfo {
        enabled: config.enabled,
        port: config.port.clone(),
        baud_rate: config.baud_rate,
        read_timeout_ms: config.read_timeout_ms,
    }
}

fn build_config_info(blueprint: &AcquisitionBlueprint) -> ConfigInfo {
    let env = &blueprint.recording.environment;
    let settings = blueprint.camera.settings();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        storage: StorageInfo {
            root: blueprint.storage.root.display().to_string(),
            session_dir: env.folder_path(&blueprint.storage.root).display().to_string(),
        },
        devices: DevicesInfo {
            gps: serial_info(&blueprint.gps),
            sensor: serial_info(&blueprint.sensor),
            camera: CameraInfo {
                width: blueprint.camera.width,
                height: blueprint.camera.height,
                fps: blueprint.camera.fps,
                is_color: blueprint.camera.is_color,
                exposure_time_us: settings.exposure_time,
                white_balance_mode: settings.white_balance_mode.as_str().to_string(),
                white_balance_temperature: settings.white_balance_temperature,
            },
        },
        recording: RecordingInfo {
            mode: blueprint.recording.mode.as_str().to_string(),
            road_type: env.road_type.as_str().to_string(),
            weather: env.weather.as_str().to_string(),
            time_of_day: env.time_of_day.as_str().to_string(),
            recording_side: env.recording_side.as_str().to_string(),
            image_format: blueprint.video.image_format.extension().to_string(),
        },
        sync_settings: (blueprint.recording.mode == RecordingMode::Synchronized).then(|| {
            SyncInfo {
                rate_hz: blueprint.sync.rate_hz,
                stop_timeout_ms: blueprint.sync.stop_timeout_ms,
            }
        }),
    }
}

fn print_config_info(blueprint: &AcquisitionBlueprint) {
    let info = build_config_info(blueprint);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               SRVS Recorder Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📁 Storage");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Root: {}", info.storage.root);
    println!("   └─ Session folder: {}", info.storage.session_dir);

    println!("\n🔌 Devices");
    for (name, serial) in [("GPS", &info.devices.gps), ("Sensor", &info.devices.sensor)] {
        if serial.enabled {
            println!(
                "   ├─ {}: {} @ {} baud (timeout {} ms)",
                name, serial.port, serial.baud_rate, serial.read_timeout_ms
            );
        } else {
            println!("   ├─ {}: disabled", name);
        }
    }
    let camera = &info.devices.camera;
    println!(
        "   └─ Camera: {}x{} @ {} fps, {}",
        camera.width,
        camera.height,
        camera.fps,
        if camera.is_color { "color" } else { "mono" }
    );
    println!(
        "         exposure {} µs, white balance {} ({} K)",
        camera.exposure_time_us, camera.white_balance_mode, camera.white_balance_temperature
    );

    let rec = &info.recording;
    println!("\n🎬 Recording");
    println!("   ├─ Mode: {}", rec.mode);
    println!(
        "   ├─ Environment: {} / {} / {} / {}",
        rec.road_type, rec.weather, rec.time_of_day, rec.recording_side
    );
    println!("   └─ Frame format: {}", rec.image_format);

    if let Some(sync) = &info.sync_settings {
        println!("\n⚙️  Sync Settings");
        println!("   ├─ Rate: {} Hz", sync.rate_hz);
        println!("   └─ Stop timeout: {} ms", sync.stop_timeout_ms);
    }

    println!();
}
