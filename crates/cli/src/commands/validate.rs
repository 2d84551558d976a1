//! `validate` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{AcquisitionBlueprint, RecordingMode};
use serde::Serialize;
use tracing::info;

use super::describe_port;
use crate::cli::ValidateArgs;

#[derive(Serialize)]
struct ValidationReport {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

impl ValidationReport {
    fn rejected(config_path: String, error: String) -> Self {
        Self {
            valid: false,
            config_path,
            error: Some(error),
            warnings: Vec::new(),
            summary: None,
        }
    }
}

/// What a session recorded with this config would look like
#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    mode: String,
    storage_root: String,
    gps: String,
    sensor: String,
    camera: String,
    sync_rate_hz: f64,
}

impl From<&AcquisitionBlueprint> for ConfigSummary {
    fn from(blueprint: &AcquisitionBlueprint) -> Self {
        let camera = &blueprint.camera;
        Self {
            version: format!("{:?}", blueprint.version),
            mode: blueprint.recording.mode.as_str().to_string(),
            storage_root: blueprint.storage.root.display().to_string(),
            gps: describe_port(&blueprint.gps),
            sensor: describe_port(&blueprint.sensor),
            camera: format!("{}x{} @ {} fps", camera.width, camera.height, camera.fps),
            sync_rate_hz: blueprint.sync.rate_hz,
        }
    }
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let report = validate_config(args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize validation report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }

    anyhow::ensure!(report.valid, "Configuration validation failed");
    Ok(())
}

fn validate_config(args: &ValidateArgs) -> ValidationReport {
    let config_path = args.config.display().to_string();
    match ConfigLoader::load_optional(&args.config) {
        Ok(Some(blueprint)) => ValidationReport {
            valid: true,
            error: None,
            warnings: collect_warnings(&blueprint),
            summary: Some(ConfigSummary::from(&blueprint)),
            config_path,
        },
        Ok(None) => {
            let error = format!("File not found: {config_path}");
            ValidationReport::rejected(config_path, error)
        }
        Err(e) => ValidationReport::rejected(config_path, e.to_string()),
    }
}

/// Settings that load fine but will surprise the operator
fn collect_warnings(blueprint: &AcquisitionBlueprint) -> Vec<String> {
    let gps = blueprint.gps.enabled;
    let sensor = blueprint.sensor.enabled;
    let synchronized = blueprint.recording.mode == RecordingMode::Synchronized;
    let (fps, rate_hz) = (blueprint.camera.fps, blueprint.sync.rate_hz);
    let root = &blueprint.storage.root;

    let checks = [
        (!gps, "GPS disabled, sessions will have no track file".to_string()),
        (!sensor, "Sensor board disabled, sessions will have no sensor log".to_string()),
        (
            synchronized && !sensor,
            "Synchronized mode without a sensor board, every sync tick will fail".to_string(),
        ),
        (
            synchronized && fps < rate_hz,
            format!("camera.fps ({fps}) is below sync.rate_hz ({rate_hz}), triggered frames will be rate-limited"),
        ),
        (
            !root.exists(),
            format!("storage.root {} does not exist yet and will be created", root.display()),
        ),
    ];

    checks
        .into_iter()
        .filter_map(|(applies, message)| applies.then_some(message))
        .collect()
}

fn print_report(report: &ValidationReport) {
    if !report.valid {
        println!("✗ {} is invalid", report.config_path);
        if let Some(error) = &report.error {
            println!("    {error}");
        }
        return;
    }

    println!("✓ {} is valid", report.config_path);
    if let Some(summary) = &report.summary {
        let rows = [
            ("version", summary.version.clone()),
            ("mode", summary.mode.clone()),
            ("storage", summary.storage_root.clone()),
            ("gps", summary.gps.clone()),
            ("sensor", summary.sensor.clone()),
            ("camera", summary.camera.clone()),
            ("sync rate", format!("{} Hz", summary.sync_rate_hz)),
        ];
        for (label, value) in rows {
            println!("    {label:<10} {value}");
        }
    }
    for warning in &report.warnings {
        println!("  ⚠ {warning}");
    }
}
